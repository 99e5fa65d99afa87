//! Price selection: turning item keynames into price ids.
//!
//! Everything here is pure; the manager fetches the catalog and hands it in.

use std::collections::HashMap;

use sl_client::Error;

use super::types::{Item, ItemPrice};

/// Categories whose items occupy numbered slots. Repeating such an item
/// takes the slot-0 price first, then slot 1, and so on.
const SLOTTED_CATEGORIES: [&str; 2] = ["gpu0", "pcie_slot0"];

/// Capacity of the last ordered item whose keyname looks like a CPU or
/// storage-tier item.
///
/// Matching on `CORE`, `TIER` and `INTEL` keyname fragments is a catalog
/// convention rather than a documented rule; the capacity it yields is only
/// used to pick among capacity-restricted prices when no preset supplies a
/// core count. `INTEL` processors carry their core count in the description,
/// e.g. `Dual Intel Xeon E5-2690 v3 (24 Cores, 2.60 GHz)`.
#[must_use]
pub fn get_item_capacity(items: &[Item], item_keynames: &[String]) -> Option<f64> {
    item_keynames.iter().rev().find_map(|keyname| {
        let item = items.iter().find(|item| item.key_name == *keyname)?;
        if item.key_name.contains("CORE") || item.key_name.contains("TIER") {
            item.capacity
        } else if item.key_name.contains("INTEL") {
            described_cores(&item.description)
        } else {
            None
        }
    })
}

fn described_cores(description: &str) -> Option<f64> {
    let (_, rest) = description.split_once('(')?;
    rest.split_whitespace().next()?.parse().ok()
}

/// True if `price` may be ordered for a `term`-month commitment (0 = none)
/// by a server with `capacity` cores.
#[must_use]
pub fn price_is_admissible(price: &ItemPrice, capacity: Option<f64>, term: u32) -> bool {
    if price.location_group_id.is_some() {
        return false;
    }
    let term_matches = price
        .term_length
        .is_none_or(|length| (length - f64::from(term)).abs() < f64::EPSILON);
    if !term_matches {
        return false;
    }
    match (price.capacity_restriction_type.as_deref(), capacity) {
        (Some(restriction), Some(capacity)) if !restriction.is_empty() => {
            let min = price.capacity_restriction_minimum.unwrap_or(f64::MIN);
            let max = price.capacity_restriction_maximum.unwrap_or(f64::MAX);
            (min..=max).contains(&capacity)
        }
        _ => true,
    }
}

/// First admissible price of an item.
#[must_use]
pub fn get_item_price_id(prices: &[ItemPrice], capacity: Option<f64>, term: u32) -> Option<i64> {
    prices
        .iter()
        .find(|price| price_is_admissible(price, capacity, term))
        .map(|price| price.id)
}

/// Resolve every keyname to exactly one price id, in order.
///
/// `core` is the preset's core count; without one, the capacity of the
/// ordered CPU item is used.
///
/// # Errors
///
/// Returns [`Error::Ordering`] naming the first keyname that matches no item
/// (or several), or has no admissible price.
pub fn get_price_id_list(
    package_keyname: &str,
    items: &[Item],
    item_keynames: &[String],
    core: Option<f64>,
    term: u32,
) -> Result<Vec<i64>, Error> {
    const OPERATION: &str = "get_price_id_list";

    let capacity = core.or_else(|| get_item_capacity(items, item_keynames));
    let mut slots: HashMap<&str, usize> = HashMap::new();
    let mut price_ids = Vec::with_capacity(item_keynames.len());

    for keyname in item_keynames {
        let item = find_item(package_keyname, items, keyname)?;
        let category = item.category_code().unwrap_or_default();

        let price_id = if let Some(base) = SLOTTED_CATEGORIES.iter().find(|c| **c == category) {
            let slot = slots.entry(*base).or_insert(0);
            let slot_code = format!("{}{}", base.strip_suffix('0').unwrap_or(base), *slot);
            *slot += 1;
            slot_price(item, &slot_code).ok_or_else(|| {
                Error::ordering(
                    OPERATION,
                    keyname,
                    format!("Item {keyname} has no price for slot {slot_code}"),
                )
            })?
        } else {
            get_item_price_id(&item.prices, capacity, term).ok_or_else(|| {
                Error::ordering(
                    OPERATION,
                    keyname,
                    format!("Could not find valid price for item {keyname}"),
                )
            })?
        };
        tracing::trace!(keyname = %keyname, price_id, "price selected");
        price_ids.push(price_id);
    }
    Ok(price_ids)
}

fn find_item<'a>(package_keyname: &str, items: &'a [Item], keyname: &str) -> Result<&'a Item, Error> {
    let by_key: Vec<&Item> = items.iter().filter(|i| i.key_name == keyname).collect();
    let matches: Vec<&Item> = if by_key.is_empty() {
        items.iter().filter(|i| i.matches(keyname)).collect()
    } else {
        by_key
    };
    match matches.as_slice() {
        [item] => Ok(*item),
        [] => Err(Error::ordering(
            "get_price_id_list",
            keyname,
            format!("Item {keyname} does not exist for package {package_keyname}"),
        )),
        _ => Err(Error::ordering(
            "get_price_id_list",
            keyname,
            format!("Item {keyname} is ambiguous in package {package_keyname}"),
        )),
    }
}

/// Global price of `item` whose first category is `slot_code`.
fn slot_price(item: &Item, slot_code: &str) -> Option<i64> {
    item.prices
        .iter()
        .filter(|price| price.location_group_id.is_none())
        .find(|price| {
            price
                .categories
                .first()
                .is_some_and(|c| c.category_code == slot_code)
        })
        .map(|price| price.id)
}
