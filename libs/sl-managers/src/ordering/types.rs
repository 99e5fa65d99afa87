//! Product catalog records as returned by `SoftLayer_Product_Package`, and
//! the order request accepted by [`OrderingManager`](super::OrderingManager).
//!
//! The service is loose about scalar types: capacities arrive as `"4"` or
//! `4.00`, flags as `1`/`0`, term lengths as numbers or strings. The
//! deserializers below accept either form.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Container type for virtual-guest orders.
pub const VIRTUAL_GUEST_CONTAINER: &str = "SoftLayer_Container_Product_Order_Virtual_Guest";
/// Container type for bare-metal orders.
pub const HARDWARE_SERVER_CONTAINER: &str = "SoftLayer_Container_Product_Order_Hardware_Server";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Package {
    pub id: i64,
    pub key_name: String,
    pub name: String,
    pub description: String,
    #[serde(deserialize_with = "flag")]
    pub is_active: bool,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub package_type: Option<PackageType>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageType {
    pub key_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemCategory {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub category_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SoftwareDescription {
    pub id: Option<i64>,
    pub reference_code: Option<String>,
    pub long_description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemPrice {
    pub id: i64,
    /// Prices restricted to a set of datacenters; `None` means global.
    #[serde(deserialize_with = "id")]
    pub location_group_id: Option<i64>,
    #[serde(deserialize_with = "number")]
    pub term_length: Option<f64>,
    pub capacity_restriction_type: Option<String>,
    #[serde(deserialize_with = "number")]
    pub capacity_restriction_minimum: Option<f64>,
    #[serde(deserialize_with = "number")]
    pub capacity_restriction_maximum: Option<f64>,
    pub categories: Vec<ItemCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<Box<Item>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Item {
    pub id: i64,
    pub key_name: String,
    pub description: String,
    #[serde(deserialize_with = "number")]
    pub capacity: Option<f64>,
    pub item_category: Option<ItemCategory>,
    pub prices: Vec<ItemPrice>,
    pub software_description: Option<SoftwareDescription>,
}

impl Item {
    #[must_use]
    pub fn category_code(&self) -> Option<&str> {
        self.item_category
            .as_ref()
            .map(|c| c.category_code.as_str())
    }

    /// True if `keyname` names this item by key or software reference code.
    #[must_use]
    pub fn matches(&self, keyname: &str) -> bool {
        self.key_name == keyname
            || self
                .software_description
                .as_ref()
                .and_then(|s| s.reference_code.as_deref())
                == Some(keyname)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preset {
    pub id: i64,
    pub key_name: String,
    pub name: String,
    pub description: String,
    pub prices: Vec<ItemPrice>,
}

impl Preset {
    /// Core count of the preset's `guest_core` item, if it has one.
    #[must_use]
    pub fn guest_cores(&self) -> Option<f64> {
        self.prices
            .iter()
            .filter_map(|price| price.item.as_deref())
            .find(|item| item.category_code() == Some("guest_core"))
            .and_then(|item| item.capacity)
    }
}

fn default_true() -> bool {
    true
}

fn default_quantity() -> u32 {
    1
}

/// What to order, in catalog keynames.
///
/// ```
/// use sl_managers::ordering::OrderRequest;
///
/// let request = OrderRequest::new("CLOUD_SERVER", "DALLAS13", ["GUEST_CORES_2", "RAM_4_GB"])
///     .hourly(false)
///     .quantity(2);
/// assert_eq!(request.item_keynames.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub package_keyname: String,
    /// Numeric id, datacenter short name (`dal13`), region keyname
    /// (`DALLAS13`) or `NONE`
    pub location: String,
    pub item_keynames: Vec<String>,
    /// Defaults to the virtual-guest container
    #[serde(default)]
    pub complex_type: Option<String>,
    #[serde(default = "default_true")]
    pub hourly: bool,
    #[serde(default)]
    pub preset_keyname: Option<String>,
    /// Merged shallowly into the container, e.g. `virtualGuests`, `sshKeys`
    #[serde(default)]
    pub extras: Map<String, Value>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Term in months; 0 accepts prices without a term
    #[serde(default)]
    pub term: u32,
}

impl OrderRequest {
    pub fn new<I, S>(package_keyname: impl Into<String>, location: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            package_keyname: package_keyname.into(),
            location: location.into(),
            item_keynames: items.into_iter().map(Into::into).collect(),
            complex_type: None,
            hourly: true,
            preset_keyname: None,
            extras: Map::new(),
            quantity: 1,
            term: 0,
        }
    }

    #[must_use]
    pub fn complex_type(mut self, complex_type: impl Into<String>) -> Self {
        self.complex_type = Some(complex_type.into());
        self
    }

    #[must_use]
    pub fn hourly(mut self, hourly: bool) -> Self {
        self.hourly = hourly;
        self
    }

    #[must_use]
    pub fn preset(mut self, preset_keyname: impl Into<String>) -> Self {
        self.preset_keyname = Some(preset_keyname.into());
        self
    }

    #[must_use]
    pub fn extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extras.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    #[must_use]
    pub fn term(mut self, months: u32) -> Self {
        self.term = months;
        self
    }
}

/// `1`, `"1"`, `true` and friends.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(s.trim(), "1" | "true" | "True" | "yes"),
        _ => false,
    })
}

/// A number or a numeric string; blanks and junk are `None`.
fn number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// An integer id or a numeric string; `""` and `null` are `None`.
fn id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("{n} is not an integer id"))),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("`{s}` is not an integer id"))),
        other => Err(serde::de::Error::invalid_type(
            serde::de::Unexpected::Other(&other.to_string()),
            &"an integer id",
        )),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn loose_scalars_are_accepted() {
        let price: ItemPrice = serde_json::from_value(json!({
            "id": 1,
            "locationGroupId": null,
            "termLength": "12",
            "capacityRestrictionType": "CORE",
            "capacityRestrictionMinimum": "1",
            "capacityRestrictionMaximum": 4,
            "categories": [{"categoryCode": "guest_core"}]
        }))
        .unwrap();
        assert_eq!(price.term_length, Some(12.0));
        assert_eq!(price.capacity_restriction_minimum, Some(1.0));
        assert_eq!(price.capacity_restriction_maximum, Some(4.0));

        let package: Package =
            serde_json::from_value(json!({"id": 46, "keyName": "CLOUD_SERVER", "isActive": 1}))
                .unwrap();
        assert!(package.is_active);

        let item: Item = serde_json::from_value(json!({"keyName": "X", "capacity": ""})).unwrap();
        assert_eq!(item.capacity, None);
    }

    #[test]
    fn blank_location_groups_are_global() {
        let price: ItemPrice = serde_json::from_value(json!({
            "id": 1234,
            "locationGroupId": "",
            "categories": [{"categoryCode": "cat1"}]
        }))
        .unwrap();
        assert_eq!(price.location_group_id, None);

        let price: ItemPrice =
            serde_json::from_value(json!({"id": 1, "locationGroupId": "503"})).unwrap();
        assert_eq!(price.location_group_id, Some(503));

        let price: ItemPrice =
            serde_json::from_value(json!({"id": 1, "locationGroupId": 509})).unwrap();
        assert_eq!(price.location_group_id, Some(509));

        assert!(
            serde_json::from_value::<ItemPrice>(json!({"id": 1, "locationGroupId": "dal"}))
                .is_err()
        );
    }

    #[test]
    fn items_match_reference_codes() {
        let item: Item = serde_json::from_value(json!({
            "keyName": "OS_UBUNTU_20_04_LTS_FOCAL_FOSSA_64_BIT",
            "softwareDescription": {"referenceCode": "UBUNTU_20_64"}
        }))
        .unwrap();
        assert!(item.matches("UBUNTU_20_64"));
        assert!(item.matches("OS_UBUNTU_20_04_LTS_FOCAL_FOSSA_64_BIT"));
        assert!(!item.matches("UBUNTU"));
    }

    #[test]
    fn preset_exposes_guest_cores() {
        let preset: Preset = serde_json::from_value(json!({
            "id": 405,
            "keyName": "B1_2X4X25",
            "prices": [
                {"id": 1, "item": {"capacity": "4", "itemCategory": {"categoryCode": "ram"}}},
                {"id": 2, "item": {"capacity": "2", "itemCategory": {"categoryCode": "guest_core"}}}
            ]
        }))
        .unwrap();
        assert_eq!(preset.guest_cores(), Some(2.0));
    }

    #[test]
    fn order_requests_have_defaults() {
        let request: OrderRequest = serde_json::from_value(json!({
            "package_keyname": "CLOUD_SERVER",
            "location": "dal13",
            "item_keynames": ["GUEST_CORES_2"]
        }))
        .unwrap();
        assert!(request.hourly);
        assert_eq!(request.quantity, 1);
        assert_eq!(request.term, 0);
        assert!(request.extras.is_empty());
    }
}
