//! Ordering: resolve catalog keynames into priced order containers and
//! submit them to `SoftLayer_Product_Order`.
//!
//! ```rust,ignore
//! let manager = OrderingManager::new(client);
//! let request = OrderRequest::new(
//!     "CLOUD_SERVER",
//!     "DALLAS13",
//!     ["GUEST_CORES_2", "RAM_4_GB", "OS_CENTOS_7_64_MINIMAL"],
//! )
//! .extra("virtualGuests", json!([{"hostname": "web1", "domain": "example.com"}]));
//! let receipt = manager.verify_order(&request).await?;
//! ```

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use sl_client::{CallOptions, Client, Error};
use sl_query::{FilterNode, ObjectFilter, Operation, query_filter, query_filter_in};

pub mod pricing;
pub mod types;

pub use pricing::{get_item_capacity, get_item_price_id, get_price_id_list};
pub use types::{
    HARDWARE_SERVER_CONTAINER, Item, ItemCategory, ItemPrice, OrderRequest, Package, Preset,
    VIRTUAL_GUEST_CONTAINER,
};

const PACKAGE_MASK: &str = "id,keyName,name,description,isActive,type[keyName]";
const ITEM_MASK: &str = "id,keyName,description,capacity,itemCategory,prices[categories],\
                         softwareDescription[id,referenceCode,longDescription]";
const PRESET_MASK: &str = "id,keyName,name,description";
const PRESET_PRICES_MASK: &str = "id,keyName,prices[id,item[id,keyName,capacity,itemCategory]]";
const CATEGORY_MASK: &str = "id,isRequired,itemCategory[id,name,categoryCode]";
const LOCATION_MASK: &str = "id,name,regions[keyname]";
const REGION_MASK: &str = "description,keyname,location";
const QUOTE_MASK: &str = "id,name,createDate,modifyDate,status,\
                          order[id,orderTotalAmount,items[id,description,categoryCode]]";
const ORDER_DETAIL_MASK: &str = "id,createDate,status,orderTotalAmount,\
                                 items[id,description,categoryCode,hourlyRecurringFee,recurringFee],\
                                 userRecord[username]";

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static DATACENTER_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z]{3}[0-9]{2}").expect("static regex should not panic")
});

fn exact(value: &str) -> FilterNode {
    FilterNode::leaf(Operation::Text(value.to_owned()))
}

fn filter_at(path: &str, node: FilterNode) -> Result<ObjectFilter, Error> {
    ObjectFilter::new()
        .with(path, node)
        .map_err(|e| Error::InvalidArgument(e.to_string()))
}

fn decode<T: DeserializeOwned>(operation: &str, value: Value) -> Result<T, Error> {
    serde_json::from_value(value).map_err(|e| Error::parse(operation, e.to_string()))
}

fn decode_list<T: DeserializeOwned>(operation: &str, value: Value) -> Result<Vec<T>, Error> {
    match value {
        Value::Null => Ok(Vec::new()),
        value => decode(operation, value),
    }
}

/// Catalog lookups and order submission.
#[derive(Debug, Clone)]
pub struct OrderingManager {
    client: Client,
}

impl OrderingManager {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn call_list<T: DeserializeOwned>(
        &self,
        service: &str,
        method: &str,
        args: Vec<Value>,
        opts: CallOptions,
    ) -> Result<Vec<T>, Error> {
        let value = self.client.call(service, method, args, opts).await?;
        decode_list(&format!("SoftLayer_{service}.{method}"), value)
    }

    /// Packages whose type keyname is one of `package_types`, without outlet
    /// packages.
    ///
    /// # Errors
    ///
    /// Returns the API error of `getAllObjects`.
    pub async fn get_packages_of_type(
        &self,
        package_types: &[&str],
        mask: Option<&str>,
    ) -> Result<Vec<Package>, Error> {
        let filter = filter_at("type.keyName", query_filter_in(package_types.iter().copied()))?;
        let packages = self
            .call_list(
                "Product_Package",
                "getAllObjects",
                vec![],
                CallOptions::new()
                    .mask(mask.unwrap_or(PACKAGE_MASK))
                    .filter(filter),
            )
            .await?;
        Ok(Self::filter_outlet_packages(packages))
    }

    /// Drop packages whose name or description mentions `OUTLET`.
    #[must_use]
    pub fn filter_outlet_packages(packages: Vec<Package>) -> Vec<Package> {
        packages
            .into_iter()
            .filter(|p| {
                !p.name.to_uppercase().contains("OUTLET")
                    && !p.description.to_uppercase().contains("OUTLET")
            })
            .collect()
    }

    #[must_use]
    pub fn get_only_active_packages(packages: Vec<Package>) -> Vec<Package> {
        packages.into_iter().filter(|p| p.is_active).collect()
    }

    /// The last package of the given type, if any.
    ///
    /// # Errors
    ///
    /// Returns the API error of `getAllObjects`.
    pub async fn get_package_by_type(
        &self,
        package_type: &str,
        mask: Option<&str>,
    ) -> Result<Option<Package>, Error> {
        Ok(self
            .get_packages_of_type(&[package_type], mask)
            .await?
            .pop())
    }

    /// # Errors
    ///
    /// Returns [`Error::Ordering`] when no package has the given type.
    pub async fn get_package_id_by_type(&self, package_type: &str) -> Result<i64, Error> {
        self.get_package_by_type(package_type, None)
            .await?
            .map(|package| package.id)
            .ok_or_else(|| {
                Error::ordering(
                    "get_package_id_by_type",
                    package_type,
                    format!("No package found for type: {package_type}"),
                )
            })
    }

    /// Active packages, optionally narrowed by `filter`.
    ///
    /// # Errors
    ///
    /// Returns the API error of `getAllObjects`.
    pub async fn list_packages(&self, filter: Option<ObjectFilter>) -> Result<Vec<Package>, Error> {
        let mut opts = CallOptions::new().mask(PACKAGE_MASK);
        opts.filter = filter;
        let packages = self
            .call_list("Product_Package", "getAllObjects", vec![], opts)
            .await?;
        Ok(Self::get_only_active_packages(packages))
    }

    /// The single active package with the given keyname.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Ordering`] when no active package, or more than one,
    /// has the keyname.
    pub async fn get_package_by_key(&self, package_keyname: &str) -> Result<Package, Error> {
        let filter = filter_at("keyName", exact(package_keyname))?;
        let mut active = Self::get_only_active_packages(
            self.call_list(
                "Product_Package",
                "getAllObjects",
                vec![],
                CallOptions::new().mask(PACKAGE_MASK).filter(filter),
            )
            .await?,
        );
        match active.len() {
            1 => Ok(active.remove(0)),
            0 => Err(Error::ordering(
                "get_package_by_key",
                package_keyname,
                format!("Package {package_keyname} does not exist"),
            )),
            n => Err(Error::ordering(
                "get_package_by_key",
                package_keyname,
                format!("{n} active packages match {package_keyname}"),
            )),
        }
    }

    /// Item categories of a package's configuration.
    ///
    /// # Errors
    ///
    /// Returns the package lookup error or the API error of `getConfiguration`.
    pub async fn list_categories(&self, package_keyname: &str) -> Result<Vec<Value>, Error> {
        let package = self.get_package_by_key(package_keyname).await?;
        self.call_list(
            "Product_Package",
            "getConfiguration",
            vec![],
            CallOptions::new().id(package.id).mask(CATEGORY_MASK),
        )
        .await
    }

    /// # Errors
    ///
    /// Returns the package lookup error or the API error of `getItems`.
    pub async fn list_items(
        &self,
        package_keyname: &str,
        filter: Option<ObjectFilter>,
    ) -> Result<Vec<Item>, Error> {
        let package = self.get_package_by_key(package_keyname).await?;
        self.package_items(&package, filter).await
    }

    async fn package_items(
        &self,
        package: &Package,
        filter: Option<ObjectFilter>,
    ) -> Result<Vec<Item>, Error> {
        let mut opts = CallOptions::new().id(package.id).mask(ITEM_MASK);
        opts.filter = filter;
        self.call_list("Product_Package", "getItems", vec![], opts)
            .await
    }

    /// Active presets followed by account-restricted ones.
    ///
    /// # Errors
    ///
    /// Returns the package lookup error or the API error of either preset call.
    pub async fn list_presets(&self, package_keyname: &str) -> Result<Vec<Preset>, Error> {
        let package = self.get_package_by_key(package_keyname).await?;
        let opts = CallOptions::new().id(package.id).mask(PRESET_MASK);
        let mut presets: Vec<Preset> = self
            .call_list("Product_Package", "getActivePresets", vec![], opts.clone())
            .await?;
        presets.extend(
            self.call_list::<Preset>(
                "Product_Package",
                "getAccountRestrictedActivePresets",
                vec![],
                opts,
            )
            .await?,
        );
        Ok(presets)
    }

    /// # Errors
    ///
    /// Returns [`Error::Ordering`] when neither the active nor the
    /// account-restricted presets of the package contain the keyname.
    pub async fn get_preset_by_key(
        &self,
        package_keyname: &str,
        preset_keyname: &str,
    ) -> Result<Preset, Error> {
        let package = self.get_package_by_key(package_keyname).await?;
        self.package_preset(&package, preset_keyname).await
    }

    async fn package_preset(&self, package: &Package, preset_keyname: &str) -> Result<Preset, Error> {
        let node = query_filter(format!("_= {preset_keyname}"));

        for (method, property) in [
            ("getActivePresets", "activePresets"),
            ("getAccountRestrictedActivePresets", "accountRestrictedActivePresets"),
        ] {
            let filter = filter_at(&format!("{property}.keyName"), node.clone())?;
            let mut presets: Vec<Preset> = self
                .call_list(
                    "Product_Package",
                    method,
                    vec![],
                    CallOptions::new()
                        .id(package.id)
                        .mask(PRESET_MASK)
                        .filter(filter),
                )
                .await?;
            if !presets.is_empty() {
                return Ok(presets.remove(0));
            }
        }
        Err(Error::ordering(
            "get_preset_by_key",
            preset_keyname,
            format!(
                "Preset {preset_keyname} does not exist in package {}",
                package.key_name
            ),
        ))
    }

    /// The preset with its prices and their items.
    ///
    /// # Errors
    ///
    /// Returns the API error of `SoftLayer_Product_Package_Preset.getObject`.
    pub async fn get_preset_prices(&self, preset_id: i64) -> Result<Preset, Error> {
        let value = self
            .client
            .call(
                "Product_Package_Preset",
                "getObject",
                vec![],
                CallOptions::new().id(preset_id).mask(PRESET_PRICES_MASK),
            )
            .await?;
        decode("SoftLayer_Product_Package_Preset.getObject", value)
    }

    /// Price ids for `item_keynames`, see [`pricing::get_price_id_list`].
    ///
    /// # Errors
    ///
    /// Returns catalog lookup errors and [`Error::Ordering`] for keynames
    /// that cannot be priced.
    pub async fn get_price_id_list(
        &self,
        package_keyname: &str,
        item_keynames: &[String],
        core: Option<f64>,
        term: u32,
    ) -> Result<Vec<i64>, Error> {
        let items = self.list_items(package_keyname, None).await?;
        get_price_id_list(package_keyname, &items, item_keynames, core, term)
    }

    /// Location-specific prices of a package for one datacenter.
    ///
    /// # Errors
    ///
    /// Returns the package lookup error or the API error of `getItemPrices`.
    pub async fn get_item_prices_by_location(
        &self,
        location: &str,
        package_keyname: &str,
    ) -> Result<Vec<Value>, Error> {
        let package = self.get_package_by_key(package_keyname).await?;
        let filter = filter_at(
            "itemPrices.pricingLocationGroup.locations.name",
            exact(location),
        )?;
        self.call_list(
            "Product_Package",
            "getItemPrices",
            vec![],
            CallOptions::new()
                .id(package.id)
                .mask("filteredMask[pricingLocationGroup[locations]]")
                .filter(filter),
        )
        .await
    }

    /// Regions in which a package can be ordered.
    ///
    /// # Errors
    ///
    /// Returns the package lookup error or the API error of `getRegions`.
    pub async fn package_locations(&self, package_keyname: &str) -> Result<Vec<Value>, Error> {
        let package = self.get_package_by_key(package_keyname).await?;
        self.call_list(
            "Product_Package",
            "getRegions",
            vec![],
            CallOptions::new().id(package.id).mask(REGION_MASK),
        )
        .await
    }

    /// Numeric location id for an id, a datacenter short name (`dal13`) or a
    /// region keyname (`DALLAS13`). `NONE` is 0.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Ordering`] unless exactly one datacenter matches.
    pub async fn get_location_id(&self, location: &str) -> Result<i64, Error> {
        let location = location.trim();
        if let Ok(id) = location.parse::<i64>() {
            return Ok(id);
        }
        if location.eq_ignore_ascii_case("NONE") {
            return Ok(0);
        }

        let path = if DATACENTER_NAME.is_match(location) {
            "name"
        } else {
            "regions.keyname"
        };
        let filter = filter_at(path, exact(location))?;
        let datacenters: Vec<Value> = self
            .call_list(
                "Location",
                "getDatacenters",
                vec![],
                CallOptions::new().mask(LOCATION_MASK).filter(filter),
            )
            .await?;
        match datacenters.as_slice() {
            [datacenter] => datacenter["id"].as_i64().ok_or_else(|| {
                Error::parse("SoftLayer_Location.getDatacenters", "datacenter has no id")
            }),
            _ => Err(Error::ordering(
                "get_location_id",
                location,
                format!("Unable to find location: {location}"),
            )),
        }
    }

    /// Build the order container for `request` without submitting it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Ordering`] naming the package, preset, location or
    /// item keyname that could not be resolved.
    pub async fn generate_order(&self, request: &OrderRequest) -> Result<Value, Error> {
        tracing::debug!(
            package = %request.package_keyname,
            location = %request.location,
            items = request.item_keynames.len(),
            preset = ?request.preset_keyname,
            "generating order"
        );
        let package = self.get_package_by_key(&request.package_keyname).await?;

        let mut order: Map<String, Value> = request.extras.clone();
        order.insert("packageId".to_owned(), json!(package.id));
        order.insert("quantity".to_owned(), json!(request.quantity));
        order.insert(
            "location".to_owned(),
            json!(self.get_location_id(&request.location).await?),
        );
        order.insert("useHourlyPricing".to_owned(), json!(request.hourly));

        let mut core = None;
        if let Some(preset_keyname) = &request.preset_keyname {
            let preset = self.package_preset(&package, preset_keyname).await?;
            core = self.get_preset_prices(preset.id).await?.guest_cores();
            order.insert("presetId".to_owned(), json!(preset.id));
        }

        order.insert(
            "complexType".to_owned(),
            json!(
                request
                    .complex_type
                    .as_deref()
                    .unwrap_or(VIRTUAL_GUEST_CONTAINER)
            ),
        );
        let items = self.package_items(&package, None).await?;
        let price_ids = get_price_id_list(
            &request.package_keyname,
            &items,
            &request.item_keynames,
            core,
            request.term,
        )?;
        order.insert(
            "prices".to_owned(),
            Value::Array(price_ids.into_iter().map(|id| json!({ "id": id })).collect()),
        );

        Ok(json!({ "orderContainers": [order] }))
    }

    /// # Errors
    ///
    /// See [`generate_order`](Self::generate_order); also returns the
    /// service's verification fault.
    pub async fn verify_order(&self, request: &OrderRequest) -> Result<Value, Error> {
        let order = self.generate_order(request).await?;
        self.client
            .call("Product_Order", "verifyOrder", vec![order], CallOptions::new())
            .await
    }

    /// # Errors
    ///
    /// See [`verify_order`](Self::verify_order).
    pub async fn place_order(&self, request: &OrderRequest) -> Result<Value, Error> {
        let order = self.generate_order(request).await?;
        tracing::info!(package = %request.package_keyname, "placing order");
        self.client
            .call("Product_Order", "placeOrder", vec![order], CallOptions::new())
            .await
    }

    /// # Errors
    ///
    /// See [`verify_order`](Self::verify_order).
    pub async fn place_quote(
        &self,
        request: &OrderRequest,
        quote_name: &str,
        send_email: bool,
    ) -> Result<Value, Error> {
        let mut order = self.generate_order(request).await?;
        if let Some(container) = order.as_object_mut() {
            container.insert("quoteName".to_owned(), json!(quote_name));
            container.insert("sendQuoteEmailFlag".to_owned(), json!(send_email));
        }
        self.client
            .call("Product_Order", "placeQuote", vec![order], CallOptions::new())
            .await
    }

    /// # Errors
    ///
    /// Returns the API error of `SoftLayer_Billing_Order.getObject`.
    pub async fn get_order_detail(&self, order_id: i64) -> Result<Value, Error> {
        self.client
            .call(
                "Billing_Order",
                "getObject",
                vec![],
                CallOptions::new().id(order_id).mask(ORDER_DETAIL_MASK),
            )
            .await
    }

    /// Active quotes of the account.
    ///
    /// # Errors
    ///
    /// Returns the API error of `SoftLayer_Account.getActiveQuotes`.
    pub async fn get_quotes(&self) -> Result<Vec<Value>, Error> {
        self.call_list(
            "Account",
            "getActiveQuotes",
            vec![],
            CallOptions::new().mask(QUOTE_MASK),
        )
        .await
    }

    /// # Errors
    ///
    /// Returns the API error of `SoftLayer_Billing_Order_Quote.getObject`.
    pub async fn get_quote_details(&self, quote_id: i64) -> Result<Value, Error> {
        self.client
            .call(
                "Billing_Order_Quote",
                "getObject",
                vec![],
                CallOptions::new().id(quote_id).mask(QUOTE_MASK),
            )
            .await
    }

    /// The first order container of a quote, recalculated at current prices.
    ///
    /// # Errors
    ///
    /// Returns the API error, or [`Error::Parse`] when the quote holds no
    /// container.
    pub async fn get_order_container(&self, quote_id: i64) -> Result<Map<String, Value>, Error> {
        const OPERATION: &str = "SoftLayer_Billing_Order_Quote.getRecalculatedOrderContainer";
        let mut value = self
            .client
            .call(
                "Billing_Order_Quote",
                "getRecalculatedOrderContainer",
                vec![],
                CallOptions::new().id(quote_id),
            )
            .await?;
        let first = value
            .get_mut("orderContainers")
            .and_then(|containers| containers.get_mut(0))
            .map(Value::take);
        match first {
            Some(Value::Object(container)) => Ok(container),
            _ => Err(Error::parse(OPERATION, "quote has no order container")),
        }
    }

    /// The quote's container with `extra` merged in and `quantity` set.
    ///
    /// # Errors
    ///
    /// See [`get_order_container`](Self::get_order_container).
    pub async fn generate_order_template(
        &self,
        quote_id: i64,
        extra: &Map<String, Value>,
        quantity: u32,
    ) -> Result<Map<String, Value>, Error> {
        let mut container = self.get_order_container(quote_id).await?;
        container.insert("quantity".to_owned(), json!(quantity));
        for (key, value) in extra {
            container.insert(key.clone(), value.clone());
        }
        Ok(container)
    }

    /// # Errors
    ///
    /// Returns the API error of `saveQuote`.
    pub async fn save_quote(&self, quote_id: i64) -> Result<Value, Error> {
        self.client
            .call(
                "Billing_Order_Quote",
                "saveQuote",
                vec![],
                CallOptions::new().id(quote_id),
            )
            .await
    }

    /// Verify a quote's order. Empty fields are dropped from the container
    /// first; the service rejects blank ids.
    ///
    /// # Errors
    ///
    /// Returns the API error of `verifyOrder`.
    pub async fn verify_quote(
        &self,
        quote_id: i64,
        extra: &Map<String, Value>,
    ) -> Result<Value, Error> {
        let container = self.generate_order_template(quote_id, extra, 1).await?;
        let container: Map<String, Value> = container
            .into_iter()
            .filter(|(_, value)| is_present(value))
            .collect();
        self.client
            .call(
                "Billing_Order_Quote",
                "verifyOrder",
                vec![Value::Object(container)],
                CallOptions::new().id(quote_id),
            )
            .await
    }

    /// # Errors
    ///
    /// Returns the API error of `placeOrder`.
    pub async fn order_quote(
        &self,
        quote_id: i64,
        extra: &Map<String, Value>,
    ) -> Result<Value, Error> {
        let container = self.generate_order_template(quote_id, extra, 1).await?;
        tracing::info!(quote_id, "ordering quote");
        self.client
            .call(
                "Billing_Order_Quote",
                "placeOrder",
                vec![Value::Object(container)],
                CallOptions::new().id(quote_id),
            )
            .await
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::testing::FakeApi;

    fn cloud_server_catalog() -> FakeApi {
        FakeApi::new()
            .on("SoftLayer_Product_Package.getAllObjects", |_| {
                Ok(json!([{"id": 46, "keyName": "CLOUD_SERVER", "isActive": 1}]))
            })
            .on("SoftLayer_Product_Package.getItems", |_| {
                Ok(json!([
                    {"id": 1, "keyName": "GUEST_CORES_2", "capacity": "2",
                     "itemCategory": {"categoryCode": "guest_core"},
                     "prices": [{"id": 1641, "locationGroupId": null}]},
                    {"id": 2, "keyName": "RAM_4_GB", "capacity": "4",
                     "itemCategory": {"categoryCode": "ram"},
                     "prices": [{"id": 1645, "locationGroupId": null}]},
                    {"id": 3, "keyName": "OS_CENTOS_7_64_MINIMAL",
                     "itemCategory": {"categoryCode": "os"},
                     "prices": [
                        {"id": 99, "locationGroupId": 503},
                        {"id": 45466, "capacityRestrictionType": "CORE",
                         "capacityRestrictionMinimum": "1", "capacityRestrictionMaximum": "2"},
                        {"id": 45467, "capacityRestrictionType": "CORE",
                         "capacityRestrictionMinimum": "3", "capacityRestrictionMaximum": "8"}
                     ]},
                    {"id": 4, "keyName": "BANDWIDTH_0_GB_2",
                     "itemCategory": {"categoryCode": "bandwidth"},
                     "prices": [{"id": 1800}]},
                    {"id": 5, "keyName": "1_GBPS_PUBLIC_PRIVATE_NETWORK_UPLINKS",
                     "itemCategory": {"categoryCode": "port_speed"},
                     "prices": [{"id": 274}]}
                ]))
            })
            .on("SoftLayer_Location.getDatacenters", |_| {
                Ok(json!([{"id": 1_854_895, "name": "dal13"}]))
            })
    }

    fn five_items() -> Vec<String> {
        [
            "GUEST_CORES_2",
            "RAM_4_GB",
            "OS_CENTOS_7_64_MINIMAL",
            "BANDWIDTH_0_GB_2",
            "1_GBPS_PUBLIC_PRIVATE_NETWORK_UPLINKS",
        ]
        .map(str::to_owned)
        .to_vec()
    }

    #[tokio::test]
    async fn generates_a_virtual_guest_container() {
        let api = cloud_server_catalog();
        let manager = OrderingManager::new(api.client());
        let request = OrderRequest::new("CLOUD_SERVER", "DALLAS13", five_items())
            .extra(
                "virtualGuests",
                json!([{"hostname": "t", "domain": "example.com"}]),
            );

        let order = manager.generate_order(&request).await.unwrap();

        assert_eq!(
            order,
            json!({"orderContainers": [{
                "virtualGuests": [{"hostname": "t", "domain": "example.com"}],
                "packageId": 46,
                "quantity": 1,
                "location": 1_854_895,
                "useHourlyPricing": true,
                "complexType": "SoftLayer_Container_Product_Order_Virtual_Guest",
                "prices": [{"id": 1641}, {"id": 1645}, {"id": 45466}, {"id": 1800}, {"id": 274}]
            }]})
        );

        let location_call = api.last_request("SoftLayer_Location.getDatacenters").unwrap();
        assert_eq!(
            location_call.filter.unwrap().to_value(),
            json!({"regions": {"keyname": {"operation": "DALLAS13"}}})
        );
        let items_call = api.last_request("SoftLayer_Product_Package.getItems").unwrap();
        assert_eq!(items_call.identifier, Some(46));
        assert_eq!(api.calls("SoftLayer_Product_Package.getAllObjects"), 1);
    }

    #[tokio::test]
    async fn blank_location_groups_are_priced_globally() {
        let api = FakeApi::new()
            .on("SoftLayer_Product_Package.getAllObjects", |_| {
                Ok(json!([{"id": 46, "keyName": "CLOUD_SERVER", "isActive": 1}]))
            })
            .on("SoftLayer_Product_Package.getItems", |_| {
                Ok(json!([
                    {"id": 1, "keyName": "GUEST_CORES_2", "capacity": "2",
                     "itemCategory": {"categoryCode": "guest_core"},
                     "prices": [
                        {"id": 1144, "locationGroupId": "503",
                         "categories": [{"categoryCode": "guest_core"}]},
                        {"id": 1045, "locationGroupId": "",
                         "categories": [{"categoryCode": "guest_core"}]}
                     ]},
                    {"id": 2, "keyName": "RAM_4_GB", "capacity": "4",
                     "itemCategory": {"categoryCode": "ram"},
                     "prices": [{"id": 1234, "locationGroupId": "",
                                 "categories": [{"categoryCode": "ram"}]}]}
                ]))
            });
        let manager = OrderingManager::new(api.client());
        let ids = manager
            .get_price_id_list(
                "CLOUD_SERVER",
                &["GUEST_CORES_2".to_owned(), "RAM_4_GB".to_owned()],
                None,
                0,
            )
            .await
            .unwrap();
        assert_eq!(ids, vec![1045, 1234]);
    }

    #[tokio::test]
    async fn preset_cores_drive_capacity_restricted_prices() {
        let api = cloud_server_catalog()
            .on("SoftLayer_Product_Package.getActivePresets", |_| {
                Ok(json!([{"id": 405, "keyName": "B1_4X8X25"}]))
            })
            .on("SoftLayer_Product_Package_Preset.getObject", |_| {
                Ok(json!({"id": 405, "prices": [
                    {"id": 1, "item": {"capacity": "4", "itemCategory": {"categoryCode": "guest_core"}}}
                ]}))
            });
        let manager = OrderingManager::new(api.client());
        let request = OrderRequest::new(
            "CLOUD_SERVER",
            "dal13",
            ["OS_CENTOS_7_64_MINIMAL", "BANDWIDTH_0_GB_2"],
        )
        .preset("B1_4X8X25")
        .hourly(false);

        let order = manager.generate_order(&request).await.unwrap();
        let container = &order["orderContainers"][0];
        assert_eq!(container["presetId"], 405);
        assert_eq!(container["useHourlyPricing"], false);
        assert_eq!(container["prices"], json!([{"id": 45467}, {"id": 1800}]));
        assert_eq!(api.calls("SoftLayer_Product_Package.getAllObjects"), 1);

        let location_call = api.last_request("SoftLayer_Location.getDatacenters").unwrap();
        assert_eq!(
            location_call.filter.unwrap().to_value(),
            json!({"name": {"operation": "dal13"}})
        );
    }

    #[tokio::test]
    async fn missing_preset_names_the_keyname() {
        let api = cloud_server_catalog()
            .on("SoftLayer_Product_Package.getActivePresets", |_| Ok(json!([])))
            .on("SoftLayer_Product_Package.getAccountRestrictedActivePresets", |_| Ok(json!([])));
        let manager = OrderingManager::new(api.client());
        let err = manager
            .get_preset_by_key("CLOUD_SERVER", "NOPE")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ordering_error");
        assert_eq!(err.to_string(), "Preset NOPE does not exist in package CLOUD_SERVER");
        assert_eq!(api.calls("SoftLayer_Product_Package.getAccountRestrictedActivePresets"), 1);
    }

    #[tokio::test]
    async fn inactive_packages_are_not_found() {
        let api = FakeApi::new().on("SoftLayer_Product_Package.getAllObjects", |_| {
            Ok(json!([{"id": 1, "keyName": "OLD", "isActive": 0}]))
        });
        let manager = OrderingManager::new(api.client());
        let err = manager.get_package_by_key("OLD").await.unwrap_err();
        assert_eq!(err.to_string(), "Package OLD does not exist");
    }

    #[tokio::test]
    async fn locations_resolve_without_calls_for_ids_and_none() {
        let api = FakeApi::new();
        let manager = OrderingManager::new(api.client());
        assert_eq!(manager.get_location_id("1854895").await.unwrap(), 1_854_895);
        assert_eq!(manager.get_location_id("NONE").await.unwrap(), 0);
        assert_eq!(api.calls("SoftLayer_Location.getDatacenters"), 0);

        let api = FakeApi::new().on("SoftLayer_Location.getDatacenters", |_| Ok(json!([])));
        let err = OrderingManager::new(api.client())
            .get_location_id("mars01")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unable to find location: mars01");
    }

    #[tokio::test]
    async fn place_quote_adds_quote_fields() {
        let api = cloud_server_catalog()
            .on("SoftLayer_Product_Order.placeQuote", |request| Ok(request.args[0].clone()));
        let manager = OrderingManager::new(api.client());
        let request = OrderRequest::new("CLOUD_SERVER", "dal13", ["RAM_4_GB"]);

        let sent = manager.place_quote(&request, "my quote", true).await.unwrap();
        assert_eq!(sent["quoteName"], "my quote");
        assert_eq!(sent["sendQuoteEmailFlag"], true);
        assert_eq!(sent["orderContainers"][0]["prices"], json!([{"id": 1645}]));
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn placing_an_order_is_logged() {
        let api = cloud_server_catalog()
            .on("SoftLayer_Product_Order.placeOrder", |_| Ok(json!({"orderId": 9})));
        let manager = OrderingManager::new(api.client());
        let request = OrderRequest::new("CLOUD_SERVER", "dal13", ["RAM_4_GB"]);

        let receipt = manager.place_order(&request).await.unwrap();
        assert_eq!(receipt["orderId"], 9);
        assert!(logs_contain("generating order"));
        assert!(logs_contain("placing order"));
        assert_eq!(api.calls("SoftLayer_Product_Order.verifyOrder"), 0);
    }

    #[tokio::test]
    async fn packages_of_type_skip_outlets() {
        let api = FakeApi::new().on("SoftLayer_Product_Package.getAllObjects", |_| {
            Ok(json!([
                {"id": 1, "name": "Cloud Server", "description": "", "isActive": 1},
                {"id": 2, "name": "Outlet Server", "description": "", "isActive": 1},
                {"id": 3, "name": "Bare Metal", "description": "(outlet)", "isActive": 1}
            ]))
        });
        let manager = OrderingManager::new(api.client());
        assert_eq!(manager.get_package_id_by_type("BARE_METAL_CPU").await.unwrap(), 1);

        let request = api.last_request("SoftLayer_Product_Package.getAllObjects").unwrap();
        assert_eq!(
            request.filter.unwrap().to_value(),
            json!({"type": {"keyName": {"operation": "in", "options": [
                {"name": "data", "value": ["BARE_METAL_CPU"]}
            ]}}})
        );
    }

    #[tokio::test]
    async fn verify_quote_drops_empty_fields() {
        let api = FakeApi::new()
            .on("SoftLayer_Billing_Order_Quote.getRecalculatedOrderContainer", |_| {
                Ok(json!({"orderContainers": [{
                    "packageId": 46,
                    "reservedCapacityId": "",
                    "hostId": null,
                    "sshKeys": [],
                    "prices": [{"id": 1}]
                }]}))
            })
            .on("SoftLayer_Billing_Order_Quote.verifyOrder", |request| Ok(request.args[0].clone()));
        let manager = OrderingManager::new(api.client());

        let mut extra = Map::new();
        extra.insert("virtualGuests".to_owned(), json!([{"hostname": "q"}]));
        let sent = manager.verify_quote(7, &extra).await.unwrap();

        assert_eq!(
            sent,
            json!({
                "packageId": 46,
                "quantity": 1,
                "prices": [{"id": 1}],
                "virtualGuests": [{"hostname": "q"}]
            })
        );
        let request = api.last_request("SoftLayer_Billing_Order_Quote.verifyOrder").unwrap();
        assert_eq!(request.identifier, Some(7));
    }
}
