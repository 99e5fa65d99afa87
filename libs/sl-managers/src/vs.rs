//! Virtual servers: listing with filters, lookup by id, and resolving
//! hostnames or IP addresses to ids.

use std::net::Ipv4Addr;

use futures_util::TryStreamExt;
use serde_json::Value;
use sl_client::{CallOptions, Client, Error, IdentifierResolver, resolver_fn};
use sl_query::{ObjectFilter, fix_filter, query_filter, query_filter_in};

const LIST_MASK: &str = "mask[id,globalIdentifier,hostname,domain,fullyQualifiedDomainName,\
                         primaryBackendIpAddress,primaryIpAddress,lastKnownPowerState.name,\
                         powerState,maxCpu,maxMemory,datacenter,\
                         activeTransaction.transactionStatus[friendlyName,name],status]";

const DETAIL_MASK: &str = "mask[id,globalIdentifier,fullyQualifiedDomainName,hostname,domain,\
                           createDate,modifyDate,provisionDate,notes,dedicatedAccountHostOnlyFlag,\
                           privateNetworkOnlyFlag,primaryBackendIpAddress,primaryIpAddress,\
                           networkComponents[id,status,speed,maxSpeed,name,macAddress,\
                           primaryIpAddress,port,primarySubnet],\
                           lastKnownPowerState.name,powerState,status,maxCpu,maxMemory,datacenter,\
                           activeTransaction[id,transactionStatus[friendlyName,name]],\
                           lastOperatingSystemReload.id,blockDevices,\
                           blockDeviceTemplateGroup[id,name,globalIdentifier],postInstallScriptUri,\
                           operatingSystem[passwords[username,password],\
                           softwareLicense.softwareDescription[manufacturer,name,version,referenceCode]],\
                           hourlyBillingFlag,userData,billingItem.recurringFee,\
                           tagReferences[id,tag[name,id]],networkVlans[id,vlanNumber,networkSpace]]";

/// Filters for [`VsManager::list_instances`]. Unset fields do not filter.
#[derive(Debug, Clone)]
pub struct ListInstances {
    pub hourly: bool,
    pub monthly: bool,
    pub tags: Vec<String>,
    pub cpus: Option<u32>,
    /// Megabytes
    pub memory: Option<u32>,
    pub hostname: Option<String>,
    pub domain: Option<String>,
    pub local_disk: Option<bool>,
    pub datacenter: Option<String>,
    /// Mbps
    pub nic_speed: Option<u32>,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
    pub mask: Option<String>,
    /// Merged under the generated filter; its entries win
    pub filter: Option<ObjectFilter>,
    pub limit: Option<u32>,
}

impl Default for ListInstances {
    fn default() -> Self {
        Self {
            hourly: true,
            monthly: true,
            tags: Vec::new(),
            cpus: None,
            memory: None,
            hostname: None,
            domain: None,
            local_disk: None,
            datacenter: None,
            nic_speed: None,
            public_ip: None,
            private_ip: None,
            mask: None,
            filter: None,
            limit: None,
        }
    }
}

impl ListInstances {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn hourly_only(mut self) -> Self {
        self.hourly = true;
        self.monthly = false;
        self
    }

    #[must_use]
    pub fn monthly_only(mut self) -> Self {
        self.hourly = false;
        self.monthly = true;
        self
    }

    #[must_use]
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn datacenter(mut self, datacenter: impl Into<String>) -> Self {
        self.datacenter = Some(datacenter.into());
        self
    }

    #[must_use]
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn public_ip(mut self, ip: impl Into<String>) -> Self {
        self.public_ip = Some(ip.into());
        self
    }

    #[must_use]
    pub fn private_ip(mut self, ip: impl Into<String>) -> Self {
        self.private_ip = Some(ip.into());
        self
    }

    #[must_use]
    pub fn mask(mut self, mask: impl Into<String>) -> Self {
        self.mask = Some(mask.into());
        self
    }

    /// `SoftLayer_Account` method selected by the hourly/monthly flags.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match (self.hourly, self.monthly) {
            (true, false) => "getHourlyVirtualGuests",
            (false, true) => "getMonthlyVirtualGuests",
            _ => "getVirtualGuests",
        }
    }

    /// The object filter these options describe, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if a caller filter conflicts with
    /// a generated path.
    pub fn to_filter(&self) -> Result<ObjectFilter, Error> {
        let mut filter = ObjectFilter::new();
        let mut set = |path: &str, node| {
            filter
                .set(&format!("virtualGuests.{path}"), node)
                .map_err(|e| Error::InvalidArgument(e.to_string()))
        };

        if !self.tags.is_empty() {
            set("tagReferences.tag.name", query_filter_in(self.tags.iter().map(String::as_str)))?;
        }
        if let Some(cpus) = self.cpus {
            set("maxCpu", query_filter(cpus))?;
        }
        if let Some(memory) = self.memory {
            set("maxMemory", query_filter(memory))?;
        }
        if let Some(hostname) = &self.hostname {
            set("hostname", query_filter(hostname))?;
        }
        if let Some(domain) = &self.domain {
            set("domain", query_filter(domain))?;
        }
        if let Some(local_disk) = self.local_disk {
            set("localDiskFlag", query_filter(local_disk))?;
        }
        if let Some(datacenter) = &self.datacenter {
            set("datacenter.name", query_filter(datacenter))?;
        }
        if let Some(speed) = self.nic_speed {
            set("networkComponents.maxSpeed", query_filter(speed))?;
        }
        if let Some(ip) = &self.public_ip {
            set("primaryIpAddress", query_filter(ip))?;
        }
        if let Some(ip) = &self.private_ip {
            set("primaryBackendIpAddress", query_filter(ip))?;
        }

        if let Some(overriding) = &self.filter {
            filter.merge(overriding);
        }
        // The hourly and monthly methods still filter under `virtualGuests`,
        // so the ordering is pinned there instead of at the method's scope.
        Ok(fix_filter(Some(filter), Some("virtualGuests")))
    }
}

async fn list_instances(client: &Client, opts: &ListInstances) -> Result<Vec<Value>, Error> {
    let mut call = CallOptions::new()
        .mask(opts.mask.as_deref().unwrap_or(LIST_MASK))
        .filter(opts.to_filter()?);
    call.limit = opts.limit;
    tracing::debug!(method = opts.method(), "listing virtual servers");
    client
        .iter_call("Account", opts.method(), vec![], call)?
        .try_collect()
        .await
}

async fn ids_of(client: &Client, opts: ListInstances) -> Result<Vec<i64>, Error> {
    Ok(list_instances(client, &opts.mask("id"))
        .await?
        .iter()
        .filter_map(|guest| guest["id"].as_i64())
        .collect())
}

/// Virtual server queries for one account.
#[derive(Debug, Clone)]
pub struct VsManager {
    client: Client,
    resolver: IdentifierResolver,
}

impl VsManager {
    /// Identifiers resolve by IP address (public, then private), then by
    /// hostname.
    #[must_use]
    pub fn new(client: Client) -> Self {
        let by_ip = {
            let client = client.clone();
            resolver_fn("ip_address", move |identifier: String| {
                let client = client.clone();
                async move {
                    if identifier.trim().parse::<Ipv4Addr>().is_err() {
                        return Ok(Vec::new());
                    }
                    let ids =
                        ids_of(&client, ListInstances::new().public_ip(identifier.trim())).await?;
                    if !ids.is_empty() {
                        return Ok(ids);
                    }
                    ids_of(&client, ListInstances::new().private_ip(identifier.trim())).await
                }
            })
        };
        let by_hostname = {
            let client = client.clone();
            resolver_fn("hostname", move |identifier: String| {
                let client = client.clone();
                async move { ids_of(&client, ListInstances::new().hostname(identifier)).await }
            })
        };

        Self {
            resolver: IdentifierResolver::new("virtual server")
                .with(by_ip)
                .with(by_hostname),
            client,
        }
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Every matching server, across all pages.
    ///
    /// # Errors
    ///
    /// Returns the first page error.
    pub async fn list_instances(&self, opts: &ListInstances) -> Result<Vec<Value>, Error> {
        list_instances(&self.client, opts).await
    }

    /// # Errors
    ///
    /// Returns the API error of `SoftLayer_Virtual_Guest.getObject`.
    pub async fn get_instance(&self, instance_id: i64, mask: Option<&str>) -> Result<Value, Error> {
        self.client
            .call(
                "Virtual_Guest",
                "getObject",
                vec![],
                CallOptions::new()
                    .id(instance_id)
                    .mask(mask.unwrap_or(DETAIL_MASK)),
            )
            .await
    }

    /// All ids an identifier may refer to.
    ///
    /// # Errors
    ///
    /// Propagates lookup errors.
    pub async fn resolve_ids(&self, identifier: &str) -> Result<Vec<i64>, Error> {
        self.resolver.resolve_ids(identifier).await
    }

    /// # Errors
    ///
    /// Returns [`Error::Resolver`] unless exactly one server matches.
    pub async fn resolve_id(&self, identifier: &str) -> Result<i64, Error> {
        self.resolver.resolve_id(identifier).await
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::testing::FakeApi;
    use serde_json::json;

    fn filter_value(request: &sl_client::ApiRequest) -> Value {
        request.filter.as_ref().unwrap().to_value()
    }

    #[test]
    fn options_select_the_method() {
        assert_eq!(ListInstances::new().method(), "getVirtualGuests");
        assert_eq!(ListInstances::new().hourly_only().method(), "getHourlyVirtualGuests");
        assert_eq!(ListInstances::new().monthly_only().method(), "getMonthlyVirtualGuests");
    }

    #[test]
    fn options_build_a_nested_filter() {
        let mut opts = ListInstances::new()
            .datacenter("dal13")
            .tags(["web", "prod"])
            .hostname("web*");
        opts.cpus = Some(4);
        opts.local_disk = Some(false);

        assert_eq!(
            opts.to_filter().unwrap().to_value(),
            json!({"virtualGuests": {
                "id": {"operation": "orderBy", "options": [{"name": "sort", "value": ["ASC"]}]},
                "datacenter": {"name": {"operation": "_= dal13"}},
                "hostname": {"operation": "^= web"},
                "maxCpu": {"operation": 4},
                "localDiskFlag": {"operation": false},
                "tagReferences": {"tag": {"name": {"operation": "in", "options": [
                    {"name": "data", "value": ["web", "prod"]}
                ]}}}
            }})
        );
    }

    #[tokio::test]
    async fn listing_walks_every_page() {
        let api = FakeApi::new().on("SoftLayer_Account.getHourlyVirtualGuests", |request| {
            let all: Vec<Value> = (1..=5).map(|id| json!({"id": id})).collect();
            let start = request.offset as usize;
            let end = (start + request.limit.unwrap_or(100) as usize).min(all.len());
            Ok(Value::Array(all[start.min(end)..end].to_vec()))
        });
        let manager = VsManager::new(api.client());
        let mut opts = ListInstances::new().hourly_only();
        opts.limit = Some(2);

        let guests = manager.list_instances(&opts).await.unwrap();

        assert_eq!(guests.len(), 5);
        assert_eq!(api.calls("SoftLayer_Account.getHourlyVirtualGuests"), 3);
        let last = api.last_request("SoftLayer_Account.getHourlyVirtualGuests").unwrap();
        assert_eq!(last.mask.as_deref(), Some(LIST_MASK));
        assert!(filter_value(&last)["virtualGuests"]["id"].is_object());
    }

    #[tokio::test]
    async fn ip_addresses_try_public_then_private() {
        let api = FakeApi::new().on("SoftLayer_Account.getVirtualGuests", |request| {
            let guests = &filter_value(request)["virtualGuests"];
            if guests["primaryBackendIpAddress"]["operation"] == "_= 10.0.0.5" {
                Ok(json!([{"id": 77}]))
            } else {
                Ok(json!([]))
            }
        });
        let manager = VsManager::new(api.client());

        assert_eq!(manager.resolve_id("10.0.0.5").await.unwrap(), 77);
        assert_eq!(api.calls("SoftLayer_Account.getVirtualGuests"), 2);
        let request = api.last_request("SoftLayer_Account.getVirtualGuests").unwrap();
        assert_eq!(request.mask.as_deref(), Some("id"));
    }

    #[tokio::test]
    async fn hostnames_resolve_after_ips() {
        let api = FakeApi::new().on("SoftLayer_Account.getVirtualGuests", |request| {
            let guests = &filter_value(request)["virtualGuests"];
            if guests["hostname"]["operation"] == "_= web1" {
                Ok(json!([{"id": 1}, {"id": 2}]))
            } else {
                Ok(json!([]))
            }
        });
        let manager = VsManager::new(api.client());

        assert_eq!(manager.resolve_ids("web1").await.unwrap(), vec![1, 2]);
        assert_eq!(api.calls("SoftLayer_Account.getVirtualGuests"), 1);

        let err = manager.resolve_id("web1").await.unwrap_err();
        assert_eq!(err.kind(), "resolver_error");
        assert_eq!(err.to_string(), "Multiple virtual server found for 'web1': 1, 2");
    }

    #[tokio::test]
    async fn numeric_identifiers_skip_lookups() {
        let api = FakeApi::new();
        let manager = VsManager::new(api.client());
        assert_eq!(manager.resolve_id("12345").await.unwrap(), 12345);
        assert_eq!(api.calls("SoftLayer_Account.getVirtualGuests"), 0);

        let api = FakeApi::new().on("SoftLayer_Account.getVirtualGuests", |_| Ok(json!([])));
        let err = VsManager::new(api.client())
            .resolve_id("ghost")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unable to find virtual server 'ghost'");
    }

    #[tokio::test]
    async fn instances_use_the_detail_mask_by_default() {
        let api = FakeApi::new().on("SoftLayer_Virtual_Guest.getObject", |request| {
            Ok(json!({"id": request.identifier, "hostname": "web1"}))
        });
        let manager = VsManager::new(api.client());

        let guest = manager.get_instance(12, None).await.unwrap();
        assert_eq!(guest["id"], 12);
        let request = api.last_request("SoftLayer_Virtual_Guest.getObject").unwrap();
        assert_eq!(request.mask.as_deref(), Some(DETAIL_MASK));

        manager.get_instance(12, Some("mask[id]")).await.unwrap();
        let request = api.last_request("SoftLayer_Virtual_Guest.getObject").unwrap();
        assert_eq!(request.mask.as_deref(), Some("mask[id]"));
    }
}
