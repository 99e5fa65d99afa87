use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sl_query::ObjectFilter;

use crate::config::DEFAULT_TIMEOUT;
use crate::secret::SecretString;

/// Wire encoding used by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    #[serde(alias = "xml-rpc", alias = "xml_rpc")]
    XmlRpc,
    #[serde(alias = "json")]
    Rest,
}

impl TransportKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::XmlRpc => "xmlrpc",
            TransportKind::Rest => "rest",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call options. Explicit values here take precedence over client
/// defaults.
///
/// ```
/// use sl_client::CallOptions;
///
/// let opts = CallOptions::new().id(1234).mask("id,hostname").limit(50);
/// assert_eq!(opts.id, Some(1234));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Implicit object id (`<Service>InitParameters`)
    pub id: Option<i64>,
    pub mask: Option<String>,
    pub filter: Option<ObjectFilter>,
    /// Extra entries for the header container
    pub headers: Map<String, Value>,
    /// Extra HTTP headers
    pub raw_headers: Vec<(String, String)>,
    pub limit: Option<u32>,
    pub offset: u32,
    /// Retries after the first attempt; overrides the client policy
    pub retries: Option<usize>,
    /// Allow retrying a call that is not `get*`/`list*` shaped
    pub idempotent: bool,
    pub timeout: Option<Duration>,
    pub proxy: Option<String>,
    pub verify: Option<bool>,
}

impl CallOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn mask(mut self, mask: impl Into<String>) -> Self {
        self.mask = Some(mask.into());
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: ObjectFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: Value) -> Self {
        self.headers.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn raw_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.raw_headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    #[must_use]
    pub fn retries(mut self, retries: usize) -> Self {
        self.retries = Some(retries);
        self
    }

    #[must_use]
    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    #[must_use]
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = Some(verify);
        self
    }
}

/// A fully resolved call, ready for a transport to encode.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub endpoint_url: String,
    pub service: String,
    pub method: String,
    pub args: Vec<Value>,
    pub identifier: Option<i64>,
    pub mask: Option<String>,
    pub filter: Option<ObjectFilter>,
    /// Header-container entries, including `authenticate`
    pub headers: Map<String, Value>,
    pub limit: Option<u32>,
    pub offset: u32,
    /// HTTP Basic user for REST
    pub transport_user: Option<String>,
    pub transport_password: Option<SecretString>,
    pub transport_headers: Vec<(String, String)>,
    pub timeout: Duration,
    pub proxy: Option<String>,
    pub verify: bool,
    pub user_agent: String,
    pub idempotent: bool,
    pub retries: Option<usize>,
}

impl ApiRequest {
    pub fn new(
        endpoint_url: impl Into<String>,
        service: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            service: service.into(),
            method: method.into(),
            args: Vec::new(),
            identifier: None,
            mask: None,
            filter: None,
            headers: Map::new(),
            limit: None,
            offset: 0,
            transport_user: None,
            transport_password: None,
            transport_headers: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            proxy: None,
            verify: true,
            user_agent: crate::config::user_agent(),
            idempotent: false,
            retries: None,
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Copy per-call options onto the request. Unset options keep the values
    /// already present (client defaults).
    pub fn apply_options(&mut self, opts: &CallOptions) {
        self.identifier = opts.id;
        self.mask.clone_from(&opts.mask);
        self.filter.clone_from(&opts.filter);
        for (name, value) in &opts.headers {
            self.headers.insert(name.clone(), value.clone());
        }
        self.transport_headers
            .extend(opts.raw_headers.iter().cloned());
        self.limit = opts.limit;
        self.offset = opts.offset;
        self.retries = opts.retries;
        self.idempotent = opts.idempotent;
        if let Some(timeout) = opts.timeout {
            self.timeout = timeout;
        }
        if let Some(proxy) = &opts.proxy {
            self.proxy = Some(proxy.clone());
        }
        if let Some(verify) = opts.verify {
            self.verify = verify;
        }
    }

    /// `Service.method`, used in errors and logs.
    #[must_use]
    pub fn operation(&self) -> String {
        format!("{}.{}", self.service, self.method)
    }
}

/// Decoded reply of a single exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub value: Value,
    pub http_status: u16,
    /// `softlayer-total-items` header, present on list results
    pub total_items: Option<u64>,
}

/// A request rendered to its HTTP form, before it is sent.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub verb: reqwest::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl PreparedRequest {
    /// Render as a `curl` command. Credentials are replaced by placeholders.
    #[must_use]
    pub fn to_curl(&self) -> String {
        let mut parts = vec![format!("curl -X {} '{}'", self.verb, self.url)];
        for (name, value) in &self.headers {
            let value = if name.eq_ignore_ascii_case("authorization") {
                redact_authorization(value)
            } else {
                value.clone()
            };
            parts.push(format!("-H '{name}: {value}'"));
        }
        if let Some(body) = &self.body {
            parts.push(format!("-d '{}'", body.replace('\'', "'\\''")));
        }
        parts.join(" ")
    }

    /// Render as the raw HTTP request text. Credentials are replaced by
    /// placeholders in headers.
    #[must_use]
    pub fn to_raw(&self) -> String {
        let mut lines = vec![format!("{} {} HTTP/1.1", self.verb, self.url)];
        lines.extend(self.headers.iter().map(|(name, value)| {
            if name.eq_ignore_ascii_case("authorization") {
                format!("{name}: {}", redact_authorization(value))
            } else {
                format!("{name}: {value}")
            }
        }));
        let mut out = lines.join("\n");
        out.push('\n');
        if let Some(body) = &self.body {
            out.push('\n');
            out.push_str(body);
        }
        out
    }
}

fn redact_authorization(value: &str) -> String {
    match value.split_once(' ') {
        Some((scheme, _)) => format!("{scheme} $TOKEN"),
        None => "$TOKEN".to_owned(),
    }
}
