//! Client configuration.
//!
//! [`ClientConfig::load`] layers, lowest precedence first:
//!
//! 1. library defaults
//! 2. a config file: the `[softlayer]` section of an INI file, or a flat YAML
//!    document when the file ends in `.yaml`/`.yml`
//! 3. environment: `SL_USERNAME`, `SL_API_KEY`, `SL_ENDPOINT_URL`, `https_proxy`
//!
//! Explicit values given to [`ClientBuilder`](crate::ClientBuilder) override all
//! of the above.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Error;
use crate::request::TransportKind;

pub mod ini;
pub mod retry;

pub use ini::IniFile;
pub use retry::{ExponentialBackoff, RetryConfig, RetryTrigger, is_idempotent_call};

/// Public network XML-RPC endpoint
pub const API_PUBLIC_ENDPOINT: &str = "https://api.softlayer.com/xmlrpc/v3.1/";
/// Private network XML-RPC endpoint
pub const API_PRIVATE_ENDPOINT: &str = "https://api.service.softlayer.com/xmlrpc/v3.1/";
/// Public network REST endpoint
pub const API_PUBLIC_ENDPOINT_REST: &str = "https://api.softlayer.com/rest/v3.1/";
/// Private network REST endpoint
pub const API_PRIVATE_ENDPOINT_REST: &str = "https://api.service.softlayer.com/rest/v3.1/";

pub const IAM_TOKEN_ENDPOINT: &str = "https://iam.cloud.ibm.com/identity/token";
pub const IAM_ACCOUNTS_ENDPOINT: &str = "https://accounts.cloud.ibm.com/v1/accounts";

/// Per-request timeout when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Library part of the User-Agent
pub const DEFAULT_USER_AGENT: &str = concat!("softlayer-rs/", env!("CARGO_PKG_VERSION"));

/// Default User-Agent: library name and version plus the runtime platform.
#[must_use]
pub fn user_agent() -> String {
    format!(
        "{DEFAULT_USER_AGENT} ({}; {})",
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Default endpoint for a transport on the public network.
#[must_use]
pub fn default_endpoint(kind: TransportKind) -> &'static str {
    match kind {
        TransportKind::XmlRpc => API_PUBLIC_ENDPOINT,
        TransportKind::Rest => API_PUBLIC_ENDPOINT_REST,
    }
}

/// `~/.softlayer`
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".softlayer"))
}

const ENV_KEYS: [(&str, &str); 5] = [
    ("SL_USERNAME", "username"),
    ("SL_API_KEY", "api_key"),
    ("SL_ENDPOINT_URL", "endpoint_url"),
    ("HTTPS_PROXY", "proxy"),
    ("SL_TIMEOUT", "timeout"),
];

/// Settings read from files and the environment.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
    /// Seconds
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient"
    )]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_bool"
    )]
    pub verify: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ims_account: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient"
    )]
    pub userid: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("ClientConfig")
            .field("username", &self.username)
            .field("api_key", &redact(&self.api_key))
            .field("endpoint_url", &self.endpoint_url)
            .field("timeout", &self.timeout)
            .field("proxy", &self.proxy)
            .field("verify", &self.verify)
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("account_id", &self.account_id)
            .field("ims_account", &self.ims_account)
            .field("userid", &self.userid)
            .field("transport", &self.transport)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl ClientConfig {
    /// Load configuration from `file` (or `~/.softlayer`) and the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a file cannot be read or a value has the
    /// wrong shape.
    pub fn load(file: Option<&Path>) -> Result<Self, Error> {
        let path = file.map(Path::to_path_buf).or_else(default_config_path);
        Self::figment(path.as_deref())
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// The layered figment behind [`load`](Self::load).
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(ClientConfig::default()));
        if let Some(path) = file {
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
            figment = if is_yaml {
                figment.merge(Yaml::file(path))
            } else {
                figment.merge(IniFile::file(path))
            };
        }
        figment.merge(Env::raw().filter_map(|key| {
            ENV_KEYS
                .iter()
                .find(|(name, _)| key == *name)
                .map(|(_, field)| (*field).into())
        }))
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout.map_or(DEFAULT_TIMEOUT, Duration::from_secs)
    }

    #[must_use]
    pub fn transport(&self) -> TransportKind {
        self.transport.unwrap_or_default()
    }

    #[must_use]
    pub fn endpoint_url(&self) -> &str {
        self.endpoint_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| default_endpoint(self.transport()))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOr<T> {
    Value(T),
    Text(String),
}

/// Accept a value either typed or as a string (INI and environment values).
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: fmt::Display,
{
    match Option::<StringOr<T>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(StringOr::Value(v)) => Ok(Some(v)),
        Some(StringOr::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(StringOr::Text(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<StringOr<bool>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(StringOr::Value(v)) => Ok(Some(v)),
        Some(StringOr::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            other => Err(serde::de::Error::custom(format!(
                "expected a boolean, got '{other}'"
            ))),
        },
    }
}
