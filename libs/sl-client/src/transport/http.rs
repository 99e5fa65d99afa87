use std::collections::HashMap;
use std::error::Error as StdError;

use parking_lot::Mutex;

use crate::error::{Error, TransportFailure};
use crate::request::{ApiRequest, PreparedRequest};

/// Response header carrying the size of a list result.
pub const TOTAL_ITEMS_HEADER: &str = "softlayer-total-items";

/// Body and metadata of one HTTP exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub total_items: Option<u64>,
    pub body: String,
}

impl RawResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClientKey {
    proxy: Option<String>,
    verify: bool,
}

/// Sends prepared requests, keeping one pooled `reqwest::Client` per
/// proxy/TLS-verification pair.
#[derive(Debug, Default)]
pub struct HttpSender {
    clients: Mutex<HashMap<ClientKey, reqwest::Client>>,
}

impl HttpSender {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self, proxy: Option<&str>, verify: bool) -> Result<reqwest::Client, Error> {
        let key = ClientKey {
            proxy: proxy.map(ToOwned::to_owned),
            verify,
        };
        if let Some(client) = self.clients.lock().get(&key) {
            return Ok(client.clone());
        }

        let mut builder = reqwest::Client::builder();
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| Error::Config(format!("invalid proxy '{proxy}': {e}")))?;
            builder = builder.proxy(proxy);
        }
        if !verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        self.clients.lock().insert(key, client.clone());
        Ok(client)
    }

    /// Perform the exchange. HTTP error statuses are returned as responses;
    /// only failures to complete the exchange are errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] for connect, TLS, timeout and I/O failures.
    pub async fn send(
        &self,
        request: &ApiRequest,
        prepared: &PreparedRequest,
    ) -> Result<RawResponse, Error> {
        let operation = request.operation();
        let client = self.client(request.proxy.as_deref(), request.verify)?;

        let mut builder = client
            .request(prepared.verb.clone(), &prepared.url)
            .timeout(request.timeout);
        for (name, value) in &prepared.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &prepared.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(&operation, &e))?;
        let status = response.status().as_u16();
        let total_items = response
            .headers()
            .get(TOTAL_ITEMS_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        let body = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(&operation, &e))?;

        tracing::debug!(
            operation = %operation,
            verb = %prepared.verb,
            url = %prepared.url,
            status,
            total_items = ?total_items,
            "exchange complete"
        );
        Ok(RawResponse {
            status,
            total_items,
            body,
        })
    }
}

pub(crate) fn map_reqwest_error(operation: &str, err: &reqwest::Error) -> Error {
    if err.is_builder() {
        return Error::InvalidArgument(format!("{operation}: {err}"));
    }
    let failure = if err.is_timeout() {
        TransportFailure::Timeout
    } else if is_tls_failure(err) {
        TransportFailure::Tls
    } else if err.is_connect() {
        TransportFailure::Connect
    } else {
        TransportFailure::Io
    };
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    Error::transport(operation, failure, message)
}

fn is_tls_failure(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cause) = source {
        let text = cause.to_string().to_ascii_lowercase();
        if text.contains("certificate") || text.contains("tls") || text.contains("handshake") {
            return true;
        }
        source = cause.source();
    }
    false
}
