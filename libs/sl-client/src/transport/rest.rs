use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose;
use serde_json::{Value, json};
use sl_query::format_object_mask;
use url::Url;
use zeroize::Zeroizing;

use super::http::{HttpSender, RawResponse};
use super::{Transport, base_headers, join_url, preview};
use crate::error::Error;
use crate::request::{ApiRequest, ApiResponse, PreparedRequest, TransportKind};
use crate::secret::SecretString;

/// REST/JSON transport: `<endpoint>/<Service>[/<id>]/<method>.json`.
#[derive(Debug, Default)]
pub struct RestTransport {
    http: HttpSender,
}

/// HTTP verb for a method name. Requests carrying arguments cannot be GETs
/// and are promoted to POST by [`RestTransport::prepare`].
#[must_use]
pub fn verb_for_method(method: &str) -> reqwest::Method {
    if method.starts_with("get") {
        reqwest::Method::GET
    } else if method.starts_with("delete") {
        reqwest::Method::DELETE
    } else if method.starts_with("edit") || method.starts_with("update") {
        reqwest::Method::PUT
    } else {
        reqwest::Method::POST
    }
}

impl RestTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn url(request: &ApiRequest) -> Result<Url, Error> {
        let mut path = request.service.clone();
        if let Some(id) = request.identifier {
            path.push('/');
            path.push_str(&id.to_string());
        }
        path.push('/');
        path.push_str(&request.method);
        path.push_str(".json");

        let raw = join_url(&request.endpoint_url, &path);
        let mut url = Url::parse(&raw)
            .map_err(|e| Error::InvalidArgument(format!("invalid endpoint URL '{raw}': {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(mask) = request.mask.as_deref().filter(|m| !m.trim().is_empty()) {
                query.append_pair("objectMask", &format_object_mask(mask));
            }
            if let Some(filter) = request.filter.as_ref().filter(|f| !f.is_empty()) {
                query.append_pair("objectFilter", &filter.to_value().to_string());
            }
            if request.limit.is_some() || request.offset > 0 {
                let limit = request.limit.unwrap_or(0);
                query.append_pair("resultLimit", &format!("{},{limit}", request.offset));
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    fn decode(request: &ApiRequest, raw: &RawResponse) -> Result<ApiResponse, Error> {
        let operation = request.operation();
        let status = raw.status;

        if !raw.is_success() {
            return Err(error_from_body(operation, raw));
        }
        if raw.body.trim().is_empty() {
            return Err(Error::api(
                operation,
                status.to_string(),
                "Empty response.",
                Some(status),
            ));
        }
        let value: Value = serde_json::from_str(&raw.body).map_err(|e| {
            Error::parse(
                operation.clone(),
                format!("{e}: {}", preview(&raw.body)),
            )
        })?;
        Ok(ApiResponse {
            value,
            http_status: status,
            total_items: raw.total_items,
        })
    }
}

/// Error replies carry `{"error": "...", "code": "..."}`; the HTTP status
/// stands in for a missing code.
fn error_from_body(operation: String, raw: &RawResponse) -> Error {
    let status = raw.status;
    let parsed: Option<Value> = serde_json::from_str(&raw.body).ok();
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(Value::as_str)
        .map_or_else(
            || {
                if raw.body.trim().is_empty() {
                    "Empty response.".to_owned()
                } else {
                    preview(&raw.body)
                }
            },
            ToOwned::to_owned,
        );
    let code = parsed
        .as_ref()
        .and_then(|v| v.get("code"))
        .and_then(|c| match c {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| status.to_string());
    tracing::debug!(operation = %operation, status, fault_code = %code, "REST error reply");
    Error::api(operation, code, message, Some(status))
}

#[async_trait]
impl Transport for RestTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Rest
    }

    fn prepare(&self, request: &ApiRequest) -> Result<PreparedRequest, Error> {
        let url = Self::url(request)?;
        let mut verb = verb_for_method(&request.method);
        let body = if request.args.is_empty() {
            None
        } else {
            if verb == reqwest::Method::GET {
                verb = reqwest::Method::POST;
            }
            Some(json!({ "parameters": request.args }).to_string())
        };

        let mut headers = base_headers(request, "application/json");
        if let Some(user) = &request.transport_user {
            let password = request
                .transport_password
                .as_ref()
                .map(SecretString::expose)
                .unwrap_or_default();
            let credentials = Zeroizing::new(format!("{user}:{password}"));
            let encoded = Zeroizing::new(general_purpose::STANDARD.encode(credentials.as_bytes()));
            headers.push(("Authorization".to_owned(), format!("Basic {}", &*encoded)));
        }

        Ok(PreparedRequest {
            verb,
            url: url.into(),
            headers,
            body,
        })
    }

    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, Error> {
        let prepared = self.prepare(request)?;
        let raw = self.http.send(request, &prepared).await?;
        Self::decode(request, &raw)
    }
}
