use async_trait::async_trait;
use serde_json::{Map, Value, json};
use sl_query::format_object_mask;

use super::http::HttpSender;
use super::{Transport, base_headers, join_url, preview};
use crate::error::{Error, TransportFailure};
use crate::request::{ApiRequest, ApiResponse, PreparedRequest, TransportKind};

pub mod codec;

pub use codec::{CodecError, MethodResponse, decode_response, encode_call};

/// XML-RPC transport: `POST <endpoint>/<Service>` with a `methodCall` body.
///
/// The first positional parameter is the header container
/// (`{"headers": {...}}`) carrying `authenticate`, `<Service>InitParameters`,
/// `<Service>ObjectMask`, `<Service>ObjectFilter` and `resultLimit`.
#[derive(Debug, Default)]
pub struct XmlRpcTransport {
    http: HttpSender,
}

impl XmlRpcTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The `headers` struct prepended to the call arguments.
    #[must_use]
    pub fn header_container(request: &ApiRequest) -> Map<String, Value> {
        let service = &request.service;
        let mut headers = request.headers.clone();
        if let Some(id) = request.identifier {
            headers.insert(format!("{service}InitParameters"), json!({ "id": id }));
        }
        if let Some(mask) = request.mask.as_deref().filter(|m| !m.trim().is_empty()) {
            headers.insert(
                format!("{service}ObjectMask"),
                json!({ "mask": format_object_mask(mask) }),
            );
        }
        if let Some(filter) = request.filter.as_ref().filter(|f| !f.is_empty()) {
            headers.insert(format!("{service}ObjectFilter"), filter.to_value());
        }
        if let Some(limit) = request.limit {
            headers.insert(
                "resultLimit".to_owned(),
                json!({ "limit": limit, "offset": request.offset }),
            );
        }
        headers
    }

    fn decode(request: &ApiRequest, raw: &super::RawResponse) -> Result<ApiResponse, Error> {
        let operation = request.operation();
        match decode_response(&raw.body) {
            Ok(MethodResponse::Fault { code, message }) => {
                tracing::debug!(operation = %operation, fault_code = %code, "service fault");
                Err(Error::api(operation, code, message, Some(raw.status)))
            }
            Ok(MethodResponse::Success(value)) if raw.is_success() => Ok(ApiResponse {
                value,
                http_status: raw.status,
                total_items: raw.total_items,
            }),
            Ok(MethodResponse::Success(_)) => Err(status_error(operation, raw)),
            Err(_) if !raw.is_success() => Err(status_error(operation, raw)),
            Err(e) => Err(Error::parse(operation, e.to_string())),
        }
    }
}

fn status_error(operation: String, raw: &super::RawResponse) -> Error {
    Error::transport(
        operation,
        TransportFailure::Status(raw.status),
        format!("HTTP {}: {}", raw.status, preview(&raw.body)),
    )
}

#[async_trait]
impl Transport for XmlRpcTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::XmlRpc
    }

    fn prepare(&self, request: &ApiRequest) -> Result<PreparedRequest, Error> {
        let mut params = Vec::with_capacity(request.args.len() + 1);
        params.push(json!({ "headers": Self::header_container(request) }));
        params.extend(request.args.iter().cloned());

        let body = encode_call(&request.method, &params)
            .map_err(|e| Error::parse(request.operation(), e.to_string()))?;
        Ok(PreparedRequest {
            verb: reqwest::Method::POST,
            url: join_url(&request.endpoint_url, &request.service),
            headers: base_headers(request, "application/xml"),
            body: Some(body),
        })
    }

    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, Error> {
        let prepared = self.prepare(request)?;
        let raw = self.http.send(request, &prepared).await?;
        Self::decode(request, &raw)
    }
}
