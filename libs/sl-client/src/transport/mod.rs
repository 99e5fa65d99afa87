//! Transports turn an [`ApiRequest`] into one HTTP exchange and decode the
//! reply. Decorators such as retry and diagnostics wrap a transport through
//! `tower::Layer` (see [`crate::layers`]).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;
use crate::request::{ApiRequest, ApiResponse, PreparedRequest, TransportKind};

pub mod http;
pub mod rest;
pub mod xmlrpc;

pub use http::{HttpSender, RawResponse, TOTAL_ITEMS_HEADER};
pub use rest::RestTransport;
pub use xmlrpc::XmlRpcTransport;

/// One request, one decoded reply.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Encoding used on the wire. Credentials are applied accordingly.
    fn kind(&self) -> TransportKind;

    /// Render the HTTP request without sending it.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be encoded.
    fn prepare(&self, request: &ApiRequest) -> Result<PreparedRequest, Error>;

    /// Send the request and decode the reply.
    ///
    /// # Errors
    ///
    /// Returns the [`Error`] taxonomy: transport failures, service faults and
    /// malformed replies.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, Error>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn kind(&self) -> TransportKind {
        (**self).kind()
    }

    fn prepare(&self, request: &ApiRequest) -> Result<PreparedRequest, Error> {
        (**self).prepare(request)
    }

    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, Error> {
        (**self).send(request).await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    fn kind(&self) -> TransportKind {
        (**self).kind()
    }

    fn prepare(&self, request: &ApiRequest) -> Result<PreparedRequest, Error> {
        (**self).prepare(request)
    }

    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, Error> {
        (**self).send(request).await
    }
}

/// Join an endpoint base and a path segment with exactly one slash.
pub(crate) fn join_url(endpoint: &str, path: &str) -> String {
    format!(
        "{}/{}",
        endpoint.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Headers sent on every exchange: the User-Agent, then per-call transport
/// headers (credentials, `raw_headers`).
pub(crate) fn base_headers(request: &ApiRequest, content_type: &str) -> Vec<(String, String)> {
    let mut headers = vec![
        ("Content-Type".to_owned(), content_type.to_owned()),
        ("User-Agent".to_owned(), request.user_agent.clone()),
    ];
    headers.extend(request.transport_headers.iter().cloned());
    headers
}

/// First part of a body, for error messages.
pub(crate) fn preview(body: &str) -> String {
    const LIMIT: usize = 200;
    let trimmed = body.trim();
    match trimmed.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_owned(),
    }
}
