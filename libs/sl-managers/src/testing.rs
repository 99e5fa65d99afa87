//! In-memory API for manager tests: canned replies keyed by
//! `Service.method`, with every request kept for inspection.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use sl_client::request::PreparedRequest;
use sl_client::transport::XmlRpcTransport;
use sl_client::{ApiRequest, ApiResponse, Client, Error, RetryConfig, Transport, TransportKind};

type Handler = Arc<dyn Fn(&ApiRequest) -> Result<Value, Error> + Send + Sync>;

#[derive(Clone, Default)]
pub struct FakeApi {
    handlers: Arc<Mutex<HashMap<String, Handler>>>,
    requests: Arc<Mutex<Vec<ApiRequest>>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(self, operation: &str, handler: F) -> Self
    where
        F: Fn(&ApiRequest) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .insert(operation.to_owned(), Arc::new(handler));
        self
    }

    pub fn client(&self) -> Client {
        Client::builder()
            .transport(self.clone())
            .retry(RetryConfig::disabled())
            .build()
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.operation() == operation)
            .count()
    }

    pub fn last_request(&self, operation: &str) -> Option<ApiRequest> {
        self.requests
            .lock()
            .iter()
            .rev()
            .find(|r| r.operation() == operation)
            .cloned()
    }
}

#[async_trait]
impl Transport for FakeApi {
    fn kind(&self) -> TransportKind {
        TransportKind::XmlRpc
    }

    fn prepare(&self, request: &ApiRequest) -> Result<PreparedRequest, Error> {
        XmlRpcTransport::new().prepare(request)
    }

    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, Error> {
        self.requests.lock().push(request.clone());
        let operation = request.operation();
        let handler = self.handlers.lock().get(&operation).cloned();
        let value = match handler {
            Some(handler) => handler(request)?,
            None => {
                return Err(Error::api(
                    operation,
                    "SoftLayer_Exception_MethodNotFound",
                    "no canned reply",
                    Some(404),
                ));
            }
        };
        Ok(ApiResponse {
            value,
            http_status: 200,
            total_items: None,
        })
    }
}
