use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tower::Layer;

use crate::error::Error;
use crate::request::{ApiRequest, ApiResponse, PreparedRequest, TransportKind};
use crate::transport::Transport;

pub const DEFAULT_DIAGNOSTICS_CAPACITY: usize = 1000;

/// Hex characters of the argument digest kept per record.
const ARGS_DIGEST_LEN: usize = 16;

/// One exchange as seen by the diagnostics layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallRecord {
    pub service: String,
    pub method: String,
    /// Truncated SHA-256 of the JSON-encoded arguments
    pub args_digest: String,
    pub transport: TransportKind,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub http_status: Option<u16>,
    pub fault_code: Option<String>,
}

/// Bounded, shared ring buffer of [`CallRecord`]s. Clones share the buffer.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    records: Arc<Mutex<VecDeque<CallRecord>>>,
    capacity: usize,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(DEFAULT_DIAGNOSTICS_CAPACITY)
    }
}

impl Diagnostics {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(64)))),
            capacity,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a record, evicting the oldest once full.
    pub fn push(&self, record: CallRecord) {
        if self.capacity == 0 {
            return;
        }
        let mut records = self.records.lock();
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Records oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<CallRecord> {
        self.records.lock().iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

fn args_digest(args: &[Value]) -> String {
    let encoded = serde_json::to_vec(args).unwrap_or_default();
    let mut digest = hex::encode(Sha256::digest(&encoded));
    digest.truncate(ARGS_DIGEST_LEN);
    digest
}

/// Tower layer recording each exchange of the wrapped transport.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsLayer {
    diagnostics: Diagnostics,
}

impl DiagnosticsLayer {
    #[must_use]
    pub fn new(diagnostics: Diagnostics) -> Self {
        Self { diagnostics }
    }
}

impl<S> Layer<S> for DiagnosticsLayer {
    type Service = DiagnosticsTransport<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DiagnosticsTransport {
            inner,
            diagnostics: self.diagnostics.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiagnosticsTransport<S> {
    inner: S,
    diagnostics: Diagnostics,
}

#[async_trait]
impl<S: Transport> Transport for DiagnosticsTransport<S> {
    fn kind(&self) -> TransportKind {
        self.inner.kind()
    }

    fn prepare(&self, request: &ApiRequest) -> Result<PreparedRequest, Error> {
        self.inner.prepare(request)
    }

    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, Error> {
        let started_at = Utc::now();
        let start = Instant::now();
        let result = self.inner.send(request).await;
        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (http_status, fault_code) = match &result {
            Ok(response) => (Some(response.http_status), None),
            Err(err) => (err.http_status(), err.fault_code().map(ToOwned::to_owned)),
        };
        self.diagnostics.push(CallRecord {
            service: request.service.clone(),
            method: request.method.clone(),
            args_digest: args_digest(&request.args),
            transport: self.inner.kind(),
            started_at,
            elapsed_ms,
            http_status,
            fault_code,
        });
        result
    }
}
