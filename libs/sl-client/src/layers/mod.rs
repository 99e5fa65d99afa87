//! Transport decorators
//!
//! Each decorator is a `tower::Layer` whose service is itself a
//! [`Transport`](crate::transport::Transport), so they stack with
//! `tower::ServiceBuilder`:
//!
//! - [`RetryLayer`] - retries retriable failures with exponential backoff and jitter
//! - [`DiagnosticsLayer`] - records every exchange into a bounded ring buffer
//!
//! The client stacks retry outside diagnostics so that each attempt is
//! recorded.

mod diagnostics;
mod retry;

pub use diagnostics::{
    CallRecord, DEFAULT_DIAGNOSTICS_CAPACITY, Diagnostics, DiagnosticsLayer, DiagnosticsTransport,
};
pub use retry::{RetryLayer, RetryTransport, calculate_backoff, retry_trigger};
