#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Client runtime for the SoftLayer API.
//!
//! A [`Client`] dispatches `Service.method` calls over XML-RPC or REST,
//! applying the configured [`Credential`], retrying transient failures and
//! recording every exchange for diagnostics.
//!
//! ```rust,ignore
//! use sl_client::{CallOptions, Client};
//!
//! let client = Client::from_env()?;
//! let hostnames = client
//!     .service("Account")
//!     .call("getVirtualGuests", vec![], CallOptions::new().mask("id,hostname"))
//!     .await?;
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod layers;
pub mod pager;
pub mod request;
pub mod resolver;
pub mod secret;
pub mod transport;

pub use auth::{Authenticator, Credential, IamAccount, IamClient, IamToken};
pub use client::{Client, ClientBuilder, ServiceHandle};
pub use config::{ClientConfig, RetryConfig};
pub use error::{ApiErrorKind, Error, Result, TransportFailure};
pub use layers::CallRecord;
pub use pager::OffsetPager;
pub use request::{ApiRequest, ApiResponse, CallOptions, TransportKind};
pub use resolver::{IdentifierResolver, Resolver, resolver_fn};
pub use secret::SecretString;
pub use transport::Transport;

pub use sl_query as query;
