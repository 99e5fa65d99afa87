#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Query DSL for the SoftLayer API.
//!
//! Two server-side query facilities are modelled here:
//!
//! - **Object masks** ([`ObjectMask`]) project which relational properties the
//!   service populates, e.g. `mask[id,hostname,datacenter.name]`.
//! - **Object filters** ([`ObjectFilter`]) are predicate trees applied to
//!   list-returning methods. Leaves are operation objects produced by the
//!   shorthand helpers in [`shorthand`].
//!
//! Both are plain values: nothing here performs I/O, and the wire JSON is only
//! produced at the transport boundary via [`ObjectFilter::to_value`] or serde.

pub mod error;
pub mod filter;
pub mod mask;
pub mod shorthand;

pub use error::QueryError;
pub use filter::{FilterNode, FilterOption, ObjectFilter, Operation};
pub use mask::{ObjectMask, format_object_mask};
pub use shorthand::{
    FilterQuery, SortDirection, fix_filter, query_filter, query_filter_date, query_filter_in,
    query_filter_orderby,
};
