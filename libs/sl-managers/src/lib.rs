//! Higher-level managers on top of [`sl_client`].
//!
//! - [`ordering`]: catalog lookups, price selection and order submission
//! - [`vs`]: virtual server listing and identifier resolution

pub mod ordering;
pub mod vs;

#[cfg(test)]
mod testing;

pub use ordering::{OrderRequest, OrderingManager};
pub use vs::{ListInstances, VsManager};
