//! Carts

pub mod durable;
pub mod errors;
pub mod models;
pub mod pricing;
pub mod records;
pub mod saved;
pub mod service;
pub mod store;

pub use errors::{CartsErrorKind, CartsServiceError, StoreError};
pub use service::*;
