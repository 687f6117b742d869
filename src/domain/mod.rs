//! Domain services

pub mod abandonment;
pub mod carts;
pub mod tenants;
