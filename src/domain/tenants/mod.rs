//! Tenants

pub mod context;

pub use context::{MissingTenantError, TenantContext};

use crate::ids::{IdKind, OpaqueId};

/// Tenant marker.
#[derive(Debug)]
pub enum Tenant {}

impl IdKind for Tenant {
    const NAME: &'static str = "tenant";
}

/// Opaque tenant identifier.
pub type TenantId = OpaqueId<Tenant>;
