//! Tenant Context
//!
//! Every cart operation runs for exactly one tenant. The enclosing request
//! layer resolves the tenant and hands a [`TenantContext`] to each call; there
//! is no default tenant. Work that hops across tasks (the abandonment sweep)
//! can additionally install the tenant in a task-local via
//! [`TenantContext::scope`] and read it back with [`TenantContext::current`].

use std::future::Future;

use thiserror::Error;

use super::TenantId;

tokio::task_local! {
    static CURRENT_TENANT: TenantId;
}

/// Raised when an operation runs without a resolved tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no tenant in scope")]
pub struct MissingTenantError;

/// Request-scoped tenant handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant: Option<TenantId>,
}

impl TenantContext {
    /// Context for a resolved tenant.
    #[must_use]
    pub fn new(tenant: TenantId) -> Self {
        Self {
            tenant: Some(tenant),
        }
    }

    /// Context for a request whose tenant could not be resolved.
    #[must_use]
    pub fn missing() -> Self {
        Self { tenant: None }
    }

    /// Capture the tenant installed by an enclosing [`TenantContext::scope`].
    ///
    /// Outside of a scope this yields a context that fails closed.
    #[must_use]
    pub fn current() -> Self {
        Self {
            tenant: CURRENT_TENANT.try_with(Clone::clone).ok(),
        }
    }

    /// The tenant this context belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`MissingTenantError`] when no tenant was resolved.
    pub fn tenant_id(&self) -> Result<&TenantId, MissingTenantError> {
        self.tenant.as_ref().ok_or(MissingTenantError)
    }

    /// Run `future` with this tenant installed as the task-local tenant.
    ///
    /// # Errors
    ///
    /// Returns [`MissingTenantError`] without polling `future` when the
    /// context carries no tenant.
    pub async fn scope<F>(&self, future: F) -> Result<F::Output, MissingTenantError>
    where
        F: Future,
    {
        let tenant = self.tenant_id()?.clone();

        Ok(CURRENT_TENANT.scope(tenant, future).await)
    }
}

impl From<TenantId> for TenantContext {
    fn from(tenant: TenantId) -> Self {
        Self::new(tenant)
    }
}
