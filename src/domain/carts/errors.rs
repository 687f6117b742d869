//! Carts service errors.

use sqlx::error::{DatabaseError, ErrorKind};
use thiserror::Error;

use crate::{
    collaborators::CollaboratorError,
    domain::{
        carts::models::{AttributeProblem, CartItemId},
        tenants::MissingTenantError,
    },
    ids::ProductId,
};

/// Failures from either cart storage tier.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The write was based on a stale version or the record already exists.
    #[error("stale or conflicting cart write")]
    Conflict,

    /// The store did not answer in time.
    #[error("cart store timed out")]
    Timeout,

    #[error("failed to encode or decode cart document")]
    Serialization(#[from] serde_json::Error),

    #[error("durable store error")]
    Sql(#[source] sqlx::Error),

    #[error("ephemeral store error")]
    Redis(#[from] redis::RedisError),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match error.as_database_error().map(DatabaseError::kind) {
            Some(ErrorKind::UniqueViolation) => Self::Conflict,
            _ => Self::Sql(error),
        }
    }
}

/// How a caller should react to a [`CartsServiceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartsErrorKind {
    /// Fix the request; retrying unchanged will fail again.
    BadInput,
    NotFound,
    /// The request never resolved a tenant.
    MissingTenant,
    /// Reload and retry; someone else changed the cart.
    Conflict,
    /// Temporarily unavailable; retry later.
    Unavailable,
}

#[derive(Debug, Error)]
pub enum CartsServiceError {
    #[error(transparent)]
    MissingTenant(#[from] MissingTenantError),

    #[error("quantity {0} is not allowed")]
    InvalidQuantity(i64),

    #[error("product {0} is not available for purchase")]
    InactiveProduct(ProductId),

    #[error("invalid item attributes: {0}")]
    InvalidAttributes(AttributeProblem),

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("cart item {0} not found")]
    ItemNotFound(CartItemId),

    #[error("cart not found")]
    CartNotFound,

    #[error("cart was modified concurrently")]
    Conflict,

    #[error("cart storage unavailable")]
    Storage(#[source] StoreError),

    #[error("product catalog unavailable")]
    Catalog(#[source] CollaboratorError),
}

impl CartsServiceError {
    #[must_use]
    pub fn kind(&self) -> CartsErrorKind {
        match self {
            Self::MissingTenant(_) => CartsErrorKind::MissingTenant,
            Self::InvalidQuantity(_) | Self::InactiveProduct(_) | Self::InvalidAttributes(_) => {
                CartsErrorKind::BadInput
            }
            Self::ProductNotFound(_) | Self::ItemNotFound(_) | Self::CartNotFound => {
                CartsErrorKind::NotFound
            }
            Self::Conflict => CartsErrorKind::Conflict,
            Self::Storage(_) | Self::Catalog(_) => CartsErrorKind::Unavailable,
        }
    }
}

impl From<StoreError> for CartsServiceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict => Self::Conflict,
            other => Self::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflicts_surface_as_conflicts() {
        let error = CartsServiceError::from(StoreError::Conflict);

        assert_eq!(error.kind(), CartsErrorKind::Conflict);
    }

    #[test]
    fn store_outages_are_retryable() {
        let error = CartsServiceError::from(StoreError::Timeout);

        assert_eq!(error.kind(), CartsErrorKind::Unavailable);
    }

    #[test]
    fn bad_input_is_distinct_from_not_found() {
        assert_eq!(
            CartsServiceError::InvalidQuantity(0).kind(),
            CartsErrorKind::BadInput
        );
        assert_eq!(
            CartsServiceError::CartNotFound.kind(),
            CartsErrorKind::NotFound
        );
    }
}
