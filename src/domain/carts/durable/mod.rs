//! Durable cart tier.
//!
//! Mirrors every cart write and owns the abandonment bookkeeping. Tenant
//! scoped operations always filter on the tenant; the reminder candidate
//! queries and the retention purge are the only cross-tenant reads, and each
//! record they return carries its own tenant.

use async_trait::async_trait;
use jiff::Timestamp;
use mockall::automock;

use crate::{
    domain::{
        carts::{
            errors::StoreError,
            models::{Cart, CartId},
            records::{AbandonmentTotals, PersistedCart},
            saved::{SavedCart, SavedCartOwner},
        },
        tenants::TenantId,
    },
    ids::SessionId,
};

mod memory;
mod postgres;

pub use memory::InMemoryCartDurableStore;
pub use postgres::PgCartDurableStore;

#[automock]
#[async_trait]
pub trait CartDurableStore: Send + Sync {
    /// Most recently updated unconverted cart for the session.
    async fn find_by_session(
        &self,
        tenant: &TenantId,
        session: &SessionId,
    ) -> Result<Option<PersistedCart>, StoreError>;

    async fn get(&self, tenant: &TenantId, cart: &CartId)
    -> Result<Option<PersistedCart>, StoreError>;

    /// Write cart content, checking `cart.version` against the stored one.
    ///
    /// A version of `0` inserts. Reminder and conversion flags are never
    /// touched. The returned record carries the new version.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when the stored version differs, or when
    /// inserting a cart that already exists.
    async fn save_cart(&self, cart: &Cart) -> Result<PersistedCart, StoreError>;

    /// Returns whether the cart flipped to converted.
    async fn mark_converted(
        &self,
        tenant: &TenantId,
        cart: &CartId,
        at: Timestamp,
    ) -> Result<bool, StoreError>;

    /// Unconverted, un-notified, signed-in carts last updated at or before
    /// `cutoff`, across all tenants.
    async fn first_reminder_candidates(
        &self,
        cutoff: Timestamp,
        limit: usize,
    ) -> Result<Vec<PersistedCart>, StoreError>;

    /// Unconverted, signed-in carts notified once but not twice and last
    /// updated at or before `cutoff`, across all tenants.
    async fn second_reminder_candidates(
        &self,
        cutoff: Timestamp,
        limit: usize,
    ) -> Result<Vec<PersistedCart>, StoreError>;

    /// Returns whether the flag flipped. Leaves `updated_at` alone.
    async fn mark_first_reminder_sent(
        &self,
        tenant: &TenantId,
        cart: &CartId,
        at: Timestamp,
    ) -> Result<bool, StoreError>;

    /// Returns whether the flag flipped. Requires the first reminder.
    async fn mark_second_reminder_sent(
        &self,
        tenant: &TenantId,
        cart: &CartId,
        at: Timestamp,
    ) -> Result<bool, StoreError>;

    /// Clear both reminder flags. Returns whether any was set.
    async fn reset_abandonment(&self, tenant: &TenantId, cart: &CartId)
    -> Result<bool, StoreError>;

    /// Figures for the carts the first-reminder predicate would consider
    /// abandoned at `cutoff`, regardless of their reminder flags.
    async fn abandonment_stats(
        &self,
        tenant: &TenantId,
        cutoff: Timestamp,
    ) -> Result<AbandonmentTotals, StoreError>;

    /// Delete converted carts converted before `before`. Returns the count.
    async fn purge_converted(&self, before: Timestamp) -> Result<u64, StoreError>;

    async fn get_saved_cart(
        &self,
        tenant: &TenantId,
        owner: &SavedCartOwner,
    ) -> Result<Option<SavedCart>, StoreError>;

    /// Insert or replace the saved list for its owner.
    async fn save_saved_cart(&self, saved: &SavedCart) -> Result<(), StoreError>;
}
