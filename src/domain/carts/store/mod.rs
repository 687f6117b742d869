//! Ephemeral cart tier.
//!
//! A TTL-bounded key/value store holding live carts. Entries vanish silently
//! once their TTL lapses; an expired cart and one that never existed look the
//! same to callers.

use async_trait::async_trait;
use jiff::SignedDuration;
use mockall::automock;

use crate::domain::carts::{
    errors::StoreError,
    models::{Cart, CartKey},
};

mod memory;
mod redis;

pub use memory::InMemoryCartStore;
pub use redis::{RedisCartStore, RedisCartStoreConfig};

/// Default lifetime of an untouched cart.
pub const DEFAULT_CART_TTL: SignedDuration = SignedDuration::from_hours(7 * 24);

#[automock]
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Live cart for `key`, if any.
    async fn get(&self, key: &CartKey) -> Result<Option<Cart>, StoreError>;

    /// Store `cart` under its key with a fresh TTL from now. Returns the cart
    /// with `expires_at` set to the new deadline.
    async fn save(&self, cart: &Cart) -> Result<Cart, StoreError>;

    /// Remove the cart. Returns whether anything was removed.
    async fn delete(&self, key: &CartKey) -> Result<bool, StoreError>;

    async fn exists(&self, key: &CartKey) -> Result<bool, StoreError>;

    /// Restart the TTL without changing content. `None` when the key is
    /// absent or expired.
    async fn extend_ttl(&self, key: &CartKey) -> Result<Option<Cart>, StoreError>;

    /// Time left before the cart expires. `None` when absent or expired.
    async fn ttl_remaining(&self, key: &CartKey) -> Result<Option<SignedDuration>, StoreError>;
}

/// A stored cart answers a lookup only when it belongs to the requested
/// tenant and session.
pub(crate) fn matches_key(cart: &Cart, key: &CartKey) -> bool {
    cart.tenant_id == key.tenant && cart.session_id == key.session
}
