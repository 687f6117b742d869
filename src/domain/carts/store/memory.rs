//! In-memory ephemeral tier.

use std::sync::Arc;

use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    clock::Clock,
    domain::carts::{
        errors::StoreError,
        models::{Cart, CartKey},
        store::{CartStore, matches_key},
    },
};

/// Map size below which saves never sweep out expired carts.
const PURGE_FLOOR: usize = 1024;

#[derive(Debug)]
struct Entries {
    carts: FxHashMap<CartKey, Cart>,
    /// Map size at which the next save drops expired carts.
    purge_at: usize,
}

impl Entries {
    fn purge(&mut self, now: Timestamp) -> usize {
        let before = self.carts.len();

        self.carts.retain(|_, cart| cart.expires_at > now);
        self.purge_at = (self.carts.len() * 2).max(PURGE_FLOOR);

        before - self.carts.len()
    }
}

/// Process-local cart store with clock-driven expiry. Expired carts read as
/// missing and are dropped once the map doubles in size since the last purge.
#[derive(Debug, Clone)]
pub struct InMemoryCartStore {
    entries: Arc<RwLock<Entries>>,
    clock: Arc<dyn Clock>,
    ttl: SignedDuration,
}

impl InMemoryCartStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, ttl: SignedDuration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Entries {
                carts: FxHashMap::default(),
                purge_at: PURGE_FLOOR,
            })),
            clock,
            ttl,
        }
    }

    /// Number of entries held, expired or not.
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.carts.len()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();

        self.entries.write().await.purge(now)
    }

    fn live(cart: &Cart, key: &CartKey, now: Timestamp) -> bool {
        cart.expires_at > now && matches_key(cart, key)
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn get(&self, key: &CartKey) -> Result<Option<Cart>, StoreError> {
        let now = self.clock.now();

        Ok(self
            .entries
            .read()
            .await
            .carts
            .get(key)
            .filter(|cart| Self::live(cart, key, now))
            .cloned())
    }

    async fn save(&self, cart: &Cart) -> Result<Cart, StoreError> {
        let now = self.clock.now();
        let mut stored = cart.clone();
        stored.expires_at = now + self.ttl;

        let mut entries = self.entries.write().await;
        entries.carts.insert(stored.key(), stored.clone());

        if entries.carts.len() >= entries.purge_at {
            let purged = entries.purge(now);

            debug!(purged, remaining = entries.carts.len(), "dropped expired carts");
        }

        Ok(stored)
    }

    async fn delete(&self, key: &CartKey) -> Result<bool, StoreError> {
        let now = self.clock.now();

        Ok(self
            .entries
            .write()
            .await
            .carts
            .remove(key)
            .is_some_and(|cart| Self::live(&cart, key, now)))
    }

    async fn exists(&self, key: &CartKey) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn extend_ttl(&self, key: &CartKey) -> Result<Option<Cart>, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;

        let Some(cart) = entries
            .carts
            .get_mut(key)
            .filter(|cart| Self::live(cart, key, now))
        else {
            return Ok(None);
        };

        cart.expires_at = now + self.ttl;

        Ok(Some(cart.clone()))
    }

    async fn ttl_remaining(&self, key: &CartKey) -> Result<Option<SignedDuration>, StoreError> {
        let now = self.clock.now();

        Ok(self.get(key).await?.map(|cart| cart.expires_at.duration_since(now)))
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::{
        clock::ManualClock,
        domain::{carts::models::CartSummary, tenants::TenantId},
        ids::SessionId,
    };

    use super::*;

    const TTL: SignedDuration = SignedDuration::from_hours(7 * 24);

    fn setup() -> (Arc<ManualClock>, InMemoryCartStore) {
        let clock = Arc::new(ManualClock::new(Timestamp::UNIX_EPOCH));
        let store = InMemoryCartStore::new(clock.clone(), TTL);

        (clock, store)
    }

    fn cart(tenant: &str, session: &str) -> Result<Cart, crate::ids::BlankIdError> {
        Ok(Cart::new(
            TenantId::parse(tenant)?,
            SessionId::parse(session)?,
            CartSummary::empty("USD"),
            Timestamp::UNIX_EPOCH,
            TTL,
        ))
    }

    #[tokio::test]
    async fn expired_carts_read_as_missing() -> TestResult {
        let (clock, store) = setup();
        let cart = cart("acme", "s1")?;

        store.save(&cart).await?;
        clock.advance(TTL);

        assert_eq!(store.get(&cart.key()).await?, None);
        assert!(!store.exists(&cart.key()).await?);
        assert_eq!(store.ttl_remaining(&cart.key()).await?, None);
        assert_eq!(store.purge_expired().await, 1);

        Ok(())
    }

    #[tokio::test]
    async fn saves_drop_expired_carts_as_the_map_grows() -> TestResult {
        let (clock, store) = setup();

        for n in 1..PURGE_FLOOR {
            store.save(&cart("acme", &format!("s{n}"))?).await?;
        }

        assert_eq!(store.entry_count().await, PURGE_FLOOR - 1);

        clock.advance(TTL);
        let fresh = cart("acme", "fresh")?;
        store.save(&fresh).await?;

        assert_eq!(store.entry_count().await, 1, "only the fresh cart remains");
        assert!(store.exists(&fresh.key()).await?);

        Ok(())
    }

    #[tokio::test]
    async fn save_resets_ttl_rather_than_adding() -> TestResult {
        let (clock, store) = setup();
        let cart = cart("acme", "s1")?;

        store.save(&cart).await?;
        clock.advance(SignedDuration::from_hours(48));
        let saved = store.save(&cart).await?;

        assert_eq!(saved.expires_at, clock.now() + TTL);
        assert_eq!(store.ttl_remaining(&cart.key()).await?, Some(TTL));

        Ok(())
    }

    #[tokio::test]
    async fn extend_ttl_keeps_content() -> TestResult {
        let (clock, store) = setup();
        let cart = cart("acme", "s1")?;

        store.save(&cart).await?;
        clock.advance(SignedDuration::from_hours(100));

        let extended = store.extend_ttl(&cart.key()).await?;

        assert_eq!(extended.as_ref().map(|c| c.expires_at), Some(clock.now() + TTL));
        assert_eq!(extended.map(|c| c.items), Some(cart.items));

        Ok(())
    }

    #[tokio::test]
    async fn extend_ttl_on_expired_cart_is_none() -> TestResult {
        let (clock, store) = setup();
        let cart = cart("acme", "s1")?;

        store.save(&cart).await?;
        clock.advance(TTL + SignedDuration::from_secs(1));

        assert_eq!(store.extend_ttl(&cart.key()).await?, None);

        Ok(())
    }

    #[tokio::test]
    async fn same_session_in_other_tenant_is_invisible() -> TestResult {
        let (_clock, store) = setup();
        let acme = cart("acme", "shared-session")?;

        store.save(&acme).await?;

        let globex_key = CartKey::new(TenantId::parse("globex")?, acme.session_id.clone());

        assert_eq!(store.get(&globex_key).await?, None);
        assert!(!store.delete(&globex_key).await?);
        assert!(store.exists(&acme.key()).await?);

        Ok(())
    }
}
