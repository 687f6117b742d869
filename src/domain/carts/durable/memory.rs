//! In-memory durable tier.

use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;

use crate::{
    domain::{
        carts::{
            durable::CartDurableStore,
            errors::StoreError,
            models::{Cart, CartId},
            records::{AbandonmentTotals, PersistedCart},
            saved::{SavedCart, SavedCartOwner},
        },
        tenants::TenantId,
    },
    ids::SessionId,
};

type CartsByTenant = FxHashMap<(TenantId, CartId), PersistedCart>;

/// Process-local durable store with the same semantics as the `PostgreSQL`
/// one. Clones share state.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCartDurableStore {
    carts: Arc<RwLock<CartsByTenant>>,
    saved: Arc<RwLock<FxHashMap<(TenantId, SavedCartOwner), SavedCart>>>,
}

impl InMemoryCartDurableStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted carts across all tenants.
    pub async fn entry_count(&self) -> usize {
        self.carts.read().await.len()
    }

    async fn update<F>(&self, tenant: &TenantId, cart: &CartId, change: F) -> bool
    where
        F: FnOnce(&mut PersistedCart) -> bool,
    {
        self.carts
            .write()
            .await
            .get_mut(&(tenant.clone(), *cart))
            .is_some_and(change)
    }

    async fn candidates<P>(&self, cutoff: Timestamp, limit: usize, stage: P) -> Vec<PersistedCart>
    where
        P: Fn(&PersistedCart) -> bool,
    {
        let carts = self.carts.read().await;

        let mut matched: Vec<PersistedCart> = carts
            .values()
            .filter(|record| is_idle_signed_in(record, cutoff) && stage(record))
            .cloned()
            .collect();

        matched.sort_by_key(|record| record.cart.updated_at);
        matched.truncate(limit);

        matched
    }
}

fn is_idle_signed_in(record: &PersistedCart, cutoff: Timestamp) -> bool {
    !record.converted && !record.is_guest() && record.cart.updated_at <= cutoff
}

#[async_trait]
impl CartDurableStore for InMemoryCartDurableStore {
    async fn find_by_session(
        &self,
        tenant: &TenantId,
        session: &SessionId,
    ) -> Result<Option<PersistedCart>, StoreError> {
        Ok(self
            .carts
            .read()
            .await
            .values()
            .filter(|record| {
                !record.converted
                    && record.cart.tenant_id == *tenant
                    && record.cart.session_id == *session
            })
            .max_by_key(|record| record.cart.updated_at)
            .cloned())
    }

    async fn get(
        &self,
        tenant: &TenantId,
        cart: &CartId,
    ) -> Result<Option<PersistedCart>, StoreError> {
        Ok(self
            .carts
            .read()
            .await
            .get(&(tenant.clone(), *cart))
            .cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> Result<PersistedCart, StoreError> {
        let mut carts = self.carts.write().await;
        let key = (cart.tenant_id.clone(), cart.id);

        let mut next = cart.clone();
        next.version = cart.version.saturating_add(1);

        match carts.get_mut(&key) {
            None if cart.version == 0 => {
                let taken = carts.values().any(|record| {
                    !record.converted
                        && record.cart.tenant_id == cart.tenant_id
                        && record.cart.session_id == cart.session_id
                });

                if taken {
                    return Err(StoreError::Conflict);
                }

                let record = PersistedCart::new(next);

                carts.insert(key, record.clone());

                Ok(record)
            }
            Some(existing) if cart.version != 0 && existing.cart.version == cart.version => {
                existing.replace_cart(next);

                Ok(existing.clone())
            }
            _ => Err(StoreError::Conflict),
        }
    }

    async fn mark_converted(
        &self,
        tenant: &TenantId,
        cart: &CartId,
        at: Timestamp,
    ) -> Result<bool, StoreError> {
        Ok(self
            .update(tenant, cart, |record| record.flag_converted(at))
            .await)
    }

    async fn first_reminder_candidates(
        &self,
        cutoff: Timestamp,
        limit: usize,
    ) -> Result<Vec<PersistedCart>, StoreError> {
        Ok(self
            .candidates(cutoff, limit, |record| !record.abandonment_notified)
            .await)
    }

    async fn second_reminder_candidates(
        &self,
        cutoff: Timestamp,
        limit: usize,
    ) -> Result<Vec<PersistedCart>, StoreError> {
        Ok(self
            .candidates(cutoff, limit, |record| {
                record.abandonment_notified && !record.second_reminder_sent
            })
            .await)
    }

    async fn mark_first_reminder_sent(
        &self,
        tenant: &TenantId,
        cart: &CartId,
        at: Timestamp,
    ) -> Result<bool, StoreError> {
        Ok(self
            .update(tenant, cart, |record| record.flag_first_reminder(at))
            .await)
    }

    async fn mark_second_reminder_sent(
        &self,
        tenant: &TenantId,
        cart: &CartId,
        at: Timestamp,
    ) -> Result<bool, StoreError> {
        Ok(self
            .update(tenant, cart, |record| record.flag_second_reminder(at))
            .await)
    }

    async fn reset_abandonment(
        &self,
        tenant: &TenantId,
        cart: &CartId,
    ) -> Result<bool, StoreError> {
        Ok(self
            .update(tenant, cart, PersistedCart::clear_reminders)
            .await)
    }

    async fn abandonment_stats(
        &self,
        tenant: &TenantId,
        cutoff: Timestamp,
    ) -> Result<AbandonmentTotals, StoreError> {
        let carts = self.carts.read().await;

        let totals = carts
            .values()
            .filter(|record| record.cart.tenant_id == *tenant && is_idle_signed_in(record, cutoff))
            .fold(AbandonmentTotals::default(), |mut totals, record| {
                totals.abandoned_carts += 1;
                totals.total_value = totals.total_value.saturating_add(record.cart.summary.total);

                if record.abandonment_notified {
                    totals.notified_carts += 1;
                }

                totals
            });

        Ok(totals)
    }

    async fn purge_converted(&self, before: Timestamp) -> Result<u64, StoreError> {
        let mut carts = self.carts.write().await;
        let count = carts.len();

        carts.retain(|_, record| !record.converted_at.is_some_and(|at| at < before));

        Ok((count - carts.len()) as u64)
    }

    async fn get_saved_cart(
        &self,
        tenant: &TenantId,
        owner: &SavedCartOwner,
    ) -> Result<Option<SavedCart>, StoreError> {
        Ok(self
            .saved
            .read()
            .await
            .get(&(tenant.clone(), owner.clone()))
            .cloned())
    }

    async fn save_saved_cart(&self, saved: &SavedCart) -> Result<(), StoreError> {
        self.saved.write().await.insert(
            (saved.tenant_id.clone(), saved.owner.clone()),
            saved.clone(),
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use jiff::SignedDuration;
    use testresult::TestResult;

    use crate::{domain::carts::models::CartSummary, ids::UserId};

    use super::*;

    const HOUR: SignedDuration = SignedDuration::from_hours(1);

    fn cart(tenant: &str, session: &str, user: Option<&str>) -> TestResult<Cart> {
        let mut cart = Cart::new(
            TenantId::parse(tenant)?,
            SessionId::parse(session)?,
            CartSummary::empty("USD"),
            Timestamp::UNIX_EPOCH,
            SignedDuration::from_hours(168),
        );

        cart.user_id = user.map(UserId::parse).transpose()?;

        Ok(cart)
    }

    #[tokio::test]
    async fn save_cart_bumps_version_and_rejects_stale_writes() -> TestResult {
        let store = InMemoryCartDurableStore::new();
        let cart = cart("acme", "s1", None)?;

        let first = store.save_cart(&cart).await?;
        assert_eq!(first.cart.version, 1);

        let second = store.save_cart(&first.cart).await?;
        assert_eq!(second.cart.version, 2);

        let stale = store.save_cart(&first.cart).await;
        assert!(
            matches!(stale, Err(StoreError::Conflict)),
            "expected Conflict, got {stale:?}"
        );

        let duplicate = store.save_cart(&cart).await;
        assert!(
            matches!(duplicate, Err(StoreError::Conflict)),
            "expected Conflict, got {duplicate:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn one_open_cart_per_session() -> TestResult {
        let store = InMemoryCartDurableStore::new();
        let first = cart("acme", "s1", None)?;
        let tenant = first.tenant_id.clone();

        store.save_cart(&first).await?;

        let racing = store.save_cart(&cart("acme", "s1", None)?).await;
        assert!(
            matches!(racing, Err(StoreError::Conflict)),
            "expected Conflict, got {racing:?}"
        );

        store.save_cart(&cart("globex", "s1", None)?).await?;

        store.mark_converted(&tenant, &first.id, Timestamp::UNIX_EPOCH).await?;
        store.save_cart(&cart("acme", "s1", None)?).await?;

        Ok(())
    }

    #[tokio::test]
    async fn content_writes_keep_reminder_flags() -> TestResult {
        let store = InMemoryCartDurableStore::new();
        let cart = cart("acme", "s1", Some("u1"))?;
        let tenant = cart.tenant_id.clone();

        let saved = store.save_cart(&cart).await?;
        assert!(store.mark_first_reminder_sent(&tenant, &cart.id, Timestamp::UNIX_EPOCH).await?);

        let rewritten = store.save_cart(&saved.cart).await?;

        assert!(rewritten.abandonment_notified);

        Ok(())
    }

    #[tokio::test]
    async fn find_by_session_is_tenant_scoped_and_skips_converted() -> TestResult {
        let store = InMemoryCartDurableStore::new();
        let cart = cart("acme", "shared", None)?;
        let tenant = cart.tenant_id.clone();

        store.save_cart(&cart).await?;

        let other = store
            .find_by_session(&TenantId::parse("globex")?, &cart.session_id)
            .await?;
        assert_eq!(other, None);

        store.mark_converted(&tenant, &cart.id, Timestamp::UNIX_EPOCH).await?;

        let converted = store.find_by_session(&tenant, &cart.session_id).await?;
        assert_eq!(converted, None);

        Ok(())
    }

    #[tokio::test]
    async fn reminder_queries_follow_stage_flags() -> TestResult {
        let store = InMemoryCartDurableStore::new();
        let cart = cart("acme", "s1", Some("u1"))?;
        let tenant = cart.tenant_id.clone();
        let idle_since = cart.updated_at;

        store.save_cart(&cart).await?;

        let day_later = idle_since + HOUR * 25;
        assert_eq!(store.first_reminder_candidates(day_later - HOUR * 24, 10).await?.len(), 1);
        assert!(store.second_reminder_candidates(day_later - HOUR * 72, 10).await?.is_empty());

        store.mark_first_reminder_sent(&tenant, &cart.id, day_later).await?;

        let later = idle_since + HOUR * 73;
        assert!(store.first_reminder_candidates(later - HOUR * 24, 10).await?.is_empty());
        assert_eq!(store.second_reminder_candidates(later - HOUR * 72, 10).await?.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn guests_are_never_candidates() -> TestResult {
        let store = InMemoryCartDurableStore::new();
        let guest = cart("acme", "s1", None)?;

        store.save_cart(&guest).await?;

        let far_future = guest.updated_at + HOUR * 1000;
        assert!(store.first_reminder_candidates(far_future, 10).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn candidates_respect_limit_oldest_first() -> TestResult {
        let store = InMemoryCartDurableStore::new();

        let mut newer = cart("acme", "s1", Some("u1"))?;
        newer.updated_at = Timestamp::UNIX_EPOCH + HOUR;
        let older = cart("globex", "s2", Some("u2"))?;

        store.save_cart(&newer).await?;
        store.save_cart(&older).await?;

        let matched = store
            .first_reminder_candidates(Timestamp::UNIX_EPOCH + HOUR * 48, 1)
            .await?;

        assert_eq!(matched.len(), 1);
        assert_eq!(matched.first().map(|r| r.cart.id), Some(older.id));

        Ok(())
    }

    #[tokio::test]
    async fn purge_removes_only_old_conversions() -> TestResult {
        let store = InMemoryCartDurableStore::new();
        let old = cart("acme", "s1", None)?;
        let recent = cart("acme", "s2", None)?;
        let open = cart("acme", "s3", None)?;
        let tenant = old.tenant_id.clone();

        for cart in [&old, &recent, &open] {
            store.save_cart(cart).await?;
        }

        store.mark_converted(&tenant, &old.id, Timestamp::UNIX_EPOCH).await?;
        store
            .mark_converted(&tenant, &recent.id, Timestamp::UNIX_EPOCH + HOUR * 48)
            .await?;

        let purged = store.purge_converted(Timestamp::UNIX_EPOCH + HOUR * 24).await?;

        assert_eq!(purged, 1);
        assert_eq!(store.entry_count().await, 2);
        assert_eq!(store.get(&tenant, &old.id).await?, None);

        Ok(())
    }
}
