//! Redis-backed ephemeral tier.

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use jiff::SignedDuration;
use redis::{AsyncCommands, aio::MultiplexedConnection};

use crate::{
    clock::Clock,
    domain::carts::{
        errors::StoreError,
        models::{Cart, CartKey},
        store::{CartStore, matches_key},
    },
};

/// Connection settings for [`RedisCartStore`].
#[derive(Debug, Clone)]
pub struct RedisCartStoreConfig {
    /// e.g. `redis://localhost:6379`
    pub url: String,

    /// Prepended to every key, e.g. `lattice:cart`.
    pub prefix: String,

    /// Cart lifetime applied on every save.
    pub ttl: SignedDuration,

    /// Per-command deadline.
    pub timeout: Duration,
}

/// Carts stored as JSON strings under `{prefix}:{cart key}` with a native
/// Redis expiry. See [`CartKey`] for the key layout.
#[derive(Clone)]
pub struct RedisCartStore {
    connection: MultiplexedConnection,
    prefix: String,
    ttl: SignedDuration,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RedisCartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCartStore")
            .field("prefix", &self.prefix)
            .field("ttl", &self.ttl)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RedisCartStore {
    /// Open a multiplexed connection.
    ///
    /// # Errors
    ///
    /// Returns an error when the URL is invalid or the server cannot be reached.
    pub async fn connect(
        config: RedisCartStoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url.as_str())?;

        let connection = tokio::time::timeout(
            config.timeout,
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_elapsed| StoreError::Timeout)??;

        Ok(Self {
            connection,
            prefix: config.prefix,
            ttl: config.ttl,
            timeout: config.timeout,
            clock,
        })
    }

    fn redis_key(&self, key: &CartKey) -> String {
        format!("{}:{key}", self.prefix)
    }

    fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs().unsigned_abs()
    }

    async fn bounded<T, F>(&self, command: F) -> Result<T, StoreError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        tokio::time::timeout(self.timeout, command)
            .await
            .map_err(|_elapsed| StoreError::Timeout)?
            .map_err(StoreError::from)
    }

    async fn write(&self, cart: &Cart) -> Result<Cart, StoreError> {
        let mut stored = cart.clone();
        stored.expires_at = self.clock.now() + self.ttl;

        let payload = serde_json::to_string(&stored)?;
        let key = self.redis_key(&stored.key());
        let mut connection = self.connection.clone();

        self.bounded(connection.set_ex::<_, _, ()>(key, payload, self.ttl_secs()))
            .await?;

        Ok(stored)
    }
}

#[async_trait]
impl CartStore for RedisCartStore {
    async fn get(&self, key: &CartKey) -> Result<Option<Cart>, StoreError> {
        let redis_key = self.redis_key(key);
        let mut connection = self.connection.clone();

        let (raw, seconds): (Option<String>, i64) = self
            .bounded(
                redis::pipe()
                    .atomic()
                    .get(&redis_key)
                    .ttl(&redis_key)
                    .query_async(&mut connection),
            )
            .await?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let mut cart: Cart = serde_json::from_str(&raw)?;

        // The key's expiry is authoritative; EXPIRE does not touch the payload.
        if let Some(remaining) = remaining(seconds) {
            cart.expires_at = self.clock.now() + remaining;
        }

        Ok(matches_key(&cart, key).then_some(cart))
    }

    async fn save(&self, cart: &Cart) -> Result<Cart, StoreError> {
        self.write(cart).await
    }

    async fn delete(&self, key: &CartKey) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();

        let removed: u64 = self.bounded(connection.del(self.redis_key(key))).await?;

        Ok(removed > 0)
    }

    async fn exists(&self, key: &CartKey) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();

        self.bounded(connection.exists(self.redis_key(key))).await
    }

    async fn extend_ttl(&self, key: &CartKey) -> Result<Option<Cart>, StoreError> {
        let mut connection = self.connection.clone();

        let extended: bool = self
            .bounded(connection.expire(self.redis_key(key), self.ttl.as_secs()))
            .await?;

        if !extended {
            return Ok(None);
        }

        self.get(key).await
    }

    async fn ttl_remaining(&self, key: &CartKey) -> Result<Option<SignedDuration>, StoreError> {
        let mut connection = self.connection.clone();

        let seconds: i64 = self.bounded(connection.ttl(self.redis_key(key))).await?;

        Ok(remaining(seconds))
    }
}

/// Interpret a `TTL` reply. `-2` means no such key and `-1` a key without
/// expiry, which this store never writes.
fn remaining(seconds: i64) -> Option<SignedDuration> {
    (seconds >= 0).then(|| SignedDuration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_replies() {
        assert_eq!(remaining(-2), None);
        assert_eq!(remaining(-1), None);
        assert_eq!(remaining(0), Some(SignedDuration::ZERO));
        assert_eq!(remaining(3600), Some(SignedDuration::from_hours(1)));
    }
}
