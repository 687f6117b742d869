//! App Context

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::{
    clock::{Clock, SystemClock},
    collaborators::{HttpEndpoint, HttpNotificationDispatch, HttpProductCatalog, HttpUserDirectory},
    config::{AppConfig, CartSettings, SettingsError},
    database::{self, Db},
    domain::{
        abandonment::AbandonmentScheduler,
        carts::{
            CartsService, StoreError, TieredCartsService,
            durable::{CartDurableStore, PgCartDurableStore},
            pricing::{StandardPricing, TenantPricing},
            store::{CartStore, InMemoryCartStore, RedisCartStore, RedisCartStoreConfig},
        },
    },
};

#[derive(Debug, Error)]
pub enum AppInitError {
    #[error("invalid cart settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("failed to connect to database")]
    Database(#[source] sqlx::Error),

    #[error("failed to connect to redis")]
    Redis(#[source] StoreError),
}

#[derive(Clone)]
pub struct AppContext {
    pub carts: Arc<dyn CartsService>,
    pub scheduler: Arc<AbandonmentScheduler>,
    pub settings: CartSettings,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("scheduler", &self.scheduler)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    /// Wire both cart tiers, the collaborators and the scheduler.
    ///
    /// Falls back to an in-process ephemeral tier when no Redis URL is set.
    ///
    /// # Errors
    ///
    /// Returns an error when the settings are invalid or a backing store
    /// cannot be reached.
    pub async fn from_config(config: &AppConfig) -> Result<Self, AppInitError> {
        let settings = config.carts.settings()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let pool = database::connect(&config.database.database_url)
            .await
            .map_err(AppInitError::Database)?;

        let durable: Arc<dyn CartDurableStore> = Arc::new(PgCartDurableStore::new(Db::new(pool)));

        let ephemeral: Arc<dyn CartStore> = match &config.redis.redis_url {
            Some(url) => Arc::new(
                RedisCartStore::connect(
                    RedisCartStoreConfig {
                        url: url.clone(),
                        prefix: config.redis.redis_key_prefix.clone(),
                        ttl: settings.cart_ttl,
                        timeout: config.redis.timeout(),
                    },
                    clock.clone(),
                )
                .await
                .map_err(AppInitError::Redis)?,
            ),
            None => {
                info!("no redis url configured, keeping carts in process memory");
                Arc::new(InMemoryCartStore::new(clock.clone(), settings.cart_ttl))
            }
        };

        let endpoints = &config.collaborators;

        let carts = TieredCartsService::new(
            ephemeral,
            durable.clone(),
            Arc::new(HttpProductCatalog::new(HttpEndpoint::new(&endpoints.catalog_url))),
            Arc::new(TenantPricing::new(StandardPricing::default())),
            clock.clone(),
            settings.clone(),
        );

        let scheduler = AbandonmentScheduler::new(
            durable,
            Arc::new(HttpUserDirectory::new(HttpEndpoint::new(&endpoints.directory_url))),
            Arc::new(HttpNotificationDispatch::new(HttpEndpoint::new(
                &endpoints.notifications_url,
            ))),
            clock,
            settings.clone(),
        );

        Ok(Self {
            carts: Arc::new(carts),
            scheduler: Arc::new(scheduler),
            settings,
        })
    }
}
