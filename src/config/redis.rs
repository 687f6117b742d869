//! Redis Config

use std::time::Duration;

use clap::Args;

/// Ephemeral cart tier settings.
#[derive(Debug, Args)]
pub struct RedisConfig {
    /// Redis connection string. Carts are kept in process memory when unset.
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Prefix for every cart key
    #[arg(long, env = "REDIS_KEY_PREFIX", default_value = "lattice:cart")]
    pub redis_key_prefix: String,

    /// Per-command timeout in milliseconds
    #[arg(long, env = "REDIS_TIMEOUT_MS", default_value_t = 500_u64)]
    pub redis_timeout_ms: u64,
}

impl RedisConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.redis_timeout_ms)
    }
}
