//! Process configuration module

use clap::{Parser, Subcommand};

use crate::config::{
    carts::CartsConfig, collaborators::CollaboratorsConfig, db::DatabaseConfig,
    observability::LoggingConfig, redis::RedisConfig,
};

pub mod carts;
pub mod collaborators;
pub mod db;
pub mod observability;
pub mod redis;

pub use carts::{CartSettings, SettingsError};
pub use observability::LogFormat;

/// Lattice cart lifecycle configuration
#[derive(Debug, Parser)]
#[command(name = "lattice-carts", about = "Lattice cart lifecycle worker", long_about = None)]
pub struct AppConfig {
    #[command(subcommand)]
    pub command: Command,

    /// Logging output settings.
    #[command(flatten)]
    pub logging: LoggingConfig,

    /// Durable cart tier settings.
    #[command(flatten)]
    pub database: DatabaseConfig,

    /// Ephemeral cart tier settings.
    #[command(flatten)]
    pub redis: RedisConfig,

    /// Catalog, directory and notification endpoints.
    #[command(flatten)]
    pub collaborators: CollaboratorsConfig,

    /// Cart lifecycle thresholds.
    #[command(flatten)]
    pub carts: CartsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Apply database migrations and exit
    Migrate,

    /// Run a single abandonment sweep and exit
    Sweep,

    /// Run the abandonment scheduler until interrupted
    Run,

    /// Print abandonment statistics for one tenant
    Stats {
        /// Tenant to report on
        #[arg(long)]
        tenant: String,
    },
}

impl AppConfig {
    /// Load configuration from environment and CLI arguments
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be parsed
    pub fn load() -> Result<Self, clap::Error> {
        // Load .env file if present (ignore if missing)
        _ = dotenvy::dotenv();

        Self::try_parse()
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    const REQUIRED: [&str; 9] = [
        "lattice-carts",
        "--database-url",
        "postgres://localhost/carts",
        "--catalog-url",
        "http://catalog",
        "--directory-url",
        "http://directory",
        "--notifications-url",
        "http://notifications",
    ];

    #[test]
    fn defaults_match_lifecycle_constants() -> TestResult {
        let config = AppConfig::try_parse_from(REQUIRED.iter().copied().chain(["sweep"]))?;

        assert_eq!(config.command, Command::Sweep);
        assert_eq!(config.carts.settings()?, CartSettings::default());

        Ok(())
    }

    #[test]
    fn stats_requires_a_tenant() {
        let result = AppConfig::try_parse_from(REQUIRED.iter().copied().chain(["stats"]));

        assert!(result.is_err(), "expected parse error, got {result:?}");
    }
}
