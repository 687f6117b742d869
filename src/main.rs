//! Lattice Carts CLI

use std::process;

use lattice_carts::{
    config::{AppConfig, Command},
    context::{AppContext, AppInitError},
    database,
    domain::{
        abandonment::AbandonmentError,
        tenants::{TenantContext, TenantId},
    },
    ids::BlankIdError,
    observability, shutdown,
};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Init(#[from] AppInitError),

    #[error("failed to connect to database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to apply migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("invalid tenant: {0}")]
    Tenant(#[from] BlankIdError),

    #[error(transparent)]
    Abandonment(#[from] AbandonmentError),

    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

#[tokio::main]
pub async fn main() {
    let config = AppConfig::load().unwrap_or_else(|e| {
        #[expect(
            clippy::print_stderr,
            reason = "logging not initialized yet, must use eprintln for config errors"
        )]
        {
            eprintln!("Configuration error: {e}");
        }

        process::exit(2);
    });

    if let Err(init_error) = observability::init(&config.logging) {
        #[expect(clippy::print_stderr, reason = "no subscriber to log through")]
        {
            eprintln!("{init_error}");
        }

        process::exit(1);
    }

    if let Err(cli_error) = run(config).await {
        error!("{cli_error}");

        process::exit(1);
    }
}

async fn run(config: AppConfig) -> Result<(), CliError> {
    match &config.command {
        Command::Migrate => migrate(&config).await,
        Command::Sweep => sweep(&config).await,
        Command::Run => serve(&config).await,
        Command::Stats { tenant } => stats(&config, tenant).await,
    }
}

async fn migrate(config: &AppConfig) -> Result<(), CliError> {
    let pool = database::connect(&config.database.database_url).await?;

    database::migrate(&pool).await?;

    info!("migrations applied");

    Ok(())
}

async fn sweep(config: &AppConfig) -> Result<(), CliError> {
    let app = AppContext::from_config(config).await?;

    let report = app.scheduler.sweep().await?;

    print_json(&report)
}

async fn serve(config: &AppConfig) -> Result<(), CliError> {
    let app = AppContext::from_config(config).await?;
    let (trigger, listener) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(error) = shutdown::listen(trigger).await {
            error!("failed to listen for shutdown signal: {error}");
        }
    });

    app.scheduler.run(listener).await;

    Ok(())
}

async fn stats(config: &AppConfig, tenant: &str) -> Result<(), CliError> {
    let tenant = TenantContext::new(TenantId::parse(tenant)?);
    let app = AppContext::from_config(config).await?;

    let stats = app.scheduler.stats(&tenant).await?;

    print_json(&stats)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;

    #[expect(clippy::print_stdout, reason = "CLI output")]
    {
        println!("{rendered}");
    }

    Ok(())
}
