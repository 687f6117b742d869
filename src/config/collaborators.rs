//! Collaborator Config

use clap::Args;

/// Base URLs of the services the cart core calls out to.
#[derive(Debug, Args)]
pub struct CollaboratorsConfig {
    /// Product catalog service base URL
    #[arg(long, env = "CATALOG_URL")]
    pub catalog_url: String,

    /// User directory service base URL
    #[arg(long, env = "DIRECTORY_URL")]
    pub directory_url: String,

    /// Notification service base URL
    #[arg(long, env = "NOTIFICATIONS_URL")]
    pub notifications_url: String,
}
