//! External collaborators.
//!
//! The cart core reads products and user contacts from services it does not
//! own and hands reminders to a delivery service. Each is reached through a
//! narrow trait so deployments can plug in their own transport.

use std::{future::Future, time::Duration};

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::domain::tenants::TenantId;

pub mod catalog;
pub mod directory;
pub mod notifications;

pub use catalog::{CatalogProduct, HttpProductCatalog, InMemoryProductCatalog, ProductCatalog};
pub use directory::{HttpUserDirectory, InMemoryUserDirectory, UserContact, UserDirectory};
pub use notifications::{
    HttpNotificationDispatch, NotificationDispatch, NotificationReceipt, ReminderContext,
};

/// Header carrying the tenant on every outbound request.
pub const TENANT_HEADER: &str = "X-Tenant-Id";

/// Errors talking to a collaborator.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// The call did not finish within its deadline.
    #[error("collaborator call timed out after {0:?}")]
    Timeout(Duration),

    /// An HTTP transport or serialization error occurred.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The collaborator answered with a non-2xx status or unexpected body.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Await `call`, failing with [`CollaboratorError::Timeout`] after `limit`.
///
/// # Errors
///
/// Returns the call's own error, or a timeout.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_elapsed| CollaboratorError::Timeout(limit))?
}

/// Base URL and shared client for a JSON-over-HTTP collaborator.
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    base_url: String,
    http: Client,
}

impl HttpEndpoint {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    pub(crate) fn get(&self, tenant: &TenantId, path: &str) -> RequestBuilder {
        self.http
            .get(format!("{}{path}", self.base_url))
            .header(TENANT_HEADER, tenant.as_str())
    }

    pub(crate) fn post(&self, tenant: &TenantId, path: &str) -> RequestBuilder {
        self.http
            .post(format!("{}{path}", self.base_url))
            .header(TENANT_HEADER, tenant.as_str())
    }
}

/// Decode a JSON body, mapping `404` to `None`.
pub(crate) async fn optional_json<T: DeserializeOwned>(
    response: Response,
    what: &str,
) -> Result<Option<T>, CollaboratorError> {
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }

    required_json(response, what).await.map(Some)
}

/// Decode a JSON body from a 2xx response.
pub(crate) async fn required_json<T: DeserializeOwned>(
    response: Response,
    what: &str,
) -> Result<T, CollaboratorError> {
    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        return Err(CollaboratorError::UnexpectedResponse(format!(
            "{what} request failed with status {status}: {text}"
        )));
    }

    Ok(response.json().await?)
}
