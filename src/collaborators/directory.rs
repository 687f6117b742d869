//! User directory lookups.

use async_trait::async_trait;
use mockall::automock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{
    collaborators::{CollaboratorError, HttpEndpoint, optional_json},
    domain::tenants::TenantId,
    ids::UserId,
};

/// How to reach a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContact {
    pub email: String,
}

#[automock]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Contact details for `user` within `tenant`. `None` when unknown.
    async fn lookup(
        &self,
        tenant: &TenantId,
        user: &UserId,
    ) -> Result<Option<UserContact>, CollaboratorError>;
}

/// Directory service reached over HTTP at `GET {base}/users/{id}`.
#[derive(Debug, Clone)]
pub struct HttpUserDirectory {
    endpoint: HttpEndpoint,
}

impl HttpUserDirectory {
    #[must_use]
    pub fn new(endpoint: HttpEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn lookup(
        &self,
        tenant: &TenantId,
        user: &UserId,
    ) -> Result<Option<UserContact>, CollaboratorError> {
        let response = self
            .endpoint
            .get(tenant, &format!("/users/{user}"))
            .send()
            .await?;

        optional_json(response, "directory").await
    }
}

/// Directory held in memory, keyed per tenant.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<FxHashMap<(TenantId, UserId), UserContact>>,
}

impl InMemoryUserDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, tenant: TenantId, user: UserId, contact: UserContact) {
        self.users.write().await.insert((tenant, user), contact);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn lookup(
        &self,
        tenant: &TenantId,
        user: &UserId,
    ) -> Result<Option<UserContact>, CollaboratorError> {
        Ok(self
            .users
            .read()
            .await
            .get(&(tenant.clone(), user.clone()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[tokio::test]
    async fn same_user_id_in_other_tenant_is_unknown() -> TestResult {
        let directory = InMemoryUserDirectory::new();
        let user = UserId::parse("u1")?;

        directory
            .insert(
                TenantId::parse("acme")?,
                user.clone(),
                UserContact {
                    email: "u1@acme.test".into(),
                },
            )
            .await;

        let other = directory.lookup(&TenantId::parse("globex")?, &user).await?;

        assert_eq!(other, None);

        Ok(())
    }
}
