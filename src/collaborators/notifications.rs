//! Reminder delivery.

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::{
    collaborators::{CollaboratorError, HttpEndpoint, required_json},
    domain::{carts::models::CartId, tenants::TenantId},
    ids::UserId,
};

/// Template data for an abandoned-cart reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderContext {
    pub cart_id: CartId,
    pub item_count: u64,
    /// Display-ready total, e.g. `$66.00`.
    pub total: String,
    pub currency: String,
    /// `1` for the first reminder, `2` for the second.
    pub reminder_stage: u8,
    pub email: String,
}

/// Acknowledgement from the delivery service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationReceipt {
    pub id: String,
}

#[automock]
#[async_trait]
pub trait NotificationDispatch: Send + Sync {
    /// Deliver `template_key` to `recipient` on behalf of `tenant`.
    async fn send(
        &self,
        recipient: &UserId,
        template_key: &str,
        tenant: &TenantId,
        context: &ReminderContext,
    ) -> Result<NotificationReceipt, CollaboratorError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendNotificationRequest<'a> {
    recipient_id: &'a UserId,
    template_key: &'a str,
    tenant_id: &'a TenantId,
    context: &'a ReminderContext,
}

/// Notification service reached over HTTP at `POST {base}/notifications`.
#[derive(Debug, Clone)]
pub struct HttpNotificationDispatch {
    endpoint: HttpEndpoint,
}

impl HttpNotificationDispatch {
    #[must_use]
    pub fn new(endpoint: HttpEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl NotificationDispatch for HttpNotificationDispatch {
    async fn send(
        &self,
        recipient: &UserId,
        template_key: &str,
        tenant: &TenantId,
        context: &ReminderContext,
    ) -> Result<NotificationReceipt, CollaboratorError> {
        let response = self
            .endpoint
            .post(tenant, "/notifications")
            .json(&SendNotificationRequest {
                recipient_id: recipient,
                template_key,
                tenant_id: tenant,
                context,
            })
            .send()
            .await?;

        required_json(response, "notification").await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use testresult::TestResult;

    use super::*;

    #[test]
    fn request_body_shape() -> TestResult {
        let cart_id = CartId::new();
        let context = ReminderContext {
            cart_id,
            item_count: 2,
            total: "$66.00".into(),
            currency: "USD".into(),
            reminder_stage: 1,
            email: "u1@acme.test".into(),
        };

        let body = serde_json::to_value(SendNotificationRequest {
            recipient_id: &UserId::parse("u1")?,
            template_key: "cart.abandoned.first",
            tenant_id: &TenantId::parse("acme")?,
            context: &context,
        })?;

        assert_eq!(
            body,
            json!({
                "recipientId": "u1",
                "templateKey": "cart.abandoned.first",
                "tenantId": "acme",
                "context": {
                    "cartId": cart_id.to_string(),
                    "itemCount": 2,
                    "total": "$66.00",
                    "currency": "USD",
                    "reminderStage": 1,
                    "email": "u1@acme.test",
                },
            })
        );

        Ok(())
    }
}
