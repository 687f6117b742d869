//! Shared harness for the integration suites: both cart tiers in memory, a
//! manual clock and an outbox standing in for the notification service.

use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use testresult::TestResult;
use tokio::sync::Mutex;

use lattice_carts::{
    clock::{Clock, ManualClock},
    collaborators::{
        CatalogProduct, CollaboratorError, InMemoryProductCatalog, InMemoryUserDirectory,
        NotificationDispatch, NotificationReceipt, ReminderContext, UserContact,
    },
    config::CartSettings,
    domain::{
        abandonment::AbandonmentScheduler,
        carts::{
            AddCartItem, CartsService, TieredCartsService,
            durable::InMemoryCartDurableStore,
            models::{Attributes, Cart},
            pricing::StandardPricing,
            store::InMemoryCartStore,
        },
        tenants::{TenantContext, TenantId},
    },
    ids::{ProductId, SessionId, UserId},
};

pub const START: Timestamp = Timestamp::UNIX_EPOCH;

/// A reminder handed to the notification service.
#[derive(Debug, Clone)]
pub struct SentReminder {
    pub recipient: UserId,
    pub template_key: String,
    pub tenant: TenantId,
    pub context: ReminderContext,
}

/// Records every dispatched reminder.
#[derive(Debug, Default)]
pub struct Outbox {
    sent: Mutex<Vec<SentReminder>>,
}

impl Outbox {
    pub async fn sent(&self) -> Vec<SentReminder> {
        self.sent.lock().await.clone()
    }

    pub async fn drain(&self) -> Vec<SentReminder> {
        std::mem::take(&mut *self.sent.lock().await)
    }
}

#[async_trait]
impl NotificationDispatch for Outbox {
    async fn send(
        &self,
        recipient: &UserId,
        template_key: &str,
        tenant: &TenantId,
        context: &ReminderContext,
    ) -> Result<NotificationReceipt, CollaboratorError> {
        let mut sent = self.sent.lock().await;

        sent.push(SentReminder {
            recipient: recipient.clone(),
            template_key: template_key.to_string(),
            tenant: tenant.clone(),
            context: context.clone(),
        });

        Ok(NotificationReceipt {
            id: format!("notification-{}", sent.len()),
        })
    }
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub ephemeral: InMemoryCartStore,
    pub durable: InMemoryCartDurableStore,
    pub catalog: Arc<InMemoryProductCatalog>,
    pub directory: Arc<InMemoryUserDirectory>,
    pub outbox: Arc<Outbox>,
    pub carts: Arc<TieredCartsService>,
    pub scheduler: AbandonmentScheduler,
}

impl Harness {
    pub fn new() -> Self {
        let settings = CartSettings::default();
        let clock = Arc::new(ManualClock::new(START));
        let ephemeral = InMemoryCartStore::new(clock.clone(), settings.cart_ttl);
        let durable = InMemoryCartDurableStore::new();
        let catalog = Arc::new(InMemoryProductCatalog::new());
        let directory = Arc::new(InMemoryUserDirectory::new());
        let outbox = Arc::new(Outbox::default());

        let carts = TieredCartsService::new(
            Arc::new(ephemeral.clone()),
            Arc::new(durable.clone()),
            catalog.clone(),
            Arc::new(StandardPricing::default()),
            clock.clone(),
            settings.clone(),
        );

        let scheduler = AbandonmentScheduler::new(
            Arc::new(durable.clone()),
            directory.clone(),
            outbox.clone(),
            clock.clone(),
            settings,
        );

        Self {
            clock,
            ephemeral,
            durable,
            catalog,
            directory,
            outbox,
            carts: Arc::new(carts),
            scheduler,
        }
    }

    pub fn clock_now(&self) -> Timestamp {
        self.clock.now()
    }

    pub async fn product(&self, tenant: &TenantContext, id: &str, price: u64) -> TestResult<ProductId> {
        let id = ProductId::parse(id)?;

        self.catalog
            .insert(
                tenant.tenant_id()?.clone(),
                CatalogProduct {
                    id: id.clone(),
                    name: format!("Product {id}"),
                    sku: format!("SKU-{id}"),
                    price,
                    active: true,
                    primary_image_url: None,
                },
            )
            .await;

        Ok(id)
    }

    pub async fn user(&self, tenant: &TenantContext, id: &str) -> TestResult<UserId> {
        let tenant = tenant.tenant_id()?;
        let user = UserId::parse(id)?;

        self.directory
            .insert(
                tenant.clone(),
                user.clone(),
                UserContact {
                    email: format!("{id}@{tenant}.test"),
                },
            )
            .await;

        Ok(user)
    }

    pub async fn add(
        &self,
        tenant: &TenantContext,
        session: &SessionId,
        product: &ProductId,
        quantity: i64,
    ) -> TestResult<Cart> {
        Ok(self
            .carts
            .add_item(
                tenant,
                session,
                AddCartItem {
                    product_id: product.clone(),
                    quantity,
                    attributes: Attributes::new(),
                },
            )
            .await?)
    }
}

pub fn tenant(name: &str) -> TestResult<TenantContext> {
    Ok(TenantContext::new(TenantId::parse(name)?))
}

pub fn session(raw: &str) -> TestResult<SessionId> {
    Ok(SessionId::parse(raw)?)
}
