//! Test context for service-level tests over the in-memory tiers.

use std::sync::Arc;

use jiff::Timestamp;

use crate::{
    clock::ManualClock,
    collaborators::{CatalogProduct, InMemoryProductCatalog, InMemoryUserDirectory, UserContact},
    config::CartSettings,
    domain::{
        carts::{
            AddCartItem, CartsService, CartsServiceError, TieredCartsService,
            durable::InMemoryCartDurableStore,
            models::{Attributes, Cart},
            pricing::StandardPricing,
            store::InMemoryCartStore,
        },
        tenants::{TenantContext, TenantId},
    },
    ids::{BlankIdError, ProductId, SessionId, UserId},
};

/// Fixed starting instant so expectations can be written as offsets.
pub(crate) const START: Timestamp = Timestamp::UNIX_EPOCH;

pub(crate) struct TestContext {
    pub clock: Arc<ManualClock>,
    pub tenant_id: TenantId,
    pub tenant: TenantContext,
    pub ephemeral: InMemoryCartStore,
    pub durable: InMemoryCartDurableStore,
    pub catalog: Arc<InMemoryProductCatalog>,
    pub directory: Arc<InMemoryUserDirectory>,
    pub settings: CartSettings,
    pub carts: TieredCartsService,
}

impl TestContext {
    pub fn new() -> Result<Self, BlankIdError> {
        let settings = CartSettings::default();
        let clock = Arc::new(ManualClock::new(START));
        let ephemeral = InMemoryCartStore::new(clock.clone(), settings.cart_ttl);
        let durable = InMemoryCartDurableStore::new();
        let catalog = Arc::new(InMemoryProductCatalog::new());

        let carts = TieredCartsService::new(
            Arc::new(ephemeral.clone()),
            Arc::new(durable.clone()),
            catalog.clone(),
            Arc::new(StandardPricing::default()),
            clock.clone(),
            settings.clone(),
        );

        let tenant_id = TenantId::parse("acme")?;

        Ok(Self {
            clock,
            tenant: TenantContext::new(tenant_id.clone()),
            tenant_id,
            ephemeral,
            durable,
            catalog,
            directory: Arc::new(InMemoryUserDirectory::new()),
            settings,
            carts,
        })
    }

    /// Context for another tenant sharing the same stores.
    pub fn other_tenant(tenant: &str) -> Result<TenantContext, BlankIdError> {
        Ok(TenantContext::new(TenantId::parse(tenant)?))
    }

    /// Register a product in `tenant`'s catalog.
    pub async fn product(
        &self,
        tenant: &TenantContext,
        id: &str,
        price: u64,
        active: bool,
    ) -> Result<ProductId, BlankIdError> {
        let id = ProductId::parse(id)?;
        let Ok(tenant) = tenant.tenant_id() else {
            return Ok(id);
        };

        self.catalog
            .insert(
                tenant.clone(),
                CatalogProduct {
                    id: id.clone(),
                    name: format!("Product {id}"),
                    sku: format!("SKU-{id}"),
                    price,
                    active,
                    primary_image_url: None,
                },
            )
            .await;

        Ok(id)
    }

    /// Register a contact for `user` in the default tenant.
    pub async fn user(&self, user: &str) -> Result<UserId, BlankIdError> {
        let user = UserId::parse(user)?;

        self.directory
            .insert(
                self.tenant_id.clone(),
                user.clone(),
                UserContact {
                    email: format!("{user}@acme.test"),
                },
            )
            .await;

        Ok(user)
    }

    pub async fn add(
        &self,
        session: &SessionId,
        product: &ProductId,
        quantity: i64,
    ) -> Result<Cart, CartsServiceError> {
        self.add_variant(session, product, quantity, Attributes::new())
            .await
    }

    pub async fn add_variant(
        &self,
        session: &SessionId,
        product: &ProductId,
        quantity: i64,
        attributes: Attributes,
    ) -> Result<Cart, CartsServiceError> {
        self.carts
            .add_item(
                &self.tenant,
                session,
                AddCartItem {
                    product_id: product.clone(),
                    quantity,
                    attributes,
                },
            )
            .await
    }
}
