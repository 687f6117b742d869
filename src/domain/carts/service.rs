//! Carts service.
//!
//! Reads go ephemeral tier first, then fall back to the durable mirror.
//! Writes go durable first with a version check, then refresh the ephemeral
//! copy on a best-effort basis.

use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use tracing::{Span, error, info, warn};

use crate::{
    clock::Clock,
    collaborators::{CatalogProduct, ProductCatalog, with_timeout},
    config::CartSettings,
    domain::{
        carts::{
            durable::CartDurableStore,
            errors::{CartsServiceError, StoreError},
            models::{Attributes, Cart, CartItem, CartItemId, CartKey, validate_attributes},
            pricing::PricingPolicy,
            saved::{SavedCart, SavedCartOwner},
            store::CartStore,
        },
        tenants::{TenantContext, TenantId},
    },
    ids::{ProductId, SessionId, UserId},
};

/// Request to add a product to a cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddCartItem {
    pub product_id: ProductId,
    /// Must be positive.
    pub quantity: i64,
    pub attributes: Attributes,
}

/// Carts service backed by an ephemeral and a durable tier.
#[derive(Clone)]
pub struct TieredCartsService {
    ephemeral: Arc<dyn CartStore>,
    durable: Arc<dyn CartDurableStore>,
    catalog: Arc<dyn ProductCatalog>,
    pricing: Arc<dyn PricingPolicy>,
    clock: Arc<dyn Clock>,
    settings: CartSettings,
}

impl std::fmt::Debug for TieredCartsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCartsService")
            .field("pricing", &self.pricing)
            .field("clock", &self.clock)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl TieredCartsService {
    #[must_use]
    pub fn new(
        ephemeral: Arc<dyn CartStore>,
        durable: Arc<dyn CartDurableStore>,
        catalog: Arc<dyn ProductCatalog>,
        pricing: Arc<dyn PricingPolicy>,
        clock: Arc<dyn Clock>,
        settings: CartSettings,
    ) -> Self {
        Self {
            ephemeral,
            durable,
            catalog,
            pricing,
            clock,
            settings,
        }
    }

    /// Live cart for the session, recovered from the durable tier on an
    /// ephemeral miss.
    async fn load(
        &self,
        tenant: &TenantId,
        session: &SessionId,
    ) -> Result<Option<Cart>, CartsServiceError> {
        let key = CartKey::new(tenant.clone(), session.clone());

        match self.ephemeral.get(&key).await {
            Ok(Some(cart)) => return Ok(Some(cart)),
            Ok(None) => {}
            Err(error) => {
                warn!(%key, %error, "ephemeral cart store unavailable, reading durable tier");
            }
        }

        self.recover(tenant, session).await
    }

    /// Rebuild the ephemeral copy from the durable mirror. Content and
    /// `updated_at` are untouched so abandonment tracking is unaffected.
    async fn recover(
        &self,
        tenant: &TenantId,
        session: &SessionId,
    ) -> Result<Option<Cart>, CartsServiceError> {
        let Some(record) = self.durable.find_by_session(tenant, session).await? else {
            return Ok(None);
        };

        let mut cart = record.cart;
        cart.expires_at = self.clock.now() + self.settings.cart_ttl;

        self.cache(&cart).await;

        info!(cart_id = %cart.id, "recovered cart from durable tier");

        Ok(Some(cart))
    }

    async fn require(
        &self,
        tenant: &TenantId,
        session: &SessionId,
    ) -> Result<Cart, CartsServiceError> {
        self.load(tenant, session)
            .await?
            .ok_or(CartsServiceError::CartNotFound)
    }

    async fn load_or_create(
        &self,
        tenant: &TenantId,
        session: &SessionId,
    ) -> Result<Cart, CartsServiceError> {
        if let Some(cart) = self.load(tenant, session).await? {
            return Ok(cart);
        }

        let cart = Cart::new(
            tenant.clone(),
            session.clone(),
            self.pricing.summarize(tenant, 0),
            self.clock.now(),
            self.settings.cart_ttl,
        );

        let cart = self.persist(cart).await?;

        info!(cart_id = %cart.id, "created cart");

        Ok(cart)
    }

    /// Recompute pricing and restamp timestamps after a content change.
    fn reprice(&self, cart: &mut Cart) {
        let summary = self
            .pricing
            .summarize(&cart.tenant_id, cart.items_subtotal());

        cart.touch(summary, self.clock.now(), self.settings.cart_ttl);
    }

    async fn persist(&self, cart: Cart) -> Result<Cart, CartsServiceError> {
        let record = match self.durable.save_cart(&cart).await {
            Ok(record) => record,
            Err(StoreError::Conflict) => {
                self.evict(&cart.key()).await;

                return Err(CartsServiceError::Conflict);
            }
            Err(error) => return Err(error.into()),
        };

        self.cache(&record.cart).await;

        Ok(record.cart)
    }

    async fn cache(&self, cart: &Cart) {
        if let Err(error) = self.ephemeral.save(cart).await {
            warn!(
                cart_id = %cart.id,
                %error,
                "ephemeral cart write failed, continuing on durable tier"
            );
        }
    }

    async fn evict(&self, key: &CartKey) {
        if let Err(error) = self.ephemeral.delete(key).await {
            warn!(%key, %error, "failed to evict stale cart from ephemeral tier");
        }
    }

    async fn mutate<F>(&self, mut cart: Cart, change: F) -> Result<Cart, CartsServiceError>
    where
        F: FnOnce(&mut Cart) -> Result<(), CartsServiceError> + Send,
    {
        change(&mut cart)?;

        self.reprice(&mut cart);

        let cart = self.persist(cart).await?;

        Span::current().record("cart_id", tracing::field::display(cart.id));

        Ok(cart)
    }

    async fn lookup_product(
        &self,
        tenant: &TenantId,
        product: &ProductId,
    ) -> Result<CatalogProduct, CartsServiceError> {
        let found = with_timeout(
            self.settings.collaborator_timeout,
            self.catalog.lookup(tenant, product),
        )
        .await
        .map_err(CartsServiceError::Catalog)?
        .ok_or_else(|| CartsServiceError::ProductNotFound(product.clone()))?;

        if !found.active {
            return Err(CartsServiceError::InactiveProduct(product.clone()));
        }

        Ok(found)
    }

    /// Undo the cart half of an interrupted save-for-later.
    async fn return_to_cart(&self, cart: Cart, item: CartItem) {
        let item_id = item.id.clone();

        let returned = self
            .mutate(cart, |cart| {
                cart.merge_item(item);

                Ok(())
            })
            .await;

        if let Err(undo) = returned {
            error!(%item_id, error = %undo, "failed to return item to cart");
        }
    }

    async fn saved_cart_for(
        &self,
        tenant: &TenantId,
        owner: SavedCartOwner,
    ) -> Result<SavedCart, CartsServiceError> {
        Ok(self
            .durable
            .get_saved_cart(tenant, &owner)
            .await?
            .unwrap_or_else(|| SavedCart::new(tenant.clone(), owner, self.clock.now())))
    }
}

fn resolve_tenant(ctx: &TenantContext) -> Result<&TenantId, CartsServiceError> {
    let tenant = ctx.tenant_id()?;

    Span::current().record("tenant_id", tracing::field::display(tenant));

    Ok(tenant)
}

/// Apply a quantity change to an existing item. Zero removes it.
fn apply_quantity(
    cart: &mut Cart,
    item_id: &CartItemId,
    quantity: i64,
    incremental: bool,
) -> Result<(), CartsServiceError> {
    let requested =
        u64::try_from(quantity).map_err(|_negative| CartsServiceError::InvalidQuantity(quantity))?;

    let existing = cart
        .item(item_id)
        .ok_or_else(|| CartsServiceError::ItemNotFound(item_id.clone()))?;

    let next = if incremental {
        existing.quantity.saturating_add(requested)
    } else {
        requested
    };

    if next == 0 {
        cart.take_item(item_id);
    } else {
        let updated = existing.with_quantity(next);

        cart.put_item(updated);
    }

    Ok(())
}

#[async_trait]
impl CartsService for TieredCartsService {
    #[tracing::instrument(
        name = "carts.service.get_or_create",
        skip(self, ctx),
        fields(
            session_id = %session,
            tenant_id = tracing::field::Empty,
            cart_id = tracing::field::Empty
        ),
        err
    )]
    async fn get_or_create(
        &self,
        ctx: &TenantContext,
        session: &SessionId,
    ) -> Result<Cart, CartsServiceError> {
        let tenant = resolve_tenant(ctx)?;

        let cart = self.load_or_create(tenant, session).await?;

        Span::current().record("cart_id", tracing::field::display(cart.id));

        Ok(cart)
    }

    #[tracing::instrument(
        name = "carts.service.add_item",
        skip(self, ctx, item),
        fields(
            session_id = %session,
            product_id = %item.product_id,
            quantity = item.quantity,
            tenant_id = tracing::field::Empty,
            cart_id = tracing::field::Empty
        ),
        err
    )]
    async fn add_item(
        &self,
        ctx: &TenantContext,
        session: &SessionId,
        item: AddCartItem,
    ) -> Result<Cart, CartsServiceError> {
        let tenant = resolve_tenant(ctx)?;

        let quantity = u64::try_from(item.quantity)
            .ok()
            .filter(|quantity| *quantity > 0)
            .ok_or(CartsServiceError::InvalidQuantity(item.quantity))?;

        validate_attributes(&item.attributes).map_err(CartsServiceError::InvalidAttributes)?;

        let product = self.lookup_product(tenant, &item.product_id).await?;
        let cart = self.load_or_create(tenant, session).await?;
        let item_id = CartItemId::derive(&item.product_id, &item.attributes);

        self.mutate(cart, move |cart| {
            if cart.item(&item_id).is_some() {
                return apply_quantity(cart, &item_id, item.quantity, true);
            }

            cart.put_item(CartItem {
                id: item_id,
                product_id: item.product_id,
                name: product.name,
                sku: product.sku,
                price: product.price,
                quantity,
                attributes: item.attributes,
                image_url: product.primary_image_url,
                subtotal: product.price.saturating_mul(quantity),
            });

            Ok(())
        })
        .await
    }

    #[tracing::instrument(
        name = "carts.service.update_item_quantity",
        skip(self, ctx),
        fields(
            session_id = %session,
            item_id = %item_id,
            tenant_id = tracing::field::Empty,
            cart_id = tracing::field::Empty
        ),
        err
    )]
    async fn update_item_quantity(
        &self,
        ctx: &TenantContext,
        session: &SessionId,
        item_id: &CartItemId,
        quantity: i64,
        incremental: bool,
    ) -> Result<Cart, CartsServiceError> {
        let tenant = resolve_tenant(ctx)?;

        if quantity < 0 {
            return Err(CartsServiceError::InvalidQuantity(quantity));
        }

        let cart = self.require(tenant, session).await?;

        self.mutate(cart, |cart| {
            apply_quantity(cart, item_id, quantity, incremental)
        })
        .await
    }

    #[tracing::instrument(
        name = "carts.service.remove_item",
        skip(self, ctx),
        fields(
            session_id = %session,
            item_id = %item_id,
            tenant_id = tracing::field::Empty,
            cart_id = tracing::field::Empty
        ),
        err
    )]
    async fn remove_item(
        &self,
        ctx: &TenantContext,
        session: &SessionId,
        item_id: &CartItemId,
    ) -> Result<Cart, CartsServiceError> {
        let tenant = resolve_tenant(ctx)?;
        let cart = self.require(tenant, session).await?;

        self.mutate(cart, |cart| {
            cart.take_item(item_id)
                .map(|_| ())
                .ok_or_else(|| CartsServiceError::ItemNotFound(item_id.clone()))
        })
        .await
    }

    #[tracing::instrument(
        name = "carts.service.clear_cart",
        skip(self, ctx),
        fields(
            session_id = %session,
            tenant_id = tracing::field::Empty,
            cart_id = tracing::field::Empty
        ),
        err
    )]
    async fn clear_cart(
        &self,
        ctx: &TenantContext,
        session: &SessionId,
    ) -> Result<Cart, CartsServiceError> {
        let tenant = resolve_tenant(ctx)?;
        let cart = self.require(tenant, session).await?;

        self.mutate(cart, |cart| {
            cart.items.clear();

            Ok(())
        })
        .await
    }

    #[tracing::instrument(
        name = "carts.service.delete_cart",
        skip(self, ctx),
        fields(session_id = %session, tenant_id = tracing::field::Empty),
        err
    )]
    async fn delete_cart(
        &self,
        ctx: &TenantContext,
        session: &SessionId,
    ) -> Result<(), CartsServiceError> {
        let tenant = resolve_tenant(ctx)?;
        let key = CartKey::new(tenant.clone(), session.clone());

        if !self.ephemeral.delete(&key).await? {
            return Err(CartsServiceError::CartNotFound);
        }

        info!(%key, "deleted cart from ephemeral tier");

        Ok(())
    }

    #[tracing::instrument(
        name = "carts.service.extend_cart_ttl",
        skip(self, ctx),
        fields(
            session_id = %session,
            tenant_id = tracing::field::Empty,
            cart_id = tracing::field::Empty
        ),
        err
    )]
    async fn extend_cart_ttl(
        &self,
        ctx: &TenantContext,
        session: &SessionId,
    ) -> Result<Cart, CartsServiceError> {
        let tenant = resolve_tenant(ctx)?;
        let key = CartKey::new(tenant.clone(), session.clone());

        let extended = match self.ephemeral.extend_ttl(&key).await {
            Ok(Some(cart)) => cart,
            Ok(None) => self
                .recover(tenant, session)
                .await?
                .ok_or(CartsServiceError::CartNotFound)?,
            Err(error) => {
                warn!(%key, %error, "ephemeral cart store unavailable, reading durable tier");

                self.recover(tenant, session)
                    .await?
                    .ok_or(CartsServiceError::CartNotFound)?
            }
        };

        Span::current().record("cart_id", tracing::field::display(extended.id));

        Ok(extended)
    }

    #[tracing::instrument(
        name = "carts.service.attach_user",
        skip(self, ctx),
        fields(
            session_id = %session,
            user_id = %user,
            tenant_id = tracing::field::Empty,
            cart_id = tracing::field::Empty
        ),
        err
    )]
    async fn attach_user(
        &self,
        ctx: &TenantContext,
        session: &SessionId,
        user: UserId,
    ) -> Result<Cart, CartsServiceError> {
        let tenant = resolve_tenant(ctx)?;
        let cart = self.load_or_create(tenant, session).await?;

        self.mutate(cart, move |cart| {
            cart.user_id = Some(user);

            Ok(())
        })
        .await
    }

    #[tracing::instrument(
        name = "carts.service.reset_abandonment",
        skip(self, ctx),
        fields(
            session_id = %session,
            tenant_id = tracing::field::Empty,
            cart_id = tracing::field::Empty
        ),
        err
    )]
    async fn reset_abandonment(
        &self,
        ctx: &TenantContext,
        session: &SessionId,
    ) -> Result<bool, CartsServiceError> {
        let tenant = resolve_tenant(ctx)?;
        let cart = self.require(tenant, session).await?;

        Span::current().record("cart_id", tracing::field::display(cart.id));

        let cleared = self.durable.reset_abandonment(tenant, &cart.id).await?;

        if cleared {
            info!(cart_id = %cart.id, "reset abandonment reminders");
        }

        Ok(cleared)
    }

    #[tracing::instrument(
        name = "carts.service.save_for_later",
        skip(self, ctx),
        fields(
            session_id = %session,
            item_id = %item_id,
            tenant_id = tracing::field::Empty,
            cart_id = tracing::field::Empty
        ),
        err
    )]
    async fn save_for_later(
        &self,
        ctx: &TenantContext,
        session: &SessionId,
        item_id: &CartItemId,
    ) -> Result<Cart, CartsServiceError> {
        let tenant = resolve_tenant(ctx)?;
        let cart = self.require(tenant, session).await?;

        let item = cart
            .item(item_id)
            .cloned()
            .ok_or_else(|| CartsServiceError::ItemNotFound(item_id.clone()))?;

        let owner = SavedCartOwner::for_cart(cart.user_id.as_ref(), session);
        let mut saved = self.saved_cart_for(tenant, owner).await?;

        // Taken from the cart first; a conflict here leaves both sides untouched.
        let cart = self
            .mutate(cart, |cart| {
                cart.take_item(item_id);

                Ok(())
            })
            .await?;

        saved.put(item.clone(), self.clock.now());

        if let Err(error) = self.durable.save_saved_cart(&saved).await {
            self.return_to_cart(cart, item).await;

            return Err(error.into());
        }

        Ok(cart)
    }

    #[tracing::instrument(
        name = "carts.service.restore_saved_item",
        skip(self, ctx),
        fields(
            session_id = %session,
            item_id = %item_id,
            tenant_id = tracing::field::Empty,
            cart_id = tracing::field::Empty
        ),
        err
    )]
    async fn restore_saved_item(
        &self,
        ctx: &TenantContext,
        session: &SessionId,
        item_id: &CartItemId,
    ) -> Result<Cart, CartsServiceError> {
        let tenant = resolve_tenant(ctx)?;
        let cart = self.load_or_create(tenant, session).await?;

        let owner = SavedCartOwner::for_cart(cart.user_id.as_ref(), session);
        let mut saved = self.saved_cart_for(tenant, owner).await?;

        let restored = saved
            .take(item_id, self.clock.now())
            .ok_or_else(|| CartsServiceError::ItemNotFound(item_id.clone()))?;

        // Taken from the saved list first; a failed cart write puts it back.
        self.durable.save_saved_cart(&saved).await?;

        let item = CartItem::from(restored.clone());

        match self
            .mutate(cart, |cart| {
                cart.merge_item(item);

                Ok(())
            })
            .await
        {
            Ok(cart) => Ok(cart),
            Err(error) => {
                saved.put_back(restored, self.clock.now());

                if let Err(undo) = self.durable.save_saved_cart(&saved).await {
                    error!(%item_id, error = %undo, "failed to return item to saved list");
                }

                Err(error)
            }
        }
    }

    #[tracing::instrument(
        name = "carts.service.get_saved_cart",
        skip(self, ctx),
        fields(session_id = %session, tenant_id = tracing::field::Empty),
        err
    )]
    async fn get_saved_cart(
        &self,
        ctx: &TenantContext,
        session: &SessionId,
    ) -> Result<SavedCart, CartsServiceError> {
        let tenant = resolve_tenant(ctx)?;
        let cart = self.load(tenant, session).await?;

        let owner = SavedCartOwner::for_cart(
            cart.as_ref().and_then(|cart| cart.user_id.as_ref()),
            session,
        );

        self.saved_cart_for(tenant, owner).await
    }
}

#[automock]
#[async_trait]
pub trait CartsService: Send + Sync {
    /// The session's active cart, recovered or freshly created as needed.
    async fn get_or_create(
        &self,
        ctx: &TenantContext,
        session: &SessionId,
    ) -> Result<Cart, CartsServiceError>;

    /// Add a product. Adding the same product and attributes again combines
    /// quantities into the existing item.
    async fn add_item(
        &self,
        ctx: &TenantContext,
        session: &SessionId,
        item: AddCartItem,
    ) -> Result<Cart, CartsServiceError>;

    /// Set (or, when `incremental`, add to) an item's quantity. A resulting
    /// quantity of zero removes the item.
    async fn update_item_quantity(
        &self,
        ctx: &TenantContext,
        session: &SessionId,
        item_id: &CartItemId,
        quantity: i64,
        incremental: bool,
    ) -> Result<Cart, CartsServiceError>;

    async fn remove_item(
        &self,
        ctx: &TenantContext,
        session: &SessionId,
        item_id: &CartItemId,
    ) -> Result<Cart, CartsServiceError>;

    /// Empty the cart, keeping its identity.
    async fn clear_cart(
        &self,
        ctx: &TenantContext,
        session: &SessionId,
    ) -> Result<Cart, CartsServiceError>;

    /// Remove the cart from the ephemeral tier. The durable mirror stays for
    /// abandonment bookkeeping.
    async fn delete_cart(
        &self,
        ctx: &TenantContext,
        session: &SessionId,
    ) -> Result<(), CartsServiceError>;

    /// Restart the cart's TTL without changing its content.
    async fn extend_cart_ttl(
        &self,
        ctx: &TenantContext,
        session: &SessionId,
    ) -> Result<Cart, CartsServiceError>;

    /// Bind a signed-in user to the cart.
    async fn attach_user(
        &self,
        ctx: &TenantContext,
        session: &SessionId,
        user: UserId,
    ) -> Result<Cart, CartsServiceError>;

    /// Clear both reminder flags so the cart can be reminded again.
    async fn reset_abandonment(
        &self,
        ctx: &TenantContext,
        session: &SessionId,
    ) -> Result<bool, CartsServiceError>;

    /// Move an item from the cart to the saved list.
    async fn save_for_later(
        &self,
        ctx: &TenantContext,
        session: &SessionId,
        item_id: &CartItemId,
    ) -> Result<Cart, CartsServiceError>;

    /// Move an item from the saved list back into the cart.
    async fn restore_saved_item(
        &self,
        ctx: &TenantContext,
        session: &SessionId,
        item_id: &CartItemId,
    ) -> Result<Cart, CartsServiceError>;

    async fn get_saved_cart(
        &self,
        ctx: &TenantContext,
        session: &SessionId,
    ) -> Result<SavedCart, CartsServiceError>;
}
