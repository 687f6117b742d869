//! Saved-for-later items.
//!
//! Shoppers move items out of the live cart deliberately. The saved list is
//! durable on its own and does not expire with the cart.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::{
    domain::{
        carts::models::{Attributes, CartItem, CartItemId},
        tenants::TenantId,
    },
    ids::{ProductId, SessionId, UserId},
};

/// Who a saved list belongs to. Signed-in users keep theirs across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SavedCartOwner {
    User(UserId),
    Session(SessionId),
}

impl SavedCartOwner {
    /// Prefer the user when one is attached.
    #[must_use]
    pub fn for_cart(user: Option<&UserId>, session: &SessionId) -> Self {
        match user {
            Some(user) => Self::User(user.clone()),
            None => Self::Session(session.clone()),
        }
    }

    /// Storage discriminator and raw id.
    #[must_use]
    pub fn parts(&self) -> (&'static str, &str) {
        match self {
            Self::User(user) => ("user", user.as_str()),
            Self::Session(session) => ("session", session.as_str()),
        }
    }
}

/// A saved item. Carries every [`CartItem`] field so conversion is lossless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedItem {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub name: String,
    pub sku: String,
    pub price: u64,
    pub quantity: u64,
    pub attributes: Attributes,
    pub image_url: Option<String>,
    pub subtotal: u64,
    pub saved_at: Timestamp,
}

impl SavedItem {
    #[must_use]
    pub fn from_cart_item(item: CartItem, saved_at: Timestamp) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            name: item.name,
            sku: item.sku,
            price: item.price,
            quantity: item.quantity,
            attributes: item.attributes,
            image_url: item.image_url,
            subtotal: item.subtotal,
            saved_at,
        }
    }
}

impl From<SavedItem> for CartItem {
    fn from(saved: SavedItem) -> Self {
        Self {
            id: saved.id,
            product_id: saved.product_id,
            name: saved.name,
            sku: saved.sku,
            price: saved.price,
            quantity: saved.quantity,
            attributes: saved.attributes,
            image_url: saved.image_url,
            subtotal: saved.subtotal,
        }
    }
}

/// Saved Cart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedCart {
    pub tenant_id: TenantId,
    pub owner: SavedCartOwner,
    pub items: Vec<SavedItem>,
    pub updated_at: Timestamp,
}

impl SavedCart {
    #[must_use]
    pub fn new(tenant_id: TenantId, owner: SavedCartOwner, now: Timestamp) -> Self {
        Self {
            tenant_id,
            owner,
            items: Vec::new(),
            updated_at: now,
        }
    }

    /// Save `item`. Saving the same variant twice combines quantities.
    pub(crate) fn put(&mut self, item: CartItem, now: Timestamp) {
        match self.items.iter_mut().find(|saved| saved.id == item.id) {
            Some(saved) => {
                let quantity = saved.quantity.saturating_add(item.quantity);

                saved.quantity = quantity;
                saved.subtotal = saved.price.saturating_mul(quantity);
                saved.saved_at = now;
            }
            None => self.items.push(SavedItem::from_cart_item(item, now)),
        }

        self.updated_at = now;
    }

    /// Return a previously taken item unchanged, combining with any copy
    /// saved since.
    pub(crate) fn put_back(&mut self, item: SavedItem, now: Timestamp) {
        match self.items.iter_mut().find(|saved| saved.id == item.id) {
            Some(saved) => {
                saved.quantity = saved.quantity.saturating_add(item.quantity);
                saved.subtotal = saved.price.saturating_mul(saved.quantity);
            }
            None => self.items.push(item),
        }

        self.updated_at = now;
    }

    pub(crate) fn take(&mut self, id: &CartItemId, now: Timestamp) -> Option<SavedItem> {
        let position = self.items.iter().position(|saved| saved.id == *id)?;

        self.updated_at = now;

        Some(self.items.remove(position))
    }
}
