//! Cart Models

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
};

use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    domain::tenants::TenantId,
    ids::{ProductId, SessionId, UserId},
    uuids::TypedUuid,
};

/// Cart UUID
pub type CartId = TypedUuid<Cart>;

/// Variant dimension to value, e.g. `size -> M`. Kept sorted so the item
/// key does not depend on the order attributes were supplied in.
pub type Attributes = BTreeMap<String, String>;

/// Deterministic cart item key derived from a product and its attributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartItemId(String);

impl CartItemId {
    const PREFIX: &'static str = "ci_";
    const HEX_LEN: usize = 32;

    /// Derive the key for `product` with `attributes`.
    ///
    /// Fields are length-prefixed before hashing so `{"a=b": "c"}` and
    /// `{"a": "b=c"}` cannot collide.
    #[must_use]
    pub fn derive(product: &ProductId, attributes: &Attributes) -> Self {
        let mut hasher = Sha256::new();

        write_field(&mut hasher, product.as_str());

        for (name, value) in attributes {
            write_field(&mut hasher, name);
            write_field(&mut hasher, value);
        }

        let mut hex = format!("{:x}", hasher.finalize());
        hex.truncate(Self::HEX_LEN);

        Self(format!("{}{hex}", Self::PREFIX))
    }

    /// Wrap a key received from a caller.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the raw key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CartItemId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

fn write_field(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}

/// A line in the cart. Never edited in place; quantity changes produce a
/// replacement item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub name: String,
    pub sku: String,
    /// Unit price in minor units, captured when the item was added.
    pub price: u64,
    pub quantity: u64,
    pub attributes: Attributes,
    pub image_url: Option<String>,
    /// `price * quantity`
    pub subtotal: u64,
}

impl CartItem {
    /// Copy of this item with a new quantity and matching subtotal.
    #[must_use]
    pub fn with_quantity(&self, quantity: u64) -> Self {
        Self {
            quantity,
            subtotal: self.price.saturating_mul(quantity),
            ..self.clone()
        }
    }
}

/// Derived pricing snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSummary {
    pub subtotal: u64,
    pub tax: u64,
    pub shipping: u64,
    pub total: u64,
    /// ISO 4217 code the amounts are expressed in.
    pub currency: String,
}

impl CartSummary {
    /// All-zero summary in `currency`.
    #[must_use]
    pub fn empty(currency: impl Into<String>) -> Self {
        Self {
            subtotal: 0,
            tax: 0,
            shipping: 0,
            total: 0,
            currency: currency.into(),
        }
    }
}

/// Ephemeral-tier lookup key. Always embeds the tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CartKey {
    pub tenant: TenantId,
    pub session: SessionId,
}

impl CartKey {
    #[must_use]
    pub fn new(tenant: TenantId, session: SessionId) -> Self {
        Self { tenant, session }
    }
}

/// Renders as `{tenant byte length}:{tenant}:{session}`. Ids may contain
/// `:`, so the length prefix keeps every (tenant, session) pair distinct.
impl Display for CartKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let tenant = self.tenant.as_str();

        write!(f, "{}:{tenant}:{}", tenant.len(), self.session)
    }
}

/// Cart Model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub tenant_id: TenantId,
    pub session_id: SessionId,
    pub user_id: Option<UserId>,
    pub items: Vec<CartItem>,
    pub summary: CartSummary,
    /// Sum of item quantities.
    pub item_count: u64,
    /// Durable-tier version this copy was read at; `0` until first saved.
    pub version: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub expires_at: Timestamp,
}

impl Cart {
    /// Fresh, empty cart for a session.
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        session_id: SessionId,
        summary: CartSummary,
        now: Timestamp,
        ttl: SignedDuration,
    ) -> Self {
        Self {
            id: CartId::new(),
            tenant_id,
            session_id,
            user_id: None,
            items: Vec::new(),
            summary,
            item_count: 0,
            version: 0,
            created_at: now,
            updated_at: now,
            expires_at: now + ttl,
        }
    }

    #[must_use]
    pub fn key(&self) -> CartKey {
        CartKey::new(self.tenant_id.clone(), self.session_id.clone())
    }

    #[must_use]
    pub fn item(&self, id: &CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.id == *id)
    }

    /// `Σ item.subtotal`
    #[must_use]
    pub fn items_subtotal(&self) -> u64 {
        self.items
            .iter()
            .fold(0_u64, |acc, item| acc.saturating_add(item.subtotal))
    }

    /// `Σ item.quantity`
    #[must_use]
    pub fn items_quantity(&self) -> u64 {
        self.items
            .iter()
            .fold(0_u64, |acc, item| acc.saturating_add(item.quantity))
    }

    /// Insert `item`, replacing any existing item with the same key in place.
    pub(crate) fn put_item(&mut self, item: CartItem) {
        match self.items.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => *existing = item,
            None => self.items.push(item),
        }
    }

    /// Insert `item`, adding its quantity to an existing item with the same key.
    pub(crate) fn merge_item(&mut self, item: CartItem) {
        let merged = match self.item(&item.id) {
            Some(existing) => {
                existing.with_quantity(existing.quantity.saturating_add(item.quantity))
            }
            None => item,
        };

        self.put_item(merged);
    }

    pub(crate) fn take_item(&mut self, id: &CartItemId) -> Option<CartItem> {
        let position = self.items.iter().position(|item| item.id == *id)?;

        Some(self.items.remove(position))
    }

    /// Restamp derived fields after a content change.
    pub(crate) fn touch(&mut self, summary: CartSummary, now: Timestamp, ttl: SignedDuration) {
        self.summary = summary;
        self.item_count = self.items_quantity();
        self.updated_at = now;
        self.expires_at = now + ttl;
    }
}

/// Why a set of attributes was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeProblem {
    BlankName,
    BlankValue(String),
    ControlCharacter(String),
}

impl Display for AttributeProblem {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::BlankName => f.write_str("attribute name cannot be blank"),
            Self::BlankValue(name) => write!(f, "attribute {name:?} has a blank value"),
            Self::ControlCharacter(name) => {
                write!(f, "attribute {name:?} contains control characters")
            }
        }
    }
}

/// Check attribute names and values are usable as variant labels.
///
/// # Errors
///
/// Returns the first [`AttributeProblem`] found.
pub fn validate_attributes(attributes: &Attributes) -> Result<(), AttributeProblem> {
    for (name, value) in attributes {
        if name.trim().is_empty() {
            return Err(AttributeProblem::BlankName);
        }

        if value.trim().is_empty() {
            return Err(AttributeProblem::BlankValue(name.clone()));
        }

        if name.chars().chain(value.chars()).any(char::is_control) {
            return Err(AttributeProblem::ControlCharacter(name.clone()));
        }
    }

    Ok(())
}
