//! Cart pricing policy.
//!
//! Turns a cart subtotal into tax, shipping and total. Policies are resolved
//! per tenant; [`StandardPricing`] is the flat-rate policy most tenants use.

use std::fmt::Debug;

use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use rustc_hash::FxHashMap;
use rusty_money::{Money, iso};
use thiserror::Error;

use crate::domain::{carts::models::CartSummary, tenants::TenantId};

/// Errors raised while building a pricing policy.
#[derive(Debug, Error, PartialEq)]
pub enum PricingError {
    /// Tax rate outside `0..=1`.
    #[error("tax rate {0} must be between 0 and 1")]
    InvalidTaxRate(Decimal),

    /// Currency code not found in ISO 4217.
    #[error("unknown currency code {0:?}")]
    UnknownCurrency(String),
}

/// Computes the pricing summary for a cart subtotal.
pub trait PricingPolicy: Debug + Send + Sync {
    /// Summary for `subtotal` (minor units) under `tenant`'s policy.
    fn summarize(&self, tenant: &TenantId, subtotal: u64) -> CartSummary;
}

/// Percentage tax plus flat shipping waived above a threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardPricing {
    tax_rate: Decimal,
    free_shipping_threshold: u64,
    flat_shipping: u64,
    currency: &'static iso::Currency,
}

impl StandardPricing {
    /// Build a policy.
    ///
    /// # Errors
    ///
    /// - [`PricingError::InvalidTaxRate`]: `tax_rate` is negative or above 1.
    /// - [`PricingError::UnknownCurrency`]: `currency` is not an ISO 4217 code.
    pub fn new(
        tax_rate: Decimal,
        free_shipping_threshold: u64,
        flat_shipping: u64,
        currency: &str,
    ) -> Result<Self, PricingError> {
        if tax_rate < Decimal::ZERO || tax_rate > Decimal::ONE {
            return Err(PricingError::InvalidTaxRate(tax_rate));
        }

        let currency =
            iso::find(currency).ok_or_else(|| PricingError::UnknownCurrency(currency.into()))?;

        Ok(Self {
            tax_rate,
            free_shipping_threshold,
            flat_shipping,
            currency,
        })
    }

    /// ISO 4217 code.
    #[must_use]
    pub fn currency_code(&self) -> &'static str {
        self.currency.iso_alpha_code
    }

    /// Tax on `subtotal`, rounded half away from zero to a whole minor unit.
    #[must_use]
    pub fn tax_for(&self, subtotal: u64) -> u64 {
        (Decimal::from(subtotal) * self.tax_rate)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_u64()
            .unwrap_or(u64::MAX)
    }

    /// Shipping charge for `subtotal`.
    #[must_use]
    pub fn shipping_for(&self, subtotal: u64) -> u64 {
        if subtotal >= self.free_shipping_threshold {
            0
        } else {
            self.flat_shipping
        }
    }

    fn summary(&self, subtotal: u64) -> CartSummary {
        // Nothing to ship.
        if subtotal == 0 {
            return CartSummary::empty(self.currency_code());
        }

        let tax = self.tax_for(subtotal);
        let shipping = self.shipping_for(subtotal);

        CartSummary {
            subtotal,
            tax,
            shipping,
            total: subtotal.saturating_add(tax).saturating_add(shipping),
            currency: self.currency_code().to_string(),
        }
    }
}

impl Default for StandardPricing {
    /// 10% tax, free shipping from 50.00, otherwise 5.00, in USD.
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(10, 2),
            free_shipping_threshold: 50_00,
            flat_shipping: 5_00,
            currency: iso::USD,
        }
    }
}

impl PricingPolicy for StandardPricing {
    fn summarize(&self, _tenant: &TenantId, subtotal: u64) -> CartSummary {
        self.summary(subtotal)
    }
}

/// Per-tenant policies with a shared fallback.
#[derive(Debug, Clone, Default)]
pub struct TenantPricing {
    fallback: StandardPricing,
    tenants: FxHashMap<TenantId, StandardPricing>,
}

impl TenantPricing {
    #[must_use]
    pub fn new(fallback: StandardPricing) -> Self {
        Self {
            fallback,
            tenants: FxHashMap::default(),
        }
    }

    /// Use `pricing` for `tenant` instead of the fallback.
    #[must_use]
    pub fn with_tenant(mut self, tenant: TenantId, pricing: StandardPricing) -> Self {
        self.tenants.insert(tenant, pricing);
        self
    }

    /// Policy in force for `tenant`.
    #[must_use]
    pub fn policy_for(&self, tenant: &TenantId) -> &StandardPricing {
        self.tenants.get(tenant).unwrap_or(&self.fallback)
    }
}

impl PricingPolicy for TenantPricing {
    fn summarize(&self, tenant: &TenantId, subtotal: u64) -> CartSummary {
        self.policy_for(tenant).summary(subtotal)
    }
}

/// Render `amount` minor units of `currency` for display, e.g. `$66.00`.
///
/// Known ISO codes use their own exponent (`JPY` has no minor digits). Codes
/// `rusty-money` does not know have no exponent to go by and are assumed to
/// carry two minor digits, rendered as `"<major>.<minor> <code>"`.
#[must_use]
pub fn format_amount(amount: u64, currency: &str) -> String {
    let minor = i64::try_from(amount).unwrap_or(i64::MAX);

    match iso::find(currency) {
        Some(currency) => Money::from_minor(minor, currency).to_string(),
        None => format!("{}.{:02} {currency}", amount / 100, amount % 100),
    }
}
