//! Cart Records
//!
//! Durable-tier shapes. A [`PersistedCart`] mirrors the live cart and adds the
//! bookkeeping the abandonment sweep depends on.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::domain::carts::models::Cart;

/// Durable mirror of a [`Cart`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedCart {
    /// Cart content as of the last durable write.
    pub cart: Cart,

    /// Set once checkout completes. Converted carts are never reminded.
    pub converted: bool,
    pub converted_at: Option<Timestamp>,

    /// First reminder has been dispatched.
    pub abandonment_notified: bool,
    pub abandonment_notified_at: Option<Timestamp>,

    /// Second reminder has been dispatched. Only ever set after the first.
    pub second_reminder_sent: bool,
    pub second_reminder_sent_at: Option<Timestamp>,
}

impl PersistedCart {
    /// Record for a cart that has never been written durably.
    #[must_use]
    pub fn new(cart: Cart) -> Self {
        Self {
            cart,
            converted: false,
            converted_at: None,
            abandonment_notified: false,
            abandonment_notified_at: None,
            second_reminder_sent: false,
            second_reminder_sent_at: None,
        }
    }

    /// Replace the cart content, keeping the bookkeeping flags.
    pub(crate) fn replace_cart(&mut self, cart: Cart) {
        self.cart = cart;
    }

    /// Whether a reminder could reach anyone.
    #[must_use]
    pub fn is_guest(&self) -> bool {
        self.cart.user_id.is_none()
    }

    /// Flip the first-reminder flag. Returns `false` when it was already set
    /// or the cart converted in the meantime.
    pub(crate) fn flag_first_reminder(&mut self, at: Timestamp) -> bool {
        if self.converted || self.abandonment_notified {
            return false;
        }

        self.abandonment_notified = true;
        self.abandonment_notified_at = Some(at);

        true
    }

    /// Flip the second-reminder flag. Requires the first reminder.
    pub(crate) fn flag_second_reminder(&mut self, at: Timestamp) -> bool {
        if self.converted || !self.abandonment_notified || self.second_reminder_sent {
            return false;
        }

        self.second_reminder_sent = true;
        self.second_reminder_sent_at = Some(at);

        true
    }

    /// Clear both reminder flags. Returns `false` when nothing was set.
    pub(crate) fn clear_reminders(&mut self) -> bool {
        let had_flags = self.abandonment_notified || self.second_reminder_sent;

        self.abandonment_notified = false;
        self.abandonment_notified_at = None;
        self.second_reminder_sent = false;
        self.second_reminder_sent_at = None;

        had_flags
    }

    pub(crate) fn flag_converted(&mut self, at: Timestamp) -> bool {
        if self.converted {
            return false;
        }

        self.converted = true;
        self.converted_at = Some(at);

        true
    }
}

/// Raw abandonment figures for one tenant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AbandonmentTotals {
    pub abandoned_carts: u64,
    /// Sum of abandoned cart totals in minor units.
    pub total_value: u64,
    /// Abandoned carts that have had at least the first reminder.
    pub notified_carts: u64,
}

#[cfg(test)]
mod tests {
    use jiff::SignedDuration;
    use testresult::TestResult;

    use crate::{
        domain::{carts::models::CartSummary, tenants::TenantId},
        ids::SessionId,
    };

    use super::*;

    fn record() -> Result<PersistedCart, crate::ids::BlankIdError> {
        Ok(PersistedCart::new(Cart::new(
            TenantId::parse("acme")?,
            SessionId::parse("s1")?,
            CartSummary::empty("USD"),
            Timestamp::UNIX_EPOCH,
            SignedDuration::from_hours(168),
        )))
    }

    #[test]
    fn second_reminder_requires_first() -> TestResult {
        let mut record = record()?;
        let at = Timestamp::UNIX_EPOCH;

        assert!(!record.flag_second_reminder(at));
        assert!(record.flag_first_reminder(at));
        assert!(!record.flag_first_reminder(at), "first flag is idempotent");
        assert!(record.flag_second_reminder(at));
        assert!(!record.flag_second_reminder(at), "second flag is idempotent");

        Ok(())
    }

    #[test]
    fn converted_carts_are_never_flagged() -> TestResult {
        let mut record = record()?;
        let at = Timestamp::UNIX_EPOCH;

        assert!(record.flag_converted(at));
        assert!(!record.flag_first_reminder(at));
        assert!(!record.abandonment_notified);

        Ok(())
    }

    #[test]
    fn clearing_reminders_resets_timestamps() -> TestResult {
        let mut record = record()?;
        let at = Timestamp::UNIX_EPOCH;

        record.flag_first_reminder(at);
        record.flag_second_reminder(at);

        assert!(record.clear_reminders());
        assert!(!record.clear_reminders());
        assert_eq!(record.abandonment_notified_at, None);
        assert_eq!(record.second_reminder_sent_at, None);

        Ok(())
    }
}
