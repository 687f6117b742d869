//! Abandonment Models

use jiff::{SignedDuration, Timestamp};
use serde::Serialize;

use crate::{config::CartSettings, domain::carts::records::PersistedCart};

/// Which reminder a sweep pass sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbandonmentStage {
    First,
    Second,
}

impl AbandonmentStage {
    /// Notification template for this stage.
    #[must_use]
    pub fn template_key(self) -> &'static str {
        match self {
            Self::First => "cart.abandoned.first",
            Self::Second => "cart.abandoned.second",
        }
    }

    /// 1-based stage number sent with the reminder.
    #[must_use]
    pub fn number(self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
        }
    }

    /// Idle time after which this reminder is due.
    #[must_use]
    pub fn idle_after(self, settings: &CartSettings) -> SignedDuration {
        match self {
            Self::First => settings.first_reminder_after,
            Self::Second => settings.second_reminder_after,
        }
    }
}

/// Where a durable cart sits in the abandonment lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonmentState {
    /// Touched within the abandonment threshold.
    Active,
    AbandonedUnnotified,
    FirstReminderSent,
    SecondReminderSent,
    /// Checked out. Terminal.
    Converted,
}

/// Classify `record` as of `now`.
#[must_use]
pub fn classify(record: &PersistedCart, now: Timestamp, settings: &CartSettings) -> AbandonmentState {
    if record.converted {
        return AbandonmentState::Converted;
    }

    if now.duration_since(record.cart.updated_at) < settings.abandonment_threshold {
        return AbandonmentState::Active;
    }

    if record.second_reminder_sent {
        AbandonmentState::SecondReminderSent
    } else if record.abandonment_notified {
        AbandonmentState::FirstReminderSent
    } else {
        AbandonmentState::AbandonedUnnotified
    }
}

/// Abandonment figures for one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AbandonmentStats {
    pub abandoned_carts: u64,
    /// Sum of abandoned cart totals in minor units.
    pub total_value: u64,
    pub notified_carts: u64,
    /// `notified_carts / abandoned_carts`, or `0.0` with nothing abandoned.
    pub notified_ratio: f64,
}

/// Per-stage counters from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageReport {
    /// Carts returned by the candidate query.
    pub matched: u64,
    pub sent: u64,
    pub skipped_guest: u64,
    pub failed: u64,
    /// Dispatched, but another sweep flagged the cart first.
    pub already_flagged: u64,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub first: StageReport,
    pub second: StageReport,
    /// Converted carts removed by the retention purge.
    pub purged: u64,
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::{
        domain::{
            carts::models::{Cart, CartSummary},
            tenants::TenantId,
        },
        ids::SessionId,
    };

    use super::*;

    const HOUR: SignedDuration = SignedDuration::from_hours(1);

    fn record() -> TestResult<PersistedCart> {
        Ok(PersistedCart::new(Cart::new(
            TenantId::parse("acme")?,
            SessionId::parse("s1")?,
            CartSummary::empty("USD"),
            Timestamp::UNIX_EPOCH,
            HOUR * 168,
        )))
    }

    #[test]
    fn classification_follows_idle_time_and_flags() -> TestResult {
        let settings = CartSettings::default();
        let start = Timestamp::UNIX_EPOCH;
        let mut record = record()?;

        assert_eq!(
            classify(&record, start + HOUR / 2, &settings),
            AbandonmentState::Active
        );
        assert_eq!(
            classify(&record, start + HOUR, &settings),
            AbandonmentState::AbandonedUnnotified
        );

        record.abandonment_notified = true;
        assert_eq!(
            classify(&record, start + HOUR * 25, &settings),
            AbandonmentState::FirstReminderSent
        );

        record.second_reminder_sent = true;
        assert_eq!(
            classify(&record, start + HOUR * 100, &settings),
            AbandonmentState::SecondReminderSent
        );

        record.converted = true;
        assert_eq!(
            classify(&record, start + HOUR * 100, &settings),
            AbandonmentState::Converted
        );

        Ok(())
    }

    #[test]
    fn stages_map_to_templates() {
        assert_eq!(AbandonmentStage::First.template_key(), "cart.abandoned.first");
        assert_eq!(AbandonmentStage::Second.template_key(), "cart.abandoned.second");
        assert_eq!(AbandonmentStage::Second.number(), 2);
    }

    #[test]
    fn stages_are_due_after_their_idle_time() {
        let settings = CartSettings::default();

        assert_eq!(
            AbandonmentStage::First.idle_after(&settings),
            SignedDuration::from_hours(24)
        );
        assert_eq!(
            AbandonmentStage::Second.idle_after(&settings),
            SignedDuration::from_hours(72)
        );
    }
}
