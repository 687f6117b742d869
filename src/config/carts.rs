//! Cart Lifecycle Config

use std::time::Duration;

use clap::Args;
use jiff::SignedDuration;
use thiserror::Error;

/// Raised when lifecycle thresholds contradict each other.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("{name} must be greater than zero")]
    NotPositive { name: &'static str },

    #[error("reminder thresholds must increase: abandoned {abandoned}, first {first}, second {second}")]
    ThresholdsOutOfOrder {
        abandoned: SignedDuration,
        first: SignedDuration,
        second: SignedDuration,
    },
}

/// Cart lifecycle thresholds, fixed at startup.
#[derive(Debug, Args)]
pub struct CartsConfig {
    /// Hours an untouched cart stays in the ephemeral tier
    #[arg(long, env = "CART_TTL_HOURS", default_value_t = 168_i64)]
    pub cart_ttl_hours: i64,

    /// Idle minutes before a cart counts as abandoned
    #[arg(long, env = "ABANDONMENT_THRESHOLD_MINUTES", default_value_t = 60_i64)]
    pub abandonment_threshold_minutes: i64,

    /// Idle hours before the first reminder
    #[arg(long, env = "FIRST_REMINDER_HOURS", default_value_t = 24_i64)]
    pub first_reminder_hours: i64,

    /// Idle hours before the second reminder
    #[arg(long, env = "SECOND_REMINDER_HOURS", default_value_t = 72_i64)]
    pub second_reminder_hours: i64,

    /// Seconds between abandonment sweeps
    #[arg(long, env = "SWEEP_INTERVAL_SECONDS", default_value_t = 3_600_u64)]
    pub sweep_interval_seconds: u64,

    /// Maximum carts fetched per reminder stage per sweep
    #[arg(long, env = "SWEEP_BATCH_SIZE", default_value_t = 500_usize)]
    pub sweep_batch_size: usize,

    /// Days converted carts are kept before purging
    #[arg(long, env = "CONVERTED_RETENTION_DAYS", default_value_t = 30_i64)]
    pub converted_retention_days: i64,

    /// Timeout for catalog, directory and notification calls, in milliseconds
    #[arg(long, env = "COLLABORATOR_TIMEOUT_MS", default_value_t = 2_000_u64)]
    pub collaborator_timeout_ms: u64,
}

impl CartsConfig {
    /// Resolve and check the configured thresholds.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] when a value is not positive or the reminder
    /// thresholds do not increase.
    pub fn settings(&self) -> Result<CartSettings, SettingsError> {
        let settings = CartSettings {
            cart_ttl: SignedDuration::from_hours(self.cart_ttl_hours),
            abandonment_threshold: SignedDuration::from_mins(self.abandonment_threshold_minutes),
            first_reminder_after: SignedDuration::from_hours(self.first_reminder_hours),
            second_reminder_after: SignedDuration::from_hours(self.second_reminder_hours),
            sweep_interval: Duration::from_secs(self.sweep_interval_seconds),
            sweep_batch_size: self.sweep_batch_size,
            converted_retention: SignedDuration::from_hours(
                self.converted_retention_days.saturating_mul(24),
            ),
            collaborator_timeout: Duration::from_millis(self.collaborator_timeout_ms),
        };

        settings.validate()?;

        Ok(settings)
    }
}

/// Resolved cart lifecycle settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSettings {
    pub cart_ttl: SignedDuration,
    pub abandonment_threshold: SignedDuration,
    pub first_reminder_after: SignedDuration,
    pub second_reminder_after: SignedDuration,
    pub sweep_interval: Duration,
    pub sweep_batch_size: usize,
    pub converted_retention: SignedDuration,
    pub collaborator_timeout: Duration,
}

impl CartSettings {
    /// # Errors
    ///
    /// Returns [`SettingsError`] when a value is not positive or the reminder
    /// thresholds do not increase.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let positive = [
            ("cart ttl", self.cart_ttl.is_positive()),
            ("abandonment threshold", self.abandonment_threshold.is_positive()),
            ("sweep interval", !self.sweep_interval.is_zero()),
            ("sweep batch size", self.sweep_batch_size > 0),
            ("converted retention", self.converted_retention.is_positive()),
            ("collaborator timeout", !self.collaborator_timeout.is_zero()),
        ];

        if let Some((name, _)) = positive.into_iter().find(|(_, ok)| !ok) {
            return Err(SettingsError::NotPositive { name });
        }

        if self.abandonment_threshold > self.first_reminder_after
            || self.first_reminder_after >= self.second_reminder_after
        {
            return Err(SettingsError::ThresholdsOutOfOrder {
                abandoned: self.abandonment_threshold,
                first: self.first_reminder_after,
                second: self.second_reminder_after,
            });
        }

        Ok(())
    }
}

impl Default for CartSettings {
    fn default() -> Self {
        Self {
            cart_ttl: SignedDuration::from_hours(7 * 24),
            abandonment_threshold: SignedDuration::from_hours(1),
            first_reminder_after: SignedDuration::from_hours(24),
            second_reminder_after: SignedDuration::from_hours(72),
            sweep_interval: Duration::from_secs(60 * 60),
            sweep_batch_size: 500,
            converted_retention: SignedDuration::from_hours(30 * 24),
            collaborator_timeout: Duration::from_secs(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(CartSettings::default().validate(), Ok(()));
    }

    #[test]
    fn second_reminder_must_follow_first() {
        let settings = CartSettings {
            second_reminder_after: SignedDuration::from_hours(24),
            ..CartSettings::default()
        };

        assert!(matches!(
            settings.validate(),
            Err(SettingsError::ThresholdsOutOfOrder { .. })
        ));
    }

    #[test]
    fn zero_batch_is_rejected() {
        let settings = CartSettings {
            sweep_batch_size: 0,
            ..CartSettings::default()
        };

        assert_eq!(
            settings.validate(),
            Err(SettingsError::NotPositive {
                name: "sweep batch size"
            })
        );
    }
}
