//! Abandonment Scheduler
//!
//! Periodically scans the durable tier for idle signed-in carts and sends the
//! two reminder stages. Each cart is handled inside its own tenant scope and
//! a failure on one cart is logged and counted, never propagated: the flag
//! stays unset and the next sweep retries it.

use std::{fmt::Debug, sync::Arc};

use jiff::Timestamp;
use thiserror::Error;
use tokio::{
    sync::watch,
    time::{MissedTickBehavior, interval},
};
use tracing::{Span, debug, error, info, warn};

use crate::{
    clock::Clock,
    collaborators::{
        CollaboratorError, NotificationDispatch, ReminderContext, UserDirectory, with_timeout,
    },
    config::CartSettings,
    domain::{
        abandonment::models::{AbandonmentStage, AbandonmentStats, StageReport, SweepReport},
        carts::{
            durable::CartDurableStore,
            errors::StoreError,
            models::Cart,
            pricing::format_amount,
            records::{AbandonmentTotals, PersistedCart},
        },
        tenants::{MissingTenantError, TenantContext},
    },
    ids::UserId,
};

/// Errors surfaced by the scheduler itself.
#[derive(Debug, Error)]
pub enum AbandonmentError {
    #[error(transparent)]
    MissingTenant(#[from] MissingTenantError),

    #[error("durable cart store error: {0}")]
    Store(#[from] StoreError),
}

/// Why a single reminder could not be delivered.
#[derive(Debug, Error)]
enum ReminderError {
    #[error(transparent)]
    MissingTenant(#[from] MissingTenantError),

    #[error("no contact on file for user {0}")]
    UnknownRecipient(UserId),

    #[error("user directory error: {0}")]
    Directory(CollaboratorError),

    #[error("notification dispatch error: {0}")]
    Dispatch(CollaboratorError),

    #[error("durable cart store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReminderOutcome {
    Sent,
    SkippedGuest,
    AlreadyFlagged,
}

impl From<AbandonmentTotals> for AbandonmentStats {
    fn from(totals: AbandonmentTotals) -> Self {
        #[expect(clippy::cast_precision_loss, reason = "Reporting ratio")]
        let notified_ratio = if totals.abandoned_carts == 0 {
            0.0
        } else {
            totals.notified_carts as f64 / totals.abandoned_carts as f64
        };

        Self {
            abandoned_carts: totals.abandoned_carts,
            total_value: totals.total_value,
            notified_carts: totals.notified_carts,
            notified_ratio,
        }
    }
}

/// Reminder payload for `cart` at `stage`.
fn reminder_context(stage: AbandonmentStage, cart: &Cart, email: String) -> ReminderContext {
    ReminderContext {
        cart_id: cart.id,
        item_count: cart.items_quantity(),
        total: format_amount(cart.items_subtotal(), &cart.summary.currency),
        currency: cart.summary.currency.clone(),
        reminder_stage: stage.number(),
        email,
    }
}

/// Sends abandoned-cart reminders.
pub struct AbandonmentScheduler {
    durable: Arc<dyn CartDurableStore>,
    directory: Arc<dyn UserDirectory>,
    notifications: Arc<dyn NotificationDispatch>,
    clock: Arc<dyn Clock>,
    settings: CartSettings,
}

impl Debug for AbandonmentScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbandonmentScheduler")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl AbandonmentScheduler {
    #[must_use]
    pub fn new(
        durable: Arc<dyn CartDurableStore>,
        directory: Arc<dyn UserDirectory>,
        notifications: Arc<dyn NotificationDispatch>,
        clock: Arc<dyn Clock>,
        settings: CartSettings,
    ) -> Self {
        Self {
            durable,
            directory,
            notifications,
            clock,
            settings,
        }
    }

    /// Run one sweep: both reminder stages, then the retention purge.
    ///
    /// Candidates for both stages are fetched before anything is sent, so a
    /// cart never receives both reminders in the same sweep.
    ///
    /// # Errors
    ///
    /// Returns [`AbandonmentError::Store`] when a candidate query fails.
    /// Failures on individual carts are counted in the report instead.
    #[tracing::instrument(
        name = "abandonment.sweep",
        skip(self),
        fields(first_sent = tracing::field::Empty, second_sent = tracing::field::Empty),
        err
    )]
    pub async fn sweep(&self) -> Result<SweepReport, AbandonmentError> {
        let now = self.clock.now();
        let limit = self.settings.sweep_batch_size;

        let cutoff = |stage: AbandonmentStage| now - stage.idle_after(&self.settings);

        let first = self
            .durable
            .first_reminder_candidates(cutoff(AbandonmentStage::First), limit)
            .await?;
        let second = self
            .durable
            .second_reminder_candidates(cutoff(AbandonmentStage::Second), limit)
            .await?;

        let report = SweepReport {
            first: self.run_stage(AbandonmentStage::First, &first, now).await,
            second: self.run_stage(AbandonmentStage::Second, &second, now).await,
            purged: self.purge(now).await,
        };

        Span::current().record("first_sent", report.first.sent);
        Span::current().record("second_sent", report.second.sent);

        info!(
            first_matched = report.first.matched,
            first_sent = report.first.sent,
            first_failed = report.first.failed,
            second_matched = report.second.matched,
            second_sent = report.second.sent,
            second_failed = report.second.failed,
            purged = report.purged,
            "abandonment sweep finished"
        );

        Ok(report)
    }

    /// Abandonment figures for the context's tenant.
    ///
    /// # Errors
    ///
    /// Returns [`AbandonmentError::MissingTenant`] without a tenant, or a
    /// store error.
    #[tracing::instrument(
        name = "abandonment.stats",
        skip(self, ctx),
        fields(tenant_id = tracing::field::Empty),
        err
    )]
    pub async fn stats(&self, ctx: &TenantContext) -> Result<AbandonmentStats, AbandonmentError> {
        let tenant = ctx.tenant_id()?;
        Span::current().record("tenant_id", tenant.as_str());

        let cutoff = self.clock.now() - self.settings.abandonment_threshold;
        let totals = self.durable.abandonment_stats(tenant, cutoff).await?;

        Ok(AbandonmentStats::from(totals))
    }

    /// Sweep on a fixed interval until `shutdown` flips to `true` or its
    /// sender goes away. A sweep in progress always runs to completion.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.settings.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval = ?self.settings.sweep_interval, "abandonment scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = self.sweep().await {
                        error!(%error, "abandonment sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("abandonment scheduler stopped");
    }

    async fn run_stage(
        &self,
        stage: AbandonmentStage,
        candidates: &[PersistedCart],
        now: Timestamp,
    ) -> StageReport {
        let mut report = StageReport::default();

        for record in candidates {
            report.matched += 1;

            match self.remind(stage, record, now).await {
                Ok(ReminderOutcome::Sent) => report.sent += 1,
                Ok(ReminderOutcome::SkippedGuest) => report.skipped_guest += 1,
                Ok(ReminderOutcome::AlreadyFlagged) => report.already_flagged += 1,
                Err(error) => {
                    report.failed += 1;

                    error!(
                        tenant_id = %record.cart.tenant_id,
                        cart_id = %record.cart.id,
                        stage = stage.number(),
                        %error,
                        "failed to send abandonment reminder"
                    );
                }
            }
        }

        report
    }

    async fn remind(
        &self,
        stage: AbandonmentStage,
        record: &PersistedCart,
        now: Timestamp,
    ) -> Result<ReminderOutcome, ReminderError> {
        let Some(user) = record.cart.user_id.as_ref() else {
            return Ok(ReminderOutcome::SkippedGuest);
        };

        TenantContext::new(record.cart.tenant_id.clone())
            .scope(self.remind_in_scope(stage, &record.cart, user, now))
            .await?
    }

    #[tracing::instrument(
        name = "abandonment.remind",
        skip(self, cart, user, now),
        fields(tenant_id = %cart.tenant_id, cart_id = %cart.id, stage = stage.number())
    )]
    async fn remind_in_scope(
        &self,
        stage: AbandonmentStage,
        cart: &Cart,
        user: &UserId,
        now: Timestamp,
    ) -> Result<ReminderOutcome, ReminderError> {
        let ctx = TenantContext::current();
        let tenant = ctx.tenant_id()?;
        let limit = self.settings.collaborator_timeout;

        let contact = with_timeout(limit, self.directory.lookup(tenant, user))
            .await
            .map_err(ReminderError::Directory)?
            .ok_or_else(|| ReminderError::UnknownRecipient(user.clone()))?;

        let context = reminder_context(stage, cart, contact.email);

        let receipt = with_timeout(
            limit,
            self.notifications
                .send(user, stage.template_key(), tenant, &context),
        )
        .await
        .map_err(ReminderError::Dispatch)?;

        let flagged = match stage {
            AbandonmentStage::First => {
                self.durable
                    .mark_first_reminder_sent(tenant, &cart.id, now)
                    .await?
            }
            AbandonmentStage::Second => {
                self.durable
                    .mark_second_reminder_sent(tenant, &cart.id, now)
                    .await?
            }
        };

        if !flagged {
            warn!(receipt = %receipt.id, "reminder sent but cart was already flagged");
            return Ok(ReminderOutcome::AlreadyFlagged);
        }

        debug!(receipt = %receipt.id, "sent abandonment reminder");

        Ok(ReminderOutcome::Sent)
    }

    async fn purge(&self, now: Timestamp) -> u64 {
        match self
            .durable
            .purge_converted(now - self.settings.converted_retention)
            .await
        {
            Ok(purged) => purged,
            Err(error) => {
                error!(%error, "failed to purge converted carts");
                0
            }
        }
    }
}
