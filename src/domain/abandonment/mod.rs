//! Abandoned-cart reminders.

pub mod models;
pub mod scheduler;

pub use models::{
    AbandonmentStage, AbandonmentState, AbandonmentStats, StageReport, SweepReport, classify,
};
pub use scheduler::{AbandonmentError, AbandonmentScheduler};
