//! Lattice Carts
//!
//! Tenant-isolated shopping cart lifecycle: a TTL-bounded ephemeral tier for
//! live carts, a durable mirror for recovery and reporting, and a scheduler
//! that sends two-stage reminders for abandoned signed-in carts.

pub mod clock;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod database;
pub mod domain;
pub mod ids;
pub mod observability;
pub mod shutdown;
pub mod uuids;

#[cfg(test)]
mod test;
