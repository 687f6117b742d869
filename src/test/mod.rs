//! Shared fixtures for in-crate tests.

mod context;

pub(crate) use context::{START, TestContext};
pub(crate) use db::TestDb;
