//! Infrastructure layer for Runbook.
//!
//! Contains implementations of the ports defined in `runbook-core`: the
//! JSON-file workflow store and the built-in action set, plus `config.toml`
//! loading and data directory resolution.

pub mod actions;
pub mod config;
pub mod store;
