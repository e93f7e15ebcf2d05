//! Shared domain types for Runbook.
//!
//! This crate contains the domain types used across the Runbook workspace:
//! workflow definitions, run results, run events, action outcomes, global
//! configuration and the storage error type.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod action;
pub mod config;
pub mod error;
pub mod event;
pub mod workflow;
