//! Business logic and port trait definitions for Runbook.
//!
//! This crate defines the "ports" (action executor and repository traits)
//! that the infrastructure layer implements, plus the workflow engine that
//! drives them. It depends only on `runbook-types` -- never on
//! `runbook-infra` or any filesystem crate.

pub mod action;
pub mod event;
pub mod repository;
pub mod workflow;
