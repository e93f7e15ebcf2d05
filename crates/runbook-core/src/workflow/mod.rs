//! Workflow engine core: definitions, graph traversal, conditions and retries.
//!
//! - `definition` -- builders, validation, JSON record conversion
//! - `graph` -- step arena with id and name lookup tables
//! - `context` -- run-time variable map shared by substitution and conditions
//! - `substitute` -- `$variable` resolution for step parameters
//! - `expression` -- closed-grammar condition evaluator
//! - `retry` -- stateless retry/fallback policy and cancellable backoff
//! - `executor` -- the sequential run loop

pub mod context;
pub mod definition;
pub mod executor;
pub mod expression;
pub mod graph;
pub mod retry;
pub mod substitute;
