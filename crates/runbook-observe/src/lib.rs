//! Observability setup for Runbook: tracing subscriber initialisation with
//! optional OpenTelemetry span export.

pub mod tracing_setup;
