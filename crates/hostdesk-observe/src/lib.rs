//! Observability setup for hostdesk.

pub mod tracing_setup;
