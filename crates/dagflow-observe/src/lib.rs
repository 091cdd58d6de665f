//! Observability setup for dagflow binaries.

pub mod tracing_setup;
