//! Observability infrastructure.
//!
//! Provides:
//! - Structured tracing with an environment-driven filter
//! - Quiet tracing setup for tests

pub mod tracing;
