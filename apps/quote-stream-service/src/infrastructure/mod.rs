//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Yahoo pricing stream adapter (decoder, lifecycle manager).
pub mod yahoo;

/// Pull-based fallback quote providers.
pub mod fallback;

/// HTTP API and health endpoints.
pub mod http;

/// Configuration loading.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing and OpenTelemetry integration.
pub mod telemetry;
