//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for the frame decoder, fallback provider and quote stream.
pub mod ports;

/// Application services for quote reads and subscription control.
pub mod services;
