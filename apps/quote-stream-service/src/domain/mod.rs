//! Domain Layer - Core quote types and in-memory state.
//!
//! This layer holds the symbol, event and snapshot types together with the
//! two pieces of shared state the stream task and callers interleave on. It
//! performs no I/O.

/// Symbols, ticker events and quote snapshots.
pub mod quote;

/// The set of symbols that should be streamed.
pub mod subscription;

/// Latest snapshot per symbol.
pub mod cache;

/// Connection lifecycle states and status reporting.
pub mod connection;

/// Pulled price history and symbol metadata.
pub mod history;
