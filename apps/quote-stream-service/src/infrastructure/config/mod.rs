//! Configuration Module
//!
//! Configuration loading for the quote stream service.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_FALLBACK_URL, DEFAULT_STREAM_URL, FallbackSettings, ServerSettings,
    ServiceConfig, StreamSettings,
};
