//! Configuration loading and layering.
//!
//! Handles `.patchwise.toml` loading, environment variable resolution,
//! and CLI flag merging with proper priority ordering.

pub mod loader;

pub use loader::{AgentConfig, Config, ConfigError, ProviderConfig, ReviewConfig};
