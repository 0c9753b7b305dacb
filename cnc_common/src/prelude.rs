//! Prelude module for common re-exports.
//!
//! ```rust
//! use cnc_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    ConfigError, ConfigLoader, EndpointConfig, ServerConfig, SharedConfig, TimingConfig,
};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{DEFAULT_ENDPOINT, DEFAULT_NAMESPACE_URI, MIN_SAMPLE_DT_S};
