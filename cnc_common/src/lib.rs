//! CNC Common Library
//!
//! This crate provides shared constants and configuration loading utilities
//! for the CNC telemetry workspace crates.
//!
//! # Module Structure
//!
//! - [`consts`] - Node names, default endpoint and timing defaults
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```toml
//! [dependencies]
//! cnc_common = { path = "../cnc_common" }
//! ```
//!
//! ```rust
//! use cnc_common::config::{ConfigLoader, ServerConfig};
//! use cnc_common::consts::DEFAULT_ENDPOINT;
//! ```

pub mod config;
pub mod consts;
pub mod prelude;
