//! Core types, configuration, and local session persistence for auth-bridge.
//!
//! Key modules:
//! - [`types`] — identity records and the normalized auth result
//! - [`config`] — TOML configuration with validation
//! - [`session_cache`] — durable local cache of the signed-in session

pub mod config;
pub mod session_cache;
pub mod types;
