//! Logging setup for auth-bridge services and tests.

pub mod logging;

pub use logging::{init_logging, init_logging_json};
