//! Deferred-task worker for the tournament engine.
//!
//! Hosts the durable scheduler loop that fires countdown credential
//! releases. Configuration, logging and metrics live here so the binary
//! stays a thin entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod worker;

pub use config::{ConfigError, ServerConfig};
pub use worker::Worker;
