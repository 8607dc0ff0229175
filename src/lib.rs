//! Healrun CLI library
//!
//! Exposes configuration, suite loading and application wiring for the
//! `healrun` binary and for integration testing.

pub mod app;
pub mod cli;
pub mod config;
pub mod errors;
pub mod suite;

pub use app::{HealrunApp, ReviewPolicy};
pub use config::Config;
pub use errors::ConfigError;
pub use suite::Suite;
