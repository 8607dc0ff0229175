//! Step execution for end-to-end tests
//!
//! This crate runs one test's ordered steps against a page, with cooperative
//! pause/cancel checks at every step boundary, fail-fast on the first failed
//! step and transparent selector healing for click/fill steps whose element
//! went missing.

pub mod errors;
pub mod executor;
pub mod types;

pub use errors::FlowError;
pub use executor::{ExecutionContext, ExecutorConfig, StepExecutor};
pub use types::*;
