//! Page and browser interfaces for the healrun orchestration core
//!
//! This crate describes the collaborators the orchestration core consumes:
//! - `PageDriver` / `BrowserHandle` / `BrowserLauncher` for browser automation
//! - `VisualMatcher` for fingerprint-based element lookup
//! - `ActionError` with the "element missing" class the healing cascade keys on
//! - a scripted in-memory driver for tests and dry runs

pub mod errors;
pub mod page;
pub mod scripted;
pub mod types;
pub mod visual;

pub use errors::*;
pub use page::*;
pub use types::*;
pub use visual::*;
