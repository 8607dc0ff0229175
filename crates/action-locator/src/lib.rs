//! Selector healing for broken element selectors
//!
//! This crate implements the runtime healing cascade with:
//! - a static alias table mapping candidate tags onto canonical strategies
//! - confidence ranking of a step's precomputed alternative selectors
//! - per-project auto-heal thresholds and strategy allow-lists
//! - visual-match fallback with human approval for low-confidence matches
//! - telemetry and heal records written to the healing store

pub mod bridge;
pub mod errors;
pub mod healer;
pub mod policy;
pub mod ranker;
pub mod resolver;
pub mod strategies;
pub mod types;

pub use bridge::*;
pub use errors::*;
pub use healer::*;
pub use policy::*;
pub use ranker::*;
pub use resolver::*;
pub use strategies::*;
pub use types::*;
