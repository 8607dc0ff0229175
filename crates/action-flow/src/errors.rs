//! Step definition error types

use thiserror::Error;

/// Errors raised while validating a test's steps before execution.
///
/// Failures during execution are never errors: they are recorded on the
/// step result and end the test with a failed status.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// Test has no steps
    #[error("Test {0} has no steps")]
    EmptyTest(String),

    /// A step is missing a required field
    #[error("Step {index} is invalid: {reason}")]
    InvalidStep { index: usize, reason: String },
}
