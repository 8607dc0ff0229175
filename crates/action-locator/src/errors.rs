//! Error types for the selector healing cascade

use action_primitives::ActionError;
use thiserror::Error;

/// Locator error enumeration
///
/// Healing failures are not errors: they come back as
/// [`HealOutcome::Exhausted`](crate::HealOutcome) or
/// [`HealOutcome::Rejected`](crate::HealOutcome). These variants cover
/// requests the cascade cannot evaluate at all.
#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// Auto-heal threshold outside [0, 1]
    #[error("Invalid auto-heal threshold: {0}")]
    InvalidThreshold(f64),

    /// Page driver failed outside of a candidate attempt
    #[error("Driver error: {0}")]
    Driver(#[from] ActionError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LocatorError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, LocatorError::Driver(err) if err.is_element_missing())
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            LocatorError::Internal(_) => 3,
            LocatorError::Driver(_) => 2,
            LocatorError::InvalidThreshold(_) => 1,
        }
    }
}
