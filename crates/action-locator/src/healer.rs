//! Self-healer seam consumed by the step executor

use action_primitives::PageDriver;
use async_trait::async_trait;

use crate::errors::LocatorError;
use crate::types::{HealOutcome, HealRequest};

/// Self-healer trait
///
/// Called once per failure event. Implementations replay the failing
/// interaction on `page` with substitute selectors and report what happened.
#[async_trait]
pub trait SelfHealer: Send + Sync {
    /// Attempt to heal a failed element interaction
    async fn heal(
        &self,
        page: &dyn PageDriver,
        request: HealRequest,
    ) -> Result<HealOutcome, LocatorError>;
}
