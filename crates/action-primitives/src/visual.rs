use async_trait::async_trait;

use crate::errors::ActionError;
use crate::page::PageDriver;
use crate::types::{VisualFingerprint, VisualMatch};

/// Black-box visual locator: finds the region on the live page that best
/// matches a stored fingerprint.
#[async_trait]
pub trait VisualMatcher: Send + Sync {
    async fn find_by_fingerprint(
        &self,
        page: &dyn PageDriver,
        fingerprint: &VisualFingerprint,
    ) -> Result<VisualMatch, ActionError>;
}

/// Matcher used when no visual backend is configured; never finds anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledVisualMatcher;

#[async_trait]
impl VisualMatcher for DisabledVisualMatcher {
    async fn find_by_fingerprint(
        &self,
        _page: &dyn PageDriver,
        _fingerprint: &VisualFingerprint,
    ) -> Result<VisualMatch, ActionError> {
        Ok(VisualMatch::not_found())
    }
}
