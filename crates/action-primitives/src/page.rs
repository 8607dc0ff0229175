//! Browser driver interfaces
//!
//! The orchestration core never talks to a browser directly. It consumes these
//! traits; concrete drivers (CDP, WebDriver, the scripted test double) live
//! behind them.

use std::sync::Arc;

use async_trait::async_trait;
use healrun_core_types::BrowserType;

use crate::errors::ActionError;
use crate::types::{
    ArtifactRef, InteractOptions, NavigateOptions, Point, ScreenshotOptions,
};

/// A single page (tab) the step stream drives.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str, opts: &NavigateOptions) -> Result<(), ActionError>;

    async fn click(&self, selector: &str, opts: &InteractOptions) -> Result<(), ActionError>;

    async fn fill(
        &self,
        selector: &str,
        value: &str,
        opts: &InteractOptions,
    ) -> Result<(), ActionError>;

    /// Click at viewport coordinates (visual-match fallback)
    async fn click_at(&self, point: Point) -> Result<(), ActionError>;

    /// Type into whatever currently holds focus
    async fn type_text(&self, value: &str) -> Result<(), ActionError>;

    async fn wait_for_selector(
        &self,
        selector: &str,
        opts: &InteractOptions,
    ) -> Result<(), ActionError>;

    async fn is_visible(&self, selector: &str, opts: &InteractOptions)
        -> Result<bool, ActionError>;

    async fn text_content(
        &self,
        selector: &str,
        opts: &InteractOptions,
    ) -> Result<Option<String>, ActionError>;

    async fn current_url(&self) -> Result<String, ActionError>;

    async fn screenshot(&self, opts: &ScreenshotOptions) -> Result<Vec<u8>, ActionError>;

    /// Stop tracing / video capture and report what was written
    async fn finalize_artifacts(&self) -> Result<Vec<ArtifactRef>, ActionError> {
        Ok(Vec::new())
    }
}

/// Long-lived browser session owned by the run controller for one run.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    fn browser_type(&self) -> BrowserType;

    async fn new_page(&self) -> Result<Arc<dyn PageDriver>, ActionError>;

    async fn close(&self) -> Result<(), ActionError>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, browser: BrowserType) -> Result<Arc<dyn BrowserHandle>, ActionError>;
}
