//! Scripted in-memory driver
//!
//! Deterministic stand-in for a real browser: a fixed set of present
//! selectors, a visible-text map and a call log. Used by the test suites and
//! by the CLI dry-run mode.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use healrun_core_types::BrowserType;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ActionError;
use crate::page::{BrowserHandle, BrowserLauncher, PageDriver};
use crate::types::{
    ArtifactRef, InteractOptions, NavigateOptions, Point, ScreenshotOptions, VisualFingerprint,
    VisualMatch,
};
use crate::visual::VisualMatcher;

/// Serializable description of what the scripted page contains.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PageFixture {
    #[serde(default)]
    pub url: String,
    /// Selectors that resolve to an interactable element
    #[serde(default)]
    pub elements: BTreeSet<String>,
    /// Visible text per selector
    #[serde(default)]
    pub texts: BTreeMap<String, String>,
    /// Visual matcher answers keyed by fingerprint signature
    #[serde(default)]
    pub visual_matches: BTreeMap<String, VisualMatch>,
    /// Artificial latency applied to every page call, in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
}

/// One recorded driver call
#[derive(Clone, Debug, PartialEq)]
pub enum PageCall {
    Navigate(String),
    Click(String),
    Fill(String, String),
    ClickAt(Point),
    TypeText(String),
    WaitFor(String),
    Screenshot,
    Finalize,
}

#[derive(Default)]
struct PageState {
    url: String,
    elements: BTreeSet<String>,
    texts: BTreeMap<String, String>,
    calls: Vec<PageCall>,
}

pub struct ScriptedPage {
    state: Mutex<PageState>,
    latency: Duration,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::from_fixture(&PageFixture::default())
    }

    pub fn from_fixture(fixture: &PageFixture) -> Self {
        let texts = fixture.texts.clone();
        let mut elements = fixture.elements.clone();
        elements.extend(texts.keys().cloned());
        Self {
            state: Mutex::new(PageState {
                url: fixture.url.clone(),
                elements,
                texts,
                calls: Vec::new(),
            }),
            latency: Duration::from_millis(fixture.latency_ms),
        }
    }

    pub fn with_element(self, selector: impl Into<String>) -> Self {
        self.state.lock().elements.insert(selector.into());
        self
    }

    pub fn with_text(self, selector: impl Into<String>, text: impl Into<String>) -> Self {
        let selector = selector.into();
        {
            let mut state = self.state.lock();
            state.elements.insert(selector.clone());
            state.texts.insert(selector, text.into());
        }
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn remove_element(&self, selector: &str) {
        let mut state = self.state.lock();
        state.elements.remove(selector);
        state.texts.remove(selector);
    }

    pub fn calls(&self) -> Vec<PageCall> {
        self.state.lock().calls.clone()
    }

    /// Selectors that received a click or fill, in call order
    pub fn interacted_selectors(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                PageCall::Click(selector) | PageCall::Fill(selector, _) => Some(selector.clone()),
                _ => None,
            })
            .collect()
    }

    async fn pace(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn interact(&self, selector: &str, call: PageCall) -> Result<(), ActionError> {
        let mut state = self.state.lock();
        if !state.elements.contains(selector) {
            debug!(target: "scripted", selector, "selector not present");
            return Err(ActionError::ElementNotFound(selector.to_string()));
        }
        state.calls.push(call);
        Ok(())
    }
}

impl Default for ScriptedPage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageDriver for ScriptedPage {
    async fn navigate(&self, url: &str, _opts: &NavigateOptions) -> Result<(), ActionError> {
        self.pace().await;
        let mut state = self.state.lock();
        state.url = url.to_string();
        state.calls.push(PageCall::Navigate(url.to_string()));
        Ok(())
    }

    async fn click(&self, selector: &str, _opts: &InteractOptions) -> Result<(), ActionError> {
        self.pace().await;
        self.interact(selector, PageCall::Click(selector.to_string()))
    }

    async fn fill(
        &self,
        selector: &str,
        value: &str,
        _opts: &InteractOptions,
    ) -> Result<(), ActionError> {
        self.pace().await;
        self.interact(
            selector,
            PageCall::Fill(selector.to_string(), value.to_string()),
        )?;
        self.state
            .lock()
            .texts
            .insert(selector.to_string(), value.to_string());
        Ok(())
    }

    async fn click_at(&self, point: Point) -> Result<(), ActionError> {
        self.pace().await;
        self.state.lock().calls.push(PageCall::ClickAt(point));
        Ok(())
    }

    async fn type_text(&self, value: &str) -> Result<(), ActionError> {
        self.pace().await;
        self.state
            .lock()
            .calls
            .push(PageCall::TypeText(value.to_string()));
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        opts: &InteractOptions,
    ) -> Result<(), ActionError> {
        self.pace().await;
        let mut state = self.state.lock();
        if !state.elements.contains(selector) {
            return Err(ActionError::WaitTimeout(format!(
                "{selector} not visible after {}ms",
                opts.timeout.as_millis()
            )));
        }
        state.calls.push(PageCall::WaitFor(selector.to_string()));
        Ok(())
    }

    async fn is_visible(
        &self,
        selector: &str,
        _opts: &InteractOptions,
    ) -> Result<bool, ActionError> {
        self.pace().await;
        Ok(self.state.lock().elements.contains(selector))
    }

    async fn text_content(
        &self,
        selector: &str,
        _opts: &InteractOptions,
    ) -> Result<Option<String>, ActionError> {
        self.pace().await;
        let state = self.state.lock();
        if !state.elements.contains(selector) {
            return Err(ActionError::ElementNotFound(selector.to_string()));
        }
        Ok(state.texts.get(selector).cloned())
    }

    async fn current_url(&self) -> Result<String, ActionError> {
        Ok(self.state.lock().url.clone())
    }

    async fn screenshot(&self, _opts: &ScreenshotOptions) -> Result<Vec<u8>, ActionError> {
        self.pace().await;
        let mut state = self.state.lock();
        state.calls.push(PageCall::Screenshot);
        // Deterministic bytes derived from the page state stand in for pixels.
        let mut bytes = state.url.as_bytes().to_vec();
        for selector in &state.elements {
            bytes.extend_from_slice(selector.as_bytes());
        }
        Ok(bytes)
    }

    async fn finalize_artifacts(&self) -> Result<Vec<ArtifactRef>, ActionError> {
        self.state.lock().calls.push(PageCall::Finalize);
        Ok(vec![ArtifactRef {
            kind: "trace".to_string(),
            location: "memory://trace".to_string(),
        }])
    }
}

/// Visual matcher answering from a signature table.
#[derive(Default)]
pub struct ScriptedVisualMatcher {
    answers: BTreeMap<String, VisualMatch>,
    calls: AtomicUsize,
}

impl ScriptedVisualMatcher {
    pub fn new(answers: BTreeMap<String, VisualMatch>) -> Self {
        Self {
            answers,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_match(mut self, signature: impl Into<String>, answer: VisualMatch) -> Self {
        self.answers.insert(signature.into(), answer);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisualMatcher for ScriptedVisualMatcher {
    async fn find_by_fingerprint(
        &self,
        _page: &dyn PageDriver,
        fingerprint: &VisualFingerprint,
    ) -> Result<VisualMatch, ActionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .answers
            .get(&fingerprint.signature)
            .cloned()
            .unwrap_or_else(VisualMatch::not_found))
    }
}

/// Browser that hands out pages built from one fixture.
pub struct ScriptedBrowser {
    browser: BrowserType,
    fixture: PageFixture,
    pages: Mutex<Vec<Arc<ScriptedPage>>>,
    close_calls: AtomicUsize,
    crashed: bool,
}

impl ScriptedBrowser {
    pub fn new(browser: BrowserType, fixture: PageFixture) -> Self {
        Self {
            browser,
            fixture,
            pages: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
            crashed: false,
        }
    }

    /// Browser whose close always reports that it is already gone
    pub fn crashed(mut self) -> Self {
        self.crashed = true;
        self
    }

    pub fn pages(&self) -> Vec<Arc<ScriptedPage>> {
        self.pages.lock().clone()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserHandle for ScriptedBrowser {
    fn browser_type(&self) -> BrowserType {
        self.browser
    }

    async fn new_page(&self) -> Result<Arc<dyn PageDriver>, ActionError> {
        if self.close_calls() > 0 {
            return Err(ActionError::BrowserClosed("browser already closed".into()));
        }
        let page = Arc::new(ScriptedPage::from_fixture(&self.fixture));
        self.pages.lock().push(Arc::clone(&page));
        Ok(page)
    }

    async fn close(&self) -> Result<(), ActionError> {
        let previous = self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.crashed || previous > 0 {
            return Err(ActionError::BrowserClosed(
                "target page, context or browser has been closed".into(),
            ));
        }
        Ok(())
    }
}

/// Launcher producing [`ScriptedBrowser`]s; keeps every browser it launched.
pub struct ScriptedLauncher {
    fixture: PageFixture,
    launched: Mutex<Vec<Arc<ScriptedBrowser>>>,
}

impl ScriptedLauncher {
    pub fn new(fixture: PageFixture) -> Self {
        Self {
            fixture,
            launched: Mutex::new(Vec::new()),
        }
    }

    pub fn launched(&self) -> Vec<Arc<ScriptedBrowser>> {
        self.launched.lock().clone()
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedLauncher {
    async fn launch(&self, browser: BrowserType) -> Result<Arc<dyn BrowserHandle>, ActionError> {
        let handle = Arc::new(ScriptedBrowser::new(browser, self.fixture.clone()));
        self.launched.lock().push(Arc::clone(&handle));
        Ok(handle)
    }
}
