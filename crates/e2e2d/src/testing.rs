//! In-memory page double for exercising chains without a browser

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;

use crate::error::{PageError, PageResult};
use crate::page::{ElementHandle, Page};

/// A call made against a [`FakePage`], in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCall {
    Navigate(String),
    Click(String),
    Fill(String, String),
    Query(String),
    Screenshot(PathBuf),
    Evaluate(String),
    WaitForNavigation,
    Close,
}

#[derive(Default)]
struct FakeState {
    url: Option<String>,
    /// selector -> rendered text
    elements: HashMap<String, String>,
    /// selector -> text shown after any fill
    renders: HashMap<String, String>,
    /// "op selector" -> error message
    failures: HashMap<String, String>,
    navigating: HashSet<String>,
    calls: Vec<PageCall>,
}

/// Scriptable [`Page`]: elements exist once registered or filled, `fill`
/// renders the value (or a configured override), and clicks on selectors
/// marked navigating release pending `wait_for_navigation` calls.
#[derive(Default)]
pub struct FakePage {
    state: Mutex<FakeState>,
    navigated: Notify,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_element(self, selector: &str, text: &str) -> Self {
        self.state
            .lock()
            .elements
            .insert(selector.to_string(), text.to_string());
        self
    }

    /// Whatever is filled into `selector`, the page shows `text`.
    pub fn render_fill_as(self, selector: &str, text: &str) -> Self {
        self.state
            .lock()
            .renders
            .insert(selector.to_string(), text.to_string());
        self
    }

    /// Make `op` ("navigate", "click", "fill", "query", "screenshot", "evaluate")
    /// fail for `target` (selector, url or screenshot file name).
    pub fn fail_on(self, op: &str, target: &str, message: &str) -> Self {
        self.state
            .lock()
            .failures
            .insert(format!("{} {}", op, target), message.to_string());
        self
    }

    pub fn navigating_click(self, selector: &str) -> Self {
        self.state.lock().navigating.insert(selector.to_string());
        self
    }

    pub fn calls(&self) -> Vec<PageCall> {
        self.state.lock().calls.clone()
    }

    pub fn url(&self) -> Option<String> {
        self.state.lock().url.clone()
    }

    pub fn text_of(&self, selector: &str) -> Option<String> {
        self.state.lock().elements.get(selector).cloned()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PageCall::Screenshot(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == PageCall::Close)
            .count()
    }

    fn record(&self, call: PageCall, op: &str, target: &str) -> PageResult<()> {
        let mut state = self.state.lock();
        state.calls.push(call);
        match state.failures.get(&format!("{} {}", op, target)) {
            Some(message) => Err(PageError::Playwright(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Page for FakePage {
    async fn navigate(&self, url: &str) -> PageResult<()> {
        self.record(PageCall::Navigate(url.to_string()), "navigate", url)?;
        self.state.lock().url = Some(url.to_string());
        Ok(())
    }

    async fn click(&self, selector: &str) -> PageResult<()> {
        self.record(PageCall::Click(selector.to_string()), "click", selector)?;
        if self.state.lock().navigating.contains(selector) {
            self.navigated.notify_one();
        }
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> PageResult<()> {
        self.record(
            PageCall::Fill(selector.to_string(), value.to_string()),
            "fill",
            selector,
        )?;
        let mut state = self.state.lock();
        let shown = state
            .renders
            .get(selector)
            .cloned()
            .unwrap_or_else(|| value.to_string());
        state.elements.insert(selector.to_string(), shown);
        Ok(())
    }

    async fn query_selector(&self, selector: &str) -> PageResult<Option<ElementHandle>> {
        self.record(PageCall::Query(selector.to_string()), "query", selector)?;
        let found = self.state.lock().elements.contains_key(selector);
        Ok(found.then(|| ElementHandle::new(selector)))
    }

    async fn screenshot(&self, path: &Path) -> PageResult<()> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.record(PageCall::Screenshot(path.to_path_buf()), "screenshot", &name)
    }

    async fn evaluate(&self, script: &str) -> PageResult<Value> {
        self.record(PageCall::Evaluate(script.to_string()), "evaluate", script)?;
        Ok(Value::Null)
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> PageResult<()> {
        self.record(PageCall::WaitForNavigation, "wait_for_navigation", "")?;
        tokio::time::timeout(timeout, self.navigated.notified())
            .await
            .map_err(|_| PageError::Timeout("navigation".to_string()))
    }

    async fn inner_text(&self, element: &ElementHandle) -> PageResult<String> {
        Ok(self.text_of(&element.selector).unwrap_or_default())
    }

    async fn close(&self) -> PageResult<()> {
        self.state.lock().calls.push(PageCall::Close);
        Ok(())
    }
}
