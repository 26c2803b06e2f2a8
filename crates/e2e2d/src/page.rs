//! The page-automation boundary
//!
//! Everything that touches the browser goes through [`Page`]. Every method is
//! a suspension point and may fail with a [`PageError`]; callers annotate and
//! re-raise, they never swallow.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::PageResult;

/// A non-null result of [`Page::query_selector`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub selector: String,
}

impl ElementHandle {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
        }
    }
}

#[async_trait]
pub trait Page: Send + Sync {
    async fn navigate(&self, url: &str) -> PageResult<()>;

    async fn click(&self, selector: &str) -> PageResult<()>;

    async fn fill(&self, selector: &str, value: &str) -> PageResult<()>;

    /// `Ok(None)` when nothing matches; `Err` for a malformed selector.
    async fn query_selector(&self, selector: &str) -> PageResult<Option<ElementHandle>>;

    async fn screenshot(&self, path: &Path) -> PageResult<()>;

    async fn evaluate(&self, script: &str) -> PageResult<Value>;

    /// Resolves once the page has navigated and gone network-idle.
    async fn wait_for_navigation(&self, timeout: Duration) -> PageResult<()>;

    async fn inner_text(&self, element: &ElementHandle) -> PageResult<String> {
        let selector = serde_json::to_string(&element.selector)?;
        let value = self
            .evaluate(&format!(
                "document.querySelector({})?.innerText ?? ''",
                selector
            ))
            .await?;
        Ok(match value {
            Value::String(text) => text,
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }

    /// Release the browser. Safe to call more than once.
    async fn close(&self) -> PageResult<()>;
}

const HIGHLIGHT_ATTR: &str = "data-e2e2d-highlight";

/// Outline the first element matching `selector`.
pub fn highlight_script(selector: &str) -> String {
    let quoted = serde_json::to_string(selector).unwrap_or_else(|_| "''".to_string());
    format!(
        "(() => {{ const el = document.querySelector({sel}); \
         if (el) {{ el.setAttribute('{attr}', el.style.outline || ''); \
         el.style.outline = '3px solid #e11d48'; }} }})()",
        sel = quoted,
        attr = HIGHLIGHT_ATTR,
    )
}

/// Remove every outline added by [`highlight_script`].
pub fn dehighlight_script() -> String {
    format!(
        "document.querySelectorAll('[{attr}]').forEach((el) => {{ \
         el.style.outline = el.getAttribute('{attr}'); el.removeAttribute('{attr}'); }})",
        attr = HIGHLIGHT_ATTR,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highlight_script_quotes_selector() {
        let script = highlight_script("input[name='user']");
        assert!(script.contains(r#"document.querySelector("input[name='user']")"#));
        assert!(script.contains(HIGHLIGHT_ATTR));
    }

    #[test]
    fn test_dehighlight_script_targets_marker() {
        assert!(dehighlight_script().contains("[data-e2e2d-highlight]"));
    }
}
