//! The action library
//!
//! Every action takes a before screenshot, highlights its target where it
//! has one, delegates to the page, records a [`Step`], advances the step
//! counter and narrates. A delegated failure is narrated as
//! `You <action> <context> failed` and returned, never swallowed.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{E2e2dResult, PageError, PageResult};
use crate::narration::tick;
use crate::recording::{Step, StepKind};
use crate::runner::Action;
use crate::session::Session;
use crate::should::{self, ShouldOp};

impl Session {
    /// Documentation-only marker
    pub fn comment(&mut self, doc: &str) {
        self.add_step(Step::new(StepKind::Comment, "", doc));
        self.advance();
    }

    pub async fn nav_to(&mut self, url: &str, doc: &str) -> E2e2dResult<()> {
        debug!("navTo {}", url);
        let context = format!("'{}'", url);
        let mut step = Step::new(StepKind::NavTo, "", doc);

        let navigated = async {
            step.before_screenshot = self.take_screenshot("navTo", "before").await?;
            self.page().navigate(url).await
        }
        .await;
        if let Err(e) = navigated {
            return Err(self.handle_error(e, "navTo", &context));
        }

        let line = format!("{}You navigate to {}", tick(self.config().color), url);
        self.print_msg(line);
        self.add_step(step);
        self.advance();
        Ok(())
    }

    pub async fn fill(&mut self, selector: &str, value: &str, doc: &str) -> E2e2dResult<()> {
        debug!("insert '{}' into {}", value, selector);
        let context = format!("'{}' with '{}'", selector, value);
        let mut step = Step::new(StepKind::Insert, selector, doc).with_value(value);

        let filled = async {
            step.before_screenshot = self.take_screenshot("insert", "before").await?;
            self.highlight(selector, true).await?;
            step.after_highlight_screenshot = self.take_screenshot("insert", "highlight").await?;
            self.page().fill(selector, value).await?;
            step.after_screenshot = self.take_screenshot("insert", "after").await?;
            self.de_highlight(selector, true).await
        }
        .await;
        if let Err(e) = filled {
            return Err(self.handle_error(e, "insert", &context));
        }

        let line = format!(
            "{}You insert '{}' into {}",
            tick(self.config().color),
            value,
            selector
        );
        self.print_msg(line);
        self.add_step(step);
        self.advance();
        Ok(())
    }

    pub async fn left_click(
        &mut self,
        selector: &str,
        doc: &str,
        after_click_screenshot: bool,
    ) -> E2e2dResult<()> {
        self.click_impl(selector, doc, after_click_screenshot, false)
            .await
    }

    /// Click something that navigates: the click and the navigation are
    /// awaited together, bounded by `navigation_timeout_ms`.
    pub async fn left_click_nav(
        &mut self,
        selector: &str,
        doc: &str,
        after_click_screenshot: bool,
    ) -> E2e2dResult<()> {
        self.click_impl(selector, doc, after_click_screenshot, true)
            .await
    }

    async fn click_impl(
        &mut self,
        selector: &str,
        doc: &str,
        after_click_screenshot: bool,
        navigates: bool,
    ) -> E2e2dResult<()> {
        debug!("leftClick {} (navigates: {})", selector, navigates);
        let context = format!("on '{}'", selector);
        let mut step = Step::new(StepKind::LeftClick, selector, doc);

        let clicked = async {
            step.before_screenshot = self.take_screenshot("leftClick", "before").await?;
            self.highlight(selector, true).await?;
            step.after_highlight_screenshot =
                self.take_screenshot("leftClick", "highlight").await?;
            self.de_highlight(selector, true).await?;

            if navigates {
                self.click_and_wait_for_navigation(selector).await?;
            } else {
                self.page().click(selector).await?;
            }
            if after_click_screenshot {
                step.after_screenshot = self.take_screenshot("leftClick", "after").await?;
            }
            Ok::<_, PageError>(())
        }
        .await;
        if let Err(e) = clicked {
            return Err(self.handle_error(e, "leftClick", &context));
        }

        let line = format!("{}You left click {}", tick(self.config().color), selector);
        self.print_msg(line);
        self.add_step(step);
        self.advance();
        Ok(())
    }

    async fn click_and_wait_for_navigation(&self, selector: &str) -> PageResult<()> {
        let timeout = Duration::from_millis(self.config().navigation_timeout_ms);
        let page = self.page_handle();
        let joined = tokio::time::timeout(timeout, async {
            tokio::try_join!(page.wait_for_navigation(timeout), page.click(selector))
        })
        .await;

        match joined {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(PageError::Timeout(format!(
                "navigation after clicking '{}'",
                selector
            ))),
        }
    }

    /// Breadcrumb pointing at a precondition; runs nothing
    pub fn follow_steps_in(&mut self, name: &str) {
        self.add_step(Step::new(StepKind::FollowStepsIn, name, ""));
        self.advance();
    }
}

/// [`Session::comment`] as a chain entry
#[derive(Debug, Clone)]
pub struct Comment {
    pub doc: String,
}

#[async_trait]
impl Action for Comment {
    async fn run(&self, session: &mut Session) -> E2e2dResult<()> {
        let doc = session.interpolate(&self.doc);
        session.comment(&doc);
        Ok(())
    }
}

/// [`Session::nav_to`] as a chain entry
#[derive(Debug, Clone)]
pub struct NavTo {
    pub url: String,
    pub doc: String,
}

#[async_trait]
impl Action for NavTo {
    async fn run(&self, session: &mut Session) -> E2e2dResult<()> {
        let url = session.interpolate(&self.url);
        let doc = session.interpolate(&self.doc);
        session.nav_to(&url, &doc).await
    }
}

/// [`Session::fill`] as a chain entry
#[derive(Debug, Clone)]
pub struct Fill {
    pub selector: String,
    pub value: String,
    pub doc: String,
}

#[async_trait]
impl Action for Fill {
    async fn run(&self, session: &mut Session) -> E2e2dResult<()> {
        let selector = session.interpolate(&self.selector);
        let value = session.interpolate(&self.value);
        let doc = session.interpolate(&self.doc);
        session.fill(&selector, &value, &doc).await
    }
}

/// [`Session::left_click`] / [`Session::left_click_nav`] as a chain entry
#[derive(Debug, Clone)]
pub struct LeftClick {
    pub selector: String,
    pub doc: String,
    pub capture_after: bool,
    pub wait_for_navigation: bool,
}

#[async_trait]
impl Action for LeftClick {
    async fn run(&self, session: &mut Session) -> E2e2dResult<()> {
        let selector = session.interpolate(&self.selector);
        let doc = session.interpolate(&self.doc);
        if self.wait_for_navigation {
            session
                .left_click_nav(&selector, &doc, self.capture_after)
                .await
        } else {
            session
                .left_click(&selector, &doc, self.capture_after)
                .await
        }
    }
}

/// An assertion chain as a chain entry
#[derive(Debug, Clone)]
pub struct Assert {
    pub ops: Vec<ShouldOp>,
    pub screenshot: bool,
}

#[async_trait]
impl Action for Assert {
    async fn run(&self, session: &mut Session) -> E2e2dResult<()> {
        let ops = self
            .ops
            .iter()
            .map(|op| interpolate_op(session, op))
            .collect::<E2e2dResult<Vec<_>>>()?;
        session.run_should(ops, self.screenshot).await.map(|_| ())
    }
}

/// `${key}` in selectors, labels, string values and patterns
fn interpolate_op(session: &Session, op: &ShouldOp) -> E2e2dResult<ShouldOp> {
    Ok(match op {
        ShouldOp::See { selector, label } => ShouldOp::See {
            selector: session.interpolate(selector),
            label: session.interpolate(label),
        },
        ShouldOp::That(Value::String(s)) => ShouldOp::That(session.interpolate(s).into()),
        ShouldOp::Equals {
            expected: Value::String(s),
            transform,
        } => ShouldOp::Equals {
            expected: session.interpolate(s).into(),
            transform: transform.clone(),
        },
        ShouldOp::Matches { pattern, transform } => {
            should::matches(&session.interpolate(pattern), transform.clone())?
        }
        other => other.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    use crate::config::E2e2dConfig;
    use crate::error::{E2e2dError, ErrorKind};
    use crate::narration::MemoryNarration;
    use crate::testing::{FakePage, PageCall};

    fn session(page: FakePage, config: E2e2dConfig) -> (Session, Arc<FakePage>, MemoryNarration) {
        let page = Arc::new(page);
        let narration = MemoryNarration::new();
        let session = Session::new(
            "actions",
            "",
            Arc::new(E2e2dConfig {
                color: false,
                ..config
            }),
            page.clone(),
            Arc::new(narration.clone()),
        );
        (session, page, narration)
    }

    #[tokio::test]
    async fn test_fill_fills_every_screenshot_slot() {
        let (mut s, page, narration) = session(FakePage::new(), E2e2dConfig::default());
        s.fill("#name", "Ada", "type the name").await.unwrap();

        let step = &s.recording().steps()[0];
        assert_eq!(step.action, StepKind::Insert);
        assert_eq!(step.value.as_deref(), Some("Ada"));
        assert_eq!(step.before_screenshot, "0_insert_before.png");
        assert_eq!(step.after_highlight_screenshot, "0_insert_highlight.png");
        assert_eq!(step.after_screenshot, "0_insert_after.png");
        assert_eq!(s.counter(), 1);
        assert_eq!(page.text_of("#name").as_deref(), Some("Ada"));
        assert_eq!(narration.lines(), vec!["\t\t✓ You insert 'Ada' into #name"]);

        let calls = page.calls();
        let fill_at = calls
            .iter()
            .position(|c| *c == PageCall::Fill("#name".into(), "Ada".into()))
            .unwrap();
        assert!(matches!(calls[fill_at - 1], PageCall::Screenshot(_)));
        assert!(matches!(calls.last(), Some(PageCall::Evaluate(_))));
    }

    #[tokio::test]
    async fn test_nav_to_failure_is_annotated() {
        let (mut s, _, narration) = session(
            FakePage::new().fail_on("navigate", "https://down.test", "net::ERR_CONNECTION_REFUSED"),
            E2e2dConfig::default(),
        );
        let err = s.nav_to("https://down.test", "").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Delegated);
        assert!(matches!(err, E2e2dError::Delegated { ref context, .. } if context == "'https://down.test'"));
        assert_eq!(
            narration.lines(),
            vec![
                "\t\tYou navTo 'https://down.test' failed",
                "\t\t\twith error",
                "Playwright error: net::ERR_CONNECTION_REFUSED",
            ]
        );
        assert!(s.recording().is_empty());
        assert_eq!(s.counter(), 0);
    }

    #[tokio::test]
    async fn test_left_click_without_after_screenshot() {
        let (mut s, page, _) = session(FakePage::new(), E2e2dConfig::default());
        s.comment("first");
        s.left_click("#save", "save it", false).await.unwrap();

        let step = &s.recording().steps()[1];
        assert_eq!(step.before_screenshot, "1_leftClick_before.png");
        assert_eq!(step.after_highlight_screenshot, "1_leftClick_highlight.png");
        assert_eq!(step.after_screenshot, "");
        assert!(page.calls().contains(&PageCall::Click("#save".into())));
    }

    #[tokio::test]
    async fn test_left_click_nav_joins_navigation() {
        let (mut s, page, _) = session(
            FakePage::new().navigating_click("a.next"),
            E2e2dConfig::default(),
        );
        s.left_click_nav("a.next", "", true).await.unwrap();
        assert!(page.calls().contains(&PageCall::WaitForNavigation));
        assert_eq!(s.recording().steps()[0].after_screenshot, "0_leftClick_after.png");
    }

    #[tokio::test]
    async fn test_left_click_nav_times_out() {
        let (mut s, _, _) = session(
            FakePage::new(),
            E2e2dConfig {
                navigation_timeout_ms: 20,
                ..Default::default()
            },
        );
        let err = s.left_click_nav("#stays", "", true).await.unwrap_err();
        match err {
            E2e2dError::Delegated { action, source, .. } => {
                assert_eq!(action, "leftClick");
                assert!(matches!(source, PageError::Timeout(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(s.recording().is_empty());
    }

    #[tokio::test]
    async fn test_no_doc_leaves_screenshot_slots_empty() {
        let (mut s, page, _) = session(
            FakePage::new(),
            E2e2dConfig {
                generate_doc: false,
                output_folder: PathBuf::from("unused"),
                ..Default::default()
            },
        );
        s.nav_to("https://x", "").await.unwrap();
        assert_eq!(s.recording().steps()[0].before_screenshot, "");
        assert!(page.screenshots().is_empty());
    }

    #[tokio::test]
    async fn test_action_structs_interpolate_config_data() {
        let mut config = E2e2dConfig::default();
        config
            .config_file_data
            .insert("user".into(), serde_json::json!("ada"));
        let (mut s, page, _) = session(FakePage::new(), config);

        NavTo {
            url: "https://x.test/${user}".into(),
            doc: "".into(),
        }
        .run(&mut s)
        .await
        .unwrap();
        Fill {
            selector: "#name".into(),
            value: "${user}".into(),
            doc: "".into(),
        }
        .run(&mut s)
        .await
        .unwrap();

        assert_eq!(page.url().as_deref(), Some("https://x.test/ada"));
        assert_eq!(page.text_of("#name").as_deref(), Some("ada"));
    }

    #[tokio::test]
    async fn test_selectors_and_patterns_interpolate_config_data() {
        let mut config = E2e2dConfig::default();
        config.config_file_data.extend([
            ("user".to_string(), serde_json::json!("ada")),
            ("field".to_string(), serde_json::json!("name")),
            ("bad".to_string(), serde_json::json!("(")),
        ]);
        let (mut s, page, _) = session(FakePage::new(), config);

        Fill {
            selector: "#${field}".into(),
            value: "${user}".into(),
            doc: "".into(),
        }
        .run(&mut s)
        .await
        .unwrap();
        LeftClick {
            selector: "#${field}".into(),
            doc: "".into(),
            capture_after: false,
            wait_for_navigation: false,
        }
        .run(&mut s)
        .await
        .unwrap();
        Assert {
            ops: vec![
                should::see_as("#${field}", "the ${field} field"),
                should::matches("^${user}$", should::inner_text()).unwrap(),
            ],
            screenshot: false,
        }
        .run(&mut s)
        .await
        .unwrap();

        assert_eq!(page.text_of("#name").as_deref(), Some("ada"));
        assert!(page.calls().contains(&PageCall::Click("#name".into())));
        let step = s.recording().steps().last().unwrap();
        assert_eq!(step.action, StepKind::Should);
        assert_eq!(step.selector, "#name");

        let err = Assert {
            ops: vec![
                should::see("#name"),
                should::matches("${bad}", should::inner_text()).unwrap(),
            ],
            screenshot: false,
        }
        .run(&mut s)
        .await
        .unwrap_err();
        assert!(matches!(err, E2e2dError::Config(_)), "{err}");
    }
}
