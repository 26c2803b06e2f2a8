//! Assertion chains
//!
//! A chain is a [`Should`] state threaded through tagged [`ShouldOp`]s: pick a
//! subject (`see`, `that`), add narration (`observe`, `is`, `to`), then finish
//! with a predicate (`equal`/`equals`, `exist`, `matches`). Each op appends
//! tokens to the narration, so a chain reads as a sentence:
//!
//! ```text
//! You see #name is equal 'Ada'
//! ```
//!
//! Two surfaces share the same core:
//!
//! ```ignore
//! // composable
//! session.run_should(vec![see("#name"), equal("Ada", inner_text())], true).await?;
//! // fluent
//! session.should().see("#name").await?.equal("Ada", inner_text()).await?;
//! ```
//!
//! A passing predicate records a `should` step; a failing one records a step
//! carrying `failed` (and `got`/`expected` for comparisons) and returns an
//! error holding the narration so far.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{display_value, E2e2dError, E2e2dResult, PageError, PageResult, ShouldTrail};
use crate::narration::console_text;
use crate::page::{ElementHandle, Page};
use crate::recording::{Step, StepKind};
use crate::session::Session;

/// A subject once any pending work has finished
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Absent,
    Value(Value),
    Element(ElementHandle),
}

impl Resolved {
    /// `null` values count as absent, like a failed query.
    pub fn is_absent(&self) -> bool {
        matches!(self, Resolved::Absent | Resolved::Value(Value::Null))
    }

    fn to_value(&self) -> Value {
        match self {
            Resolved::Absent => Value::Null,
            Resolved::Value(value) => value.clone(),
            Resolved::Element(element) => json!({ "element": element.selector }),
        }
    }
}

/// The value under assertion
pub enum Subject {
    Ready(Resolved),
    Pending(BoxFuture<'static, E2e2dResult<Value>>),
}

impl fmt::Debug for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Ready(resolved) => f.debug_tuple("Ready").field(resolved).finish(),
            Subject::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// Maps the resolved subject to the value a predicate checks
#[derive(Clone)]
pub enum Transform {
    Identity,
    /// Rendered text of an element; `""` when the element is absent
    InnerText,
    Map(Arc<dyn Fn(Value) -> Value + Send + Sync>),
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Identity => f.write_str("Identity"),
            Transform::InnerText => f.write_str("InnerText"),
            Transform::Map(_) => f.write_str("Map"),
        }
    }
}

impl Transform {
    pub fn map<F>(f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Transform::Map(Arc::new(f))
    }

    pub async fn apply(&self, page: &dyn Page, subject: &Resolved) -> PageResult<Value> {
        match (self, subject) {
            (Transform::Identity, subject) => Ok(subject.to_value()),
            (Transform::InnerText, Resolved::Element(element)) => {
                Ok(Value::String(page.inner_text(element).await?))
            }
            (Transform::InnerText, Resolved::Absent) => Ok(Value::String(String::new())),
            (Transform::InnerText, Resolved::Value(value)) => Ok(value.clone()),
            (Transform::Map(f), subject) => Ok(f(subject.to_value())),
        }
    }
}

pub fn identity() -> Transform {
    Transform::Identity
}

pub fn inner_text() -> Transform {
    Transform::InnerText
}

#[derive(Debug, Clone)]
pub enum ShouldOp {
    See { selector: String, label: String },
    That(Value),
    Narrate(&'static str),
    Equals {
        expected: Value,
        transform: Transform,
    },
    Exist,
    Matches {
        /// Regex source; may still carry `${key}` placeholders
        pattern: String,
        transform: Transform,
    },
}

pub fn see(selector: impl Into<String>) -> ShouldOp {
    ShouldOp::See {
        selector: selector.into(),
        label: String::new(),
    }
}

/// Like [`see`] but narrates `label` instead of the selector
pub fn see_as(selector: impl Into<String>, label: impl Into<String>) -> ShouldOp {
    ShouldOp::See {
        selector: selector.into(),
        label: label.into(),
    }
}

pub fn that(value: impl Into<Value>) -> ShouldOp {
    ShouldOp::That(value.into())
}

pub fn observe() -> ShouldOp {
    ShouldOp::Narrate("observe")
}

pub fn is() -> ShouldOp {
    ShouldOp::Narrate("is")
}

pub fn to() -> ShouldOp {
    ShouldOp::Narrate("to")
}

pub fn equals(expected: impl Into<Value>, transform: Transform) -> ShouldOp {
    ShouldOp::Equals {
        expected: expected.into(),
        transform,
    }
}

/// Same as [`equals`]
pub fn equal(expected: impl Into<Value>, transform: Transform) -> ShouldOp {
    equals(expected, transform)
}

pub fn exist() -> ShouldOp {
    ShouldOp::Exist
}

/// A pattern with `${key}` placeholders is checked once it is interpolated.
pub fn matches(pattern: &str, transform: Transform) -> E2e2dResult<ShouldOp> {
    if !pattern.contains("${") {
        compile(pattern)?;
    }
    Ok(ShouldOp::Matches {
        pattern: pattern.to_string(),
        transform,
    })
}

fn compile(pattern: &str) -> E2e2dResult<Regex> {
    Regex::new(pattern)
        .map_err(|e| E2e2dError::Config(format!("invalid pattern '{}': {}", pattern, e)))
}

/// State of one assertion chain
#[derive(Debug)]
pub struct Should {
    msg: Vec<String>,
    subject: Subject,
    selector: String,
    take_screenshot: bool,
}

impl Should {
    pub fn new(take_screenshot: bool) -> Self {
        Self {
            msg: vec!["You".to_string()],
            subject: Subject::Ready(Resolved::Absent),
            selector: String::new(),
            take_screenshot,
        }
    }

    pub fn msg(&self) -> &[String] {
        &self.msg
    }

    pub fn narration(&self) -> String {
        self.msg.join(" ")
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn trail(&self) -> ShouldTrail {
        ShouldTrail {
            msg: self.msg.clone(),
            selector: self.selector.clone(),
        }
    }

    pub fn narrate(&mut self, token: impl Into<String>) {
        self.msg.push(token.into());
    }

    pub fn set_subject(&mut self, value: Value) {
        self.msg.push("that".to_string());
        self.subject = Subject::Ready(Resolved::Value(value));
    }

    pub fn set_pending<F>(&mut self, future: F)
    where
        F: Future<Output = E2e2dResult<Value>> + Send + 'static,
    {
        self.msg.push("that".to_string());
        self.subject = Subject::Pending(Box::pin(future));
    }

    pub async fn apply(&mut self, session: &mut Session, op: ShouldOp) -> E2e2dResult<()> {
        match op {
            ShouldOp::See { selector, label } => self.select(session, selector, label).await,
            ShouldOp::That(value) => {
                self.set_subject(value);
                Ok(())
            }
            ShouldOp::Narrate(token) => {
                self.narrate(token);
                Ok(())
            }
            ShouldOp::Equals {
                expected,
                transform,
            } => self.compare(session, expected, &transform).await,
            ShouldOp::Exist => self.exist(session).await,
            ShouldOp::Matches { pattern, transform } => {
                self.matches(session, &pattern, &transform).await
            }
        }
    }

    async fn select(
        &mut self,
        session: &mut Session,
        selector: String,
        label: String,
    ) -> E2e2dResult<()> {
        self.msg.push("see".to_string());
        self.msg.push(if label.is_empty() {
            selector.clone()
        } else {
            label
        });

        let found = match session.page().query_selector(&selector).await {
            Ok(found) => found,
            Err(e) => return Err(session.handle_error(e, "see", &format!("'{}'", selector))),
        };
        self.subject = Subject::Ready(match found {
            Some(element) => Resolved::Element(element),
            None => Resolved::Absent,
        });
        self.selector = selector;
        Ok(())
    }

    /// Await the subject if needed; later calls see the cached result.
    async fn resolve(&mut self) -> E2e2dResult<Resolved> {
        let subject = std::mem::replace(&mut self.subject, Subject::Ready(Resolved::Absent));
        let resolved = match subject {
            Subject::Ready(resolved) => resolved,
            Subject::Pending(future) => Resolved::Value(future.await?),
        };
        self.subject = Subject::Ready(resolved.clone());
        Ok(resolved)
    }

    async fn transformed(
        &mut self,
        session: &mut Session,
        transform: &Transform,
    ) -> E2e2dResult<Value> {
        let subject = self.resolve().await?;
        match transform.apply(session.page(), &subject).await {
            Ok(value) => Ok(value),
            Err(e) => {
                let context = format!("'{}'", self.narration());
                Err(session.handle_error(e, "should", &context))
            }
        }
    }

    async fn compare(
        &mut self,
        session: &mut Session,
        expected: Value,
        transform: &Transform,
    ) -> E2e2dResult<()> {
        let got = self.transformed(session, transform).await?;

        if self.msg.last().map(String::as_str) != Some("is") {
            self.msg.push("is".to_string());
        }
        self.msg.push("equal".to_string());
        self.msg.push(format!("'{}'", display_value(&expected)));

        if !strict_equal(&got, &expected) {
            self.save_step_error(session, "equals", Some(got.clone()), Some(expected.clone()))
                .await;
            if let Err(e) = session
                .de_highlight(&self.selector, self.take_screenshot)
                .await
            {
                warn!("Removing highlight after failed comparison: {}", e);
            }
            return Err(E2e2dError::Comparison {
                trail: self.trail(),
                predicate: "equals",
                got,
                expected,
            });
        }

        self.succeed(session).await
    }

    async fn exist(&mut self, session: &mut Session) -> E2e2dResult<()> {
        let subject = self.resolve().await?;
        if subject.is_absent() {
            self.save_step_error(session, "exist", None, None).await;
            return Err(E2e2dError::Predicate {
                trail: self.trail(),
                predicate: "exist",
            });
        }
        self.succeed(session).await
    }

    async fn matches(
        &mut self,
        session: &mut Session,
        pattern: &str,
        transform: &Transform,
    ) -> E2e2dResult<()> {
        let pattern = compile(pattern)?;
        let got = self.transformed(session, transform).await?;
        self.msg.push("matching".to_string());
        self.msg.push(format!("/{}/", pattern.as_str()));

        let text = display_value(&got);
        if got.is_null() || !pattern.is_match(&text) {
            self.save_step_error(session, "matches", None, None).await;
            return Err(E2e2dError::Predicate {
                trail: self.trail(),
                predicate: "matches",
            });
        }
        self.succeed(session).await
    }

    async fn succeed(&mut self, session: &mut Session) -> E2e2dResult<()> {
        let color = session.config().color;
        session.print_msg(console_text(true, color, &self.msg));
        self.save_step(session).await
    }

    async fn save_step(&mut self, session: &mut Session) -> E2e2dResult<()> {
        let mut step = Step::new(StepKind::Should, self.selector.clone(), self.narration());
        if self.take_screenshot && !self.selector.is_empty() {
            let selector = self.selector.clone();
            let captured = async {
                session.highlight(&selector, true).await?;
                let file = session.take_screenshot("should", "highlight").await?;
                session.de_highlight(&selector, true).await?;
                Ok::<_, PageError>(file)
            }
            .await;
            match captured {
                Ok(file) => step.after_highlight_screenshot = file,
                Err(e) => {
                    let context = format!("'{}'", self.narration());
                    return Err(session.handle_error(e, "should", &context));
                }
            }
        }
        session.add_step(step);
        Ok(())
    }

    /// Record the failed assertion. The screenshot is best effort so the
    /// assertion failure is what reaches the orchestrator.
    async fn save_step_error(
        &mut self,
        session: &mut Session,
        failed: &str,
        got: Option<Value>,
        expected: Option<Value>,
    ) {
        let mut step = Step::new(StepKind::Should, self.selector.clone(), self.narration())
            .with_failure(failed, got, expected);
        if self.take_screenshot {
            match session.take_screenshot("should", "before").await {
                Ok(file) => step.before_screenshot = file,
                Err(e) => warn!("Failure screenshot for '{}' not taken: {}", step.doc, e),
            }
        }
        debug!(?step, "assertion failed");
        session.add_step(step);
    }
}

/// Fluent surface over [`Should`]
pub struct ShouldChain<'s> {
    session: &'s mut Session,
    state: Should,
}

impl fmt::Debug for ShouldChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShouldChain")
            .field("state", &self.state)
            .finish()
    }
}

impl<'s> ShouldChain<'s> {
    pub(crate) fn new(session: &'s mut Session, take_screenshot: bool) -> Self {
        Self {
            session,
            state: Should::new(take_screenshot),
        }
    }

    async fn step(mut self, op: ShouldOp) -> E2e2dResult<Self> {
        self.state.apply(self.session, op).await?;
        Ok(self)
    }

    pub async fn see(self, selector: &str) -> E2e2dResult<Self> {
        self.step(see(selector)).await
    }

    pub async fn see_as(self, selector: &str, label: &str) -> E2e2dResult<Self> {
        self.step(see_as(selector, label)).await
    }

    pub fn that(mut self, value: impl Into<Value>) -> Self {
        self.state.set_subject(value.into());
        self
    }

    /// Subject computed later; it is awaited by the predicate.
    pub fn that_eventually<F>(mut self, future: F) -> Self
    where
        F: Future<Output = E2e2dResult<Value>> + Send + 'static,
    {
        self.state.set_pending(future);
        self
    }

    pub fn observe(mut self) -> Self {
        self.state.narrate("observe");
        self
    }

    pub fn is(mut self) -> Self {
        self.state.narrate("is");
        self
    }

    pub fn to(mut self) -> Self {
        self.state.narrate("to");
        self
    }

    pub async fn equals(self, expected: impl Into<Value>, transform: Transform) -> E2e2dResult<Self> {
        self.step(equals(expected, transform)).await
    }

    pub async fn equal(self, expected: impl Into<Value>, transform: Transform) -> E2e2dResult<Self> {
        self.step(equal(expected, transform)).await
    }

    pub async fn exist(self) -> E2e2dResult<Self> {
        self.step(exist()).await
    }

    pub async fn matches(self, pattern: &str, transform: Transform) -> E2e2dResult<Self> {
        let op = matches(pattern, transform)?;
        self.step(op).await
    }

    pub fn finish(self) -> Should {
        self.state
    }
}

impl Session {
    /// Start an assertion that screenshots the highlighted subject on success
    pub fn should(&mut self) -> ShouldChain<'_> {
        self.advance();
        ShouldChain::new(self, true)
    }

    pub fn should_no_screenshot(&mut self) -> ShouldChain<'_> {
        self.advance();
        ShouldChain::new(self, false)
    }

    /// Run a whole chain of ops in order
    pub async fn run_should(&mut self, ops: Vec<ShouldOp>, take_screenshot: bool) -> E2e2dResult<Should> {
        self.advance();
        let mut state = Should::new(take_screenshot);
        for op in ops {
            state.apply(self, op).await?;
        }
        Ok(state)
    }
}

/// Numbers compare by value (`1` equals `1.0`), everything else by type and
/// content.
fn strict_equal(got: &Value, expected: &Value) -> bool {
    match (got, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => got == expected,
    }
}
