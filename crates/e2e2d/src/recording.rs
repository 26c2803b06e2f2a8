//! Recorded steps: the documentation half of a run

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::E2e2dResult;

/// Kind tag of a recorded step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepKind {
    Comment,
    NavTo,
    Insert,
    LeftClick,
    Should,
    FollowStepsIn,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Comment => "comment",
            StepKind::NavTo => "navTo",
            StepKind::Insert => "insert",
            StepKind::LeftClick => "leftClick",
            StepKind::Should => "should",
            StepKind::FollowStepsIn => "followStepsIn",
        }
    }
}

/// One recorded action or assertion.
///
/// Screenshot fields hold file names relative to the run folder and stay
/// empty when nothing was captured. `value` is set for `insert` steps,
/// `failed`/`got`/`expected` for failed assertions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub action: StepKind,
    pub selector: String,
    pub doc: String,
    #[serde(default)]
    pub before_screenshot: String,
    #[serde(default)]
    pub after_highlight_screenshot: String,
    #[serde(default)]
    pub after_screenshot: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub got: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub expected: Option<Value>,
}

// A key that is present is `Some`, even when it holds `null`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Step {
    pub fn new(action: StepKind, selector: impl Into<String>, doc: impl Into<String>) -> Self {
        Self {
            action,
            selector: selector.into(),
            doc: doc.into(),
            before_screenshot: String::new(),
            after_highlight_screenshot: String::new(),
            after_screenshot: String::new(),
            value: None,
            failed: None,
            got: None,
            expected: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_failure(mut self, failed: &str, got: Option<Value>, expected: Option<Value>) -> Self {
        self.failed = Some(failed.to_string());
        self.got = got;
        self.expected = expected;
        self
    }

    pub fn is_failure(&self) -> bool {
        self.failed.is_some()
    }
}

/// Ordered, toggle-able log of steps for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    recording_is_on: bool,
    steps: Vec<Step>,
}

impl Default for Recording {
    fn default() -> Self {
        Self {
            recording_is_on: true,
            steps: Vec::new(),
        }
    }
}

impl Recording {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step. Does nothing while recording is off.
    pub fn add_step(&mut self, step: Step) {
        if self.recording_is_on {
            self.steps.push(step);
        }
    }

    pub fn set_recording(&mut self, on: bool) {
        self.recording_is_on = on;
    }

    pub fn is_recording(&self) -> bool {
        self.recording_is_on
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Two-space indented JSON with a trailing newline, as written to `e2e2d.json`.
    pub fn to_json_pretty(&self) -> E2e2dResult<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    pub fn from_json(json: &str) -> E2e2dResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
