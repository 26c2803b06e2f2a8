//! Error types for e2e2d runs

use serde_json::Value;
use thiserror::Error;

/// Errors raised by the page-automation boundary.
#[derive(Error, Debug)]
pub enum PageError {
    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Bridge protocol error: {0}")]
    Protocol(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Page is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type PageResult<T> = Result<T, PageError>;

/// Narration captured from an assertion chain at the point it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShouldTrail {
    pub msg: Vec<String>,
    pub selector: String,
}

impl ShouldTrail {
    pub fn sentence(&self) -> String {
        self.msg.join(" ")
    }
}

/// Discriminant used by the orchestrator to pick a failure narration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Comparison,
    Predicate,
    Delegated,
    Unclassified,
}

#[derive(Error, Debug)]
pub enum E2e2dError {
    #[error("{predicate} failed: got '{}', expected '{}'", display_value(.got), display_value(.expected))]
    Comparison {
        trail: ShouldTrail,
        predicate: &'static str,
        got: Value,
        expected: Value,
    },

    #[error("{predicate} failed: {}", .trail.sentence())]
    Predicate {
        trail: ShouldTrail,
        predicate: &'static str,
    },

    #[error("You {action} {context} failed: {source}")]
    Delegated {
        action: String,
        context: String,
        #[source]
        source: PageError,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Scenario parse error: {0}")]
    ScenarioParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl E2e2dError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            E2e2dError::Comparison { .. } => ErrorKind::Comparison,
            E2e2dError::Predicate { .. } => ErrorKind::Predicate,
            E2e2dError::Delegated { .. } => ErrorKind::Delegated,
            _ => ErrorKind::Unclassified,
        }
    }

    /// The assertion narration carried by comparison and predicate failures.
    pub fn trail(&self) -> Option<&ShouldTrail> {
        match self {
            E2e2dError::Comparison { trail, .. } | E2e2dError::Predicate { trail, .. } => {
                Some(trail)
            }
            _ => None,
        }
    }
}

pub type E2e2dResult<T> = Result<T, E2e2dError>;

/// Renders a value the way narration quotes it: strings bare, everything else as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_discriminant() {
        let trail = ShouldTrail {
            msg: vec!["You".into(), "see".into(), "#name".into()],
            selector: "#name".into(),
        };
        let comparison = E2e2dError::Comparison {
            trail: trail.clone(),
            predicate: "equals",
            got: json!("Ad a"),
            expected: json!("Ada"),
        };
        assert_eq!(comparison.kind(), ErrorKind::Comparison);
        assert_eq!(comparison.to_string(), "equals failed: got 'Ad a', expected 'Ada'");
        assert_eq!(comparison.trail(), Some(&trail));

        let predicate = E2e2dError::Predicate { trail, predicate: "exist" };
        assert_eq!(predicate.kind(), ErrorKind::Predicate);
        assert_eq!(predicate.to_string(), "exist failed: You see #name");

        let delegated = E2e2dError::Delegated {
            action: "navTo".into(),
            context: "'https://x'".into(),
            source: PageError::Timeout("load".into()),
        };
        assert_eq!(delegated.kind(), ErrorKind::Delegated);
        assert!(delegated.trail().is_none());

        let config = E2e2dError::Config("bad".into());
        assert_eq!(config.kind(), ErrorKind::Unclassified);
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&json!("Ada")), "Ada");
        assert_eq!(display_value(&json!(3)), "3");
        assert_eq!(display_value(&Value::Null), "null");
    }
}
