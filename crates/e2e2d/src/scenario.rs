//! Declarative YAML scenarios
//!
//! A scenario file maps onto a chain: each step becomes an [`Entry`], and
//! named preconditions become [`Precondition`] entries wherever a step
//! refers to them.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actions::{Assert, Comment, Fill, LeftClick, NavTo};
use crate::error::{E2e2dError, E2e2dResult};
use crate::runner::{Action, Entry, Precondition, Steps};
use crate::should::{self, ShouldOp, Transform};

/// A complete scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name; also names the output folder
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// Reusable sub-chains, referenced by `precondition` steps
    #[serde(default)]
    pub preconditions: BTreeMap<String, PreconditionDef>,

    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreconditionDef {
    #[serde(default)]
    pub record_steps: bool,
    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioStep {
    Comment {
        doc: String,
    },

    NavTo {
        url: String,
        #[serde(default)]
        doc: String,
    },

    Fill {
        selector: String,
        value: String,
        #[serde(default)]
        doc: String,
    },

    LeftClick {
        selector: String,
        #[serde(default)]
        doc: String,
        #[serde(default = "default_true")]
        capture_after: bool,
        #[serde(default)]
        wait_for_navigation: bool,
    },

    Should(ShouldDef),

    Precondition {
        name: String,
    },
}

fn default_true() -> bool {
    true
}

/// One assertion: a subject (`see` or `that`) and one predicate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShouldDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub see: Option<String>,

    /// Narrated instead of the selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub that: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equal: Option<Value>,

    #[serde(default)]
    pub exist: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<String>,

    /// `inner_text` (default for `see`) or `identity` (default for `that`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<TransformName>,

    #[serde(default = "default_true")]
    pub screenshot: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformName {
    Identity,
    InnerText,
}

impl ShouldDef {
    pub fn to_ops(&self) -> E2e2dResult<Vec<ShouldOp>> {
        let mut ops = Vec::with_capacity(2);
        let transform = match (&self.see, &self.that) {
            (Some(selector), None) => {
                ops.push(match &self.label {
                    Some(label) => should::see_as(selector.as_str(), label.as_str()),
                    None => should::see(selector.as_str()),
                });
                self.transform.unwrap_or(TransformName::InnerText)
            }
            (None, Some(value)) => {
                ops.push(should::that(value.clone()));
                self.transform.unwrap_or(TransformName::Identity)
            }
            _ => {
                return Err(E2e2dError::ScenarioParse(
                    "a should step needs exactly one of 'see' or 'that'".to_string(),
                ))
            }
        };
        let transform = match transform {
            TransformName::Identity => Transform::Identity,
            TransformName::InnerText => Transform::InnerText,
        };

        let predicates =
            self.equal.is_some() as usize + self.exist as usize + self.matches.is_some() as usize;
        if predicates != 1 {
            return Err(E2e2dError::ScenarioParse(format!(
                "a should step needs exactly one of 'equal', 'exist' or 'matches', found {}",
                predicates
            )));
        }

        if let Some(expected) = &self.equal {
            ops.push(should::equal(expected.clone(), transform));
        } else if self.exist {
            ops.push(should::exist());
        } else if let Some(pattern) = &self.matches {
            ops.push(
                should::matches(pattern, transform)
                    .map_err(|e| E2e2dError::ScenarioParse(e.to_string()))?,
            );
        }
        Ok(ops)
    }
}

impl ScenarioStep {
    fn to_action(&self) -> E2e2dResult<Arc<dyn Action>> {
        let action: Arc<dyn Action> = match self {
            ScenarioStep::Comment { doc } => Arc::new(Comment { doc: doc.clone() }),
            ScenarioStep::NavTo { url, doc } => Arc::new(NavTo {
                url: url.clone(),
                doc: doc.clone(),
            }),
            ScenarioStep::Fill {
                selector,
                value,
                doc,
            } => Arc::new(Fill {
                selector: selector.clone(),
                value: value.clone(),
                doc: doc.clone(),
            }),
            ScenarioStep::LeftClick {
                selector,
                doc,
                capture_after,
                wait_for_navigation,
            } => Arc::new(LeftClick {
                selector: selector.clone(),
                doc: doc.clone(),
                capture_after: *capture_after,
                wait_for_navigation: *wait_for_navigation,
            }),
            ScenarioStep::Should(def) => Arc::new(Assert {
                ops: def.to_ops()?,
                screenshot: def.screenshot,
            }),
            ScenarioStep::Precondition { name } => {
                return Err(E2e2dError::ScenarioParse(format!(
                    "precondition '{}' cannot be used inside another precondition",
                    name
                )))
            }
        };
        Ok(action)
    }
}

impl Scenario {
    /// Parse a scenario from a YAML string
    pub fn from_yaml(yaml: &str) -> E2e2dResult<Self> {
        let scenario: Self = serde_yaml::from_str(yaml)?;
        scenario.to_chain()?;
        Ok(scenario)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2e2dResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| match e {
            E2e2dError::ScenarioParse(msg) => {
                E2e2dError::ScenarioParse(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Load every `.yaml`/`.yml` scenario under a directory, in path order
    pub fn load_all(dir: &Path) -> E2e2dResult<Vec<Self>> {
        let mut scenarios = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_type().is_file()
                    && e.path()
                        .extension()
                        .map(|ext| ext == "yaml" || ext == "yml")
                        .unwrap_or(false)
            })
        {
            scenarios.push(Self::from_file(entry.path())?);
        }

        Ok(scenarios)
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(scenarios: &'a [Self], tag: &str) -> Vec<&'a Self> {
        scenarios
            .iter()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect()
    }

    /// Build the chain this scenario describes
    pub fn to_chain(&self) -> E2e2dResult<Vec<Entry>> {
        let mut chain = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let entry = match step {
                ScenarioStep::Precondition { name } => {
                    let def = self.preconditions.get(name).ok_or_else(|| {
                        E2e2dError::ScenarioParse(format!("unknown precondition '{}'", name))
                    })?;
                    let mut steps = Steps::new();
                    for inner in &def.steps {
                        steps.push(inner.to_action()?);
                    }
                    Entry::from(
                        Precondition::new(name.as_str(), Arc::new(steps))
                            .record_steps(def.record_steps),
                    )
                }
                other => Entry::Action(other.to_action()?),
            };
            chain.push(entry);
        }
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const SIGN_UP: &str = r##"
name: sign up
description: A new user signs up
tags: [smoke]
preconditions:
  login:
    steps:
      - action: nav_to
        url: https://example.test/login
steps:
  - action: precondition
    name: login
  - action: fill
    selector: "#name"
    value: "${user}"
  - action: should
    see: "#name"
    equal: Ada
"##;

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::from_yaml(SIGN_UP).unwrap();
        assert_eq!(scenario.name, "sign up");
        assert_eq!(scenario.tags, vec!["smoke"]);
        assert_eq!(scenario.steps.len(), 3);
        assert!(!scenario.preconditions["login"].record_steps);

        let chain = scenario.to_chain().unwrap();
        assert_eq!(chain.len(), 3);
        assert!(matches!(&chain[0], Entry::Precondition(p) if p.name == "login" && !p.record_steps));
        assert!(matches!(chain[1], Entry::Action(_)));
    }

    #[test]
    fn test_should_defaults() {
        let ScenarioStep::Should(def) = &Scenario::from_yaml(SIGN_UP).unwrap().steps[2] else {
            panic!("expected a should step");
        };
        assert!(def.screenshot);
        let ops = def.to_ops().unwrap();
        assert!(matches!(&ops[0], ShouldOp::See { selector, .. } if selector == "#name"));
        assert!(matches!(
            &ops[1],
            ShouldOp::Equals { transform: Transform::InnerText, .. }
        ));
    }

    #[test]
    fn test_left_click_defaults() {
        let yaml = r#"
name: click
steps:
  - action: left_click
    selector: "a.next"
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        match &scenario.steps[0] {
            ScenarioStep::LeftClick {
                capture_after,
                wait_for_navigation,
                ..
            } => {
                assert!(*capture_after);
                assert!(!*wait_for_navigation);
            }
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test_case("see: '#a'\n    that: 1\n    exist: true" ; "two subjects")]
    #[test_case("exist: true" ; "no subject")]
    #[test_case("see: '#a'" ; "no predicate")]
    #[test_case("see: '#a'\n    exist: true\n    equal: x" ; "two predicates")]
    #[test_case("see: '#a'\n    matches: '('" ; "bad pattern")]
    fn test_bad_should_is_rejected(body: &str) {
        let yaml = format!("name: bad\nsteps:\n  - action: should\n    {}\n", body);
        let err = Scenario::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, E2e2dError::ScenarioParse(_)), "{err}");
    }

    #[test]
    fn test_unknown_precondition_is_rejected() {
        let yaml = "name: x\nsteps:\n  - action: precondition\n    name: missing\n";
        let err = Scenario::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("unknown precondition 'missing'"));
    }

    #[test]
    fn test_nested_precondition_is_rejected() {
        let yaml = r#"
name: x
preconditions:
  a:
    steps:
      - action: precondition
        name: a
steps:
  - action: precondition
    name: a
"#;
        let err = Scenario::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("inside another precondition"));
    }

    #[test]
    fn test_load_all_and_filter_by_tag() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("a.yaml"), SIGN_UP).unwrap();
        std::fs::write(
            dir.path().join("nested/b.yml"),
            "name: b\nsteps:\n  - action: comment\n    doc: hi\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a scenario").unwrap();

        let scenarios = Scenario::load_all(dir.path()).unwrap();
        let names: Vec<_> = scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["sign up", "b"]);

        let smoke = Scenario::filter_by_tag(&scenarios, "smoke");
        assert_eq!(smoke.len(), 1);
        assert_eq!(smoke[0].name, "sign up");
    }
}
