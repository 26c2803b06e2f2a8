//! Scenario discovery, listing and validation

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;

use e2e2d::Scenario;

use crate::output::{print_list, print_success, OutputFormat, TableDisplay};

#[derive(Subcommand)]
pub enum ScenarioCommands {
    /// List scenarios
    List {
        /// Scenario files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Only scenarios carrying this tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Output format
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },

    /// Parse scenarios and report the first invalid one
    Check {
        /// Scenario files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

/// Scenario display wrapper for serialization
#[derive(Serialize)]
pub struct ScenarioDisplay {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub steps: usize,
    pub preconditions: Vec<String>,
}

impl From<&Scenario> for ScenarioDisplay {
    fn from(scenario: &Scenario) -> Self {
        Self {
            name: scenario.name.clone(),
            description: scenario.description.clone(),
            tags: scenario.tags.clone(),
            steps: scenario.steps.len(),
            preconditions: scenario.preconditions.keys().cloned().collect(),
        }
    }
}

impl TableDisplay for ScenarioDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Description", "Tags", "Steps", "Preconditions"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.description.clone(),
            self.tags.join(", "),
            self.steps.to_string(),
            self.preconditions.join(", "),
        ]
    }
}

/// Load scenarios from files and directories (searched recursively)
pub fn collect(paths: &[PathBuf], tag: Option<&str>) -> Result<Vec<Scenario>> {
    let mut scenarios = Vec::new();
    for path in paths {
        if path.is_dir() {
            let found = Scenario::load_all(path)
                .with_context(|| format!("Loading scenarios from {}", path.display()))?;
            scenarios.extend(found);
        } else {
            let scenario = Scenario::from_file(path)
                .with_context(|| format!("Loading scenario {}", path.display()))?;
            scenarios.push(scenario);
        }
    }

    match tag {
        Some(tag) => Ok(Scenario::filter_by_tag(&scenarios, tag)
            .into_iter()
            .cloned()
            .collect()),
        None => Ok(scenarios),
    }
}

pub fn execute(cmd: ScenarioCommands) -> Result<()> {
    match cmd {
        ScenarioCommands::List { paths, tag, format } => {
            let scenarios = collect(&paths, tag.as_deref())?;
            let rows: Vec<ScenarioDisplay> = scenarios.iter().map(ScenarioDisplay::from).collect();
            print_list(&rows, format)?;
        }
        ScenarioCommands::Check { paths } => {
            let scenarios = collect(&paths, None)?;
            print_success(&format!("{} scenario(s) are valid", scenarios.len()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMOKE: &str = "name: a\ntags: [smoke]\nsteps:\n  - action: comment\n    doc: hi\n";
    const SLOW: &str = "name: b\nsteps:\n  - action: nav_to\n    url: https://x.test\n";

    #[test]
    fn test_collect_files_dirs_and_tags() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.yaml"), SMOKE).unwrap();
        std::fs::write(dir.path().join("b.yaml"), SLOW).unwrap();

        let all = collect(&[dir.path().to_path_buf()], None).unwrap();
        assert_eq!(all.len(), 2);

        let smoke = collect(&[dir.path().join("a.yaml")], Some("smoke")).unwrap();
        assert_eq!(smoke.len(), 1);
        assert_eq!(smoke[0].name, "a");

        let tagged = collect(&[dir.path().to_path_buf()], Some("smoke")).unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].name, "a");

        let none = collect(&[dir.path().join("b.yaml")], Some("smoke")).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_collect_reports_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "name: bad\nsteps:\n  - action: should\n    exist: true\n").unwrap();

        let err = collect(&[path], None).unwrap_err();
        assert!(format!("{err:#}").contains("exactly one of 'see' or 'that'"));
    }
}
