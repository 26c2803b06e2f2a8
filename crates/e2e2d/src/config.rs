//! Run configuration and its command-line surface

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{E2e2dError, E2e2dResult};

pub const DEFAULT_OUTPUT_FOLDER: &str = "e2e2documentation";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

/// Browser launch parameters handed to the page backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    /// Delay in ms Playwright inserts between operations
    pub slow_mo: u64,
    pub screen_x: u32,
    pub screen_y: u32,
    pub dev_tools: bool,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: false,
            slow_mo: 300,
            screen_x: 1920,
            screen_y: 1080,
            dev_tools: false,
        }
    }
}

/// What `in_order_to` does once a run has failed and its trace is flushed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Return the failure as `Err`; the binary turns it into exit status 1.
    #[default]
    Propagate,
    /// Return `Ok` with a failed `RunReport`.
    Report,
}

/// Recording visibility once a precondition has finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AfterPrecondition {
    #[default]
    Restore,
    Keep,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct E2e2dConfig {
    pub pw: PlaywrightConfig,
    pub output_folder: PathBuf,
    pub generate_doc: bool,
    /// Buffer narration and print it only if the run fails
    pub silent_unless_error: bool,
    pub color: bool,
    pub highlight: bool,
    pub navigation_timeout_ms: u64,
    pub failure_policy: FailurePolicy,
    pub after_precondition: AfterPrecondition,
    pub config_data_filename: Option<PathBuf>,
    pub config_file_data: BTreeMap<String, Value>,
}

impl Default for E2e2dConfig {
    fn default() -> Self {
        Self {
            pw: PlaywrightConfig::default(),
            output_folder: PathBuf::from(DEFAULT_OUTPUT_FOLDER),
            generate_doc: true,
            silent_unless_error: false,
            color: true,
            highlight: true,
            navigation_timeout_ms: 5000,
            failure_policy: FailurePolicy::Propagate,
            after_precondition: AfterPrecondition::Restore,
            config_data_filename: None,
            config_file_data: BTreeMap::new(),
        }
    }
}

impl E2e2dConfig {
    /// Merge `config_data_filename` into `config_file_data`. Entries already
    /// present (from `-c key:value`) win over the file.
    pub fn load_config_data(&mut self) -> E2e2dResult<()> {
        let Some(path) = self.config_data_filename.clone() else {
            return Ok(());
        };
        let file_data = read_config_data(&path)?;
        debug!("Loaded {} config data entries from {}", file_data.len(), path.display());

        for (key, value) in file_data {
            self.config_file_data.entry(key).or_insert(value);
        }
        Ok(())
    }

    pub fn data(&self, key: &str) -> Option<&Value> {
        self.config_file_data.get(key)
    }
}

fn read_config_data(path: &Path) -> E2e2dResult<BTreeMap<String, Value>> {
    let content = std::fs::read_to_string(path)?;
    let is_yaml = path
        .extension()
        .map(|ext| ext == "yaml" || ext == "yml")
        .unwrap_or(false);

    let value: Value = if is_yaml {
        serde_yaml::from_str(&content)?
    } else {
        serde_json::from_str(&content)?
    };

    match value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(E2e2dError::Config(format!(
            "{} must hold an object, found {}",
            path.display(),
            other
        ))),
    }
}

/// Command-line flags that build an [`E2e2dConfig`]
#[derive(Args, Debug, Clone)]
pub struct E2e2dArgs {
    /// The output folder for the documentation
    #[arg(short, long, default_value = DEFAULT_OUTPUT_FOLDER)]
    pub output_folder: PathBuf,

    /// Do not take screenshots or write the trace
    #[arg(long)]
    pub no_doc: bool,

    /// Print nothing unless there is an error, then print everything emitted so far
    #[arg(long)]
    pub silent_unless_error: bool,

    /// Plain glyphs instead of colored ones
    #[arg(long)]
    pub no_color: bool,

    /// Skip highlighting targets before screenshots
    #[arg(long)]
    pub no_highlight: bool,

    /// Browser to use
    #[arg(long, value_enum, default_value = "chromium")]
    pub browser: Browser,

    /// Run the browser headless
    #[arg(long)]
    pub headless: bool,

    /// Slow motion delay in ms
    #[arg(short, long, default_value = "300")]
    pub slow_mo: u64,

    /// Viewport width
    #[arg(long, default_value = "1920")]
    pub screen_x: u32,

    /// Viewport height
    #[arg(long, default_value = "1080")]
    pub screen_y: u32,

    /// Open the browser devtools
    #[arg(long)]
    pub dev_tools: bool,

    /// Timeout for clicks that navigate, in ms
    #[arg(long, default_value = "5000")]
    pub navigation_timeout_ms: u64,

    /// Return a failed report instead of failing the process
    #[arg(long, value_enum, default_value = "propagate")]
    pub failure_policy: FailurePolicy,

    /// Recording visibility after a precondition finished
    #[arg(long, value_enum, default_value = "restore")]
    pub after_precondition: AfterPrecondition,

    /// JSON or YAML file with scenario data
    #[arg(long)]
    pub config_data_filename: Option<PathBuf>,

    /// Scenario data entry as key:value (repeatable)
    #[arg(short = 'c', long = "config-data", value_parser = parse_key_value)]
    pub config_data: Vec<(String, String)>,
}

impl E2e2dArgs {
    pub fn into_config(self) -> E2e2dConfig {
        E2e2dConfig {
            pw: PlaywrightConfig {
                browser: self.browser,
                headless: self.headless,
                slow_mo: self.slow_mo,
                screen_x: self.screen_x,
                screen_y: self.screen_y,
                dev_tools: self.dev_tools,
            },
            output_folder: self.output_folder,
            generate_doc: !self.no_doc,
            silent_unless_error: self.silent_unless_error,
            color: !self.no_color,
            highlight: !self.no_highlight,
            navigation_timeout_ms: self.navigation_timeout_ms,
            failure_policy: self.failure_policy,
            after_precondition: self.after_precondition,
            config_data_filename: self.config_data_filename,
            config_file_data: self
                .config_data
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
        }
    }
}

fn parse_key_value(entry: &str) -> Result<(String, String), String> {
    let (key, value) = entry
        .split_once(':')
        .ok_or_else(|| format!("expected key:value, got '{}'", entry))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", entry));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serde_json::json;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: E2e2dArgs,
    }

    fn parse(argv: &[&str]) -> E2e2dConfig {
        let mut full = vec!["e2e2d"];
        full.extend_from_slice(argv);
        TestCli::try_parse_from(full).unwrap().args.into_config()
    }

    #[test]
    fn test_defaults_match_config_default() {
        let parsed = parse(&[]);
        let default = E2e2dConfig::default();
        assert_eq!(parsed.output_folder, default.output_folder);
        assert_eq!(parsed.pw.slow_mo, 300);
        assert_eq!((parsed.pw.screen_x, parsed.pw.screen_y), (1920, 1080));
        assert!(parsed.generate_doc && parsed.color && parsed.highlight);
        assert_eq!(parsed.failure_policy, FailurePolicy::Propagate);
        assert_eq!(parsed.after_precondition, AfterPrecondition::Restore);
    }

    #[test]
    fn test_config_data_entries() {
        let config = parse(&["-c", "user: ada", "-c", "url:https://x.test:8080", "-o", "docs"]);
        assert_eq!(config.data("user"), Some(&json!("ada")));
        assert_eq!(config.data("url"), Some(&json!("https://x.test:8080")));
        assert_eq!(config.output_folder, PathBuf::from("docs"));
    }

    #[test]
    fn test_malformed_config_data_rejected() {
        assert!(TestCli::try_parse_from(["e2e2d", "-c", "novalue"]).is_err());
        assert!(TestCli::try_parse_from(["e2e2d", "-c", ":value"]).is_err());
    }

    #[test]
    fn test_load_config_data_command_line_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.yaml");
        std::fs::write(&path, "user: grace\npassword: hunter2\nretries: 3\n").unwrap();

        let mut config = parse(&["-c", "user:ada"]);
        config.config_data_filename = Some(path);
        config.load_config_data().unwrap();

        assert_eq!(config.data("user"), Some(&json!("ada")));
        assert_eq!(config.data("password"), Some(&json!("hunter2")));
        assert_eq!(config.data("retries"), Some(&json!(3)));
    }

    #[test]
    fn test_config_data_must_be_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "[1, 2]").unwrap();

        let mut config = E2e2dConfig {
            config_data_filename: Some(path),
            ..Default::default()
        };
        assert!(matches!(config.load_config_data(), Err(E2e2dError::Config(_))));
    }
}
