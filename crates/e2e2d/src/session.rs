//! The mutable context threaded through every action of a run

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use tracing::debug;

use crate::config::E2e2dConfig;
use crate::error::{display_value, E2e2dError, PageError, PageResult};
use crate::narration::NarrationSink;
use crate::page::{dehighlight_script, highlight_script, Page};
use crate::recording::{Recording, Step};

static DATA_KEY: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z0-9_.-]+)\}").ok());

/// Name of the trace file inside a run folder
pub const TRACE_FILE_NAME: &str = "e2e2d.json";

/// `<output_folder>/<sanitized name>`
pub fn output_folder_name(output_folder: &Path, name: &str) -> PathBuf {
    output_folder.join(sanitize_name(name))
}

/// Whitespace and path separators become underscores.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_whitespace() || c == '/' || c == '\\' {
                '_'
            } else {
                c
            }
        })
        .collect()
}

pub struct Session {
    name: String,
    desc: String,
    cnt: u32,
    prefix: PathBuf,
    config: Arc<E2e2dConfig>,
    recording: Recording,
    deferred_output: Vec<String>,
    page: Arc<dyn Page>,
    narration: Arc<dyn NarrationSink>,
}

impl Session {
    pub fn new(
        name: impl Into<String>,
        desc: impl Into<String>,
        config: Arc<E2e2dConfig>,
        page: Arc<dyn Page>,
        narration: Arc<dyn NarrationSink>,
    ) -> Self {
        let name = name.into();
        let prefix = output_folder_name(&config.output_folder, &name);
        Self {
            name,
            desc: desc.into(),
            cnt: 0,
            prefix,
            config,
            recording: Recording::new(),
            deferred_output: Vec::new(),
            page,
            narration,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn config(&self) -> &E2e2dConfig {
        &self.config
    }

    pub fn page(&self) -> &dyn Page {
        self.page.as_ref()
    }

    pub(crate) fn page_handle(&self) -> Arc<dyn Page> {
        Arc::clone(&self.page)
    }

    pub fn recording(&self) -> &Recording {
        &self.recording
    }

    /// Folder receiving screenshots and the trace of this run
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn counter(&self) -> u32 {
        self.cnt
    }

    pub(crate) fn advance(&mut self) {
        self.cnt += 1;
    }

    pub fn add_step(&mut self, step: Step) {
        debug!(
            action = step.action.as_str(),
            selector = %step.selector,
            recorded = self.recording.is_recording(),
            "step"
        );
        self.recording.add_step(step);
    }

    pub fn start_recording(&mut self) {
        self.recording.set_recording(true);
    }

    pub fn stop_recording(&mut self) {
        self.recording.set_recording(false);
    }

    /// Emit a narration line now, or buffer it in silent-unless-error mode.
    pub fn print_msg(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        if self.config.silent_unless_error {
            self.deferred_output.push(msg);
        } else {
            self.narration.emit(&msg);
        }
    }

    /// Emit bypassing the deferred buffer
    pub fn emit_now(&self, msg: &str) {
        self.narration.emit(msg);
    }

    pub fn flush_deferred(&mut self) {
        for line in self.deferred_output.drain(..) {
            self.narration.emit(&line);
        }
    }

    pub fn deferred_output(&self) -> &[String] {
        &self.deferred_output
    }

    pub fn gen_file_name(&self, action: &str, part: &str) -> String {
        format!("{}_{}_{}.png", self.cnt, action, part)
    }

    /// Capture the page while recording is on and docs are enabled. Returns
    /// the file name relative to [`Session::prefix`], or `""` when skipped.
    pub async fn take_screenshot(&self, action: &str, part: &str) -> PageResult<String> {
        if !(self.recording.is_recording() && self.config.generate_doc) {
            return Ok(String::new());
        }
        let file_name = self.gen_file_name(action, part);
        self.page.screenshot(&self.prefix.join(&file_name)).await?;
        Ok(file_name)
    }

    pub async fn highlight(&self, selector: &str, should_highlight: bool) -> PageResult<()> {
        if !should_highlight || selector.is_empty() || !self.config.highlight {
            return Ok(());
        }
        self.page.evaluate(&highlight_script(selector)).await.map(|_| ())
    }

    pub async fn de_highlight(&self, selector: &str, should_highlight: bool) -> PageResult<()> {
        if !should_highlight || selector.is_empty() || !self.config.highlight {
            return Ok(());
        }
        self.page.evaluate(&dehighlight_script()).await.map(|_| ())
    }

    /// Narrate a delegated failure and wrap it for the orchestrator.
    pub fn handle_error(&mut self, error: PageError, action: &str, context: &str) -> E2e2dError {
        let what = if context.is_empty() {
            format!("\t\tYou {} failed", action)
        } else {
            format!("\t\tYou {} {} failed", action, context)
        };
        self.print_msg(what);
        self.print_msg("\t\t\twith error");
        self.print_msg(error.to_string());
        E2e2dError::Delegated {
            action: action.to_string(),
            context: context.to_string(),
            source: error,
        }
    }

    /// Replace `${key}` with config data; unknown keys stay as written.
    pub fn interpolate(&self, text: &str) -> String {
        interpolate(text, &self.config.config_file_data)
    }
}

pub fn interpolate(text: &str, data: &BTreeMap<String, Value>) -> String {
    let Some(pattern) = DATA_KEY.as_ref().filter(|_| text.contains("${")) else {
        return text.to_string();
    };
    pattern
        .replace_all(text, |caps: &Captures| match data.get(&caps[1]) {
            Some(value) => display_value(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narration::MemoryNarration;
    use crate::recording::StepKind;
    use crate::testing::{FakePage, PageCall};
    use serde_json::json;

    fn session_with(config: E2e2dConfig) -> (Session, Arc<FakePage>, MemoryNarration) {
        let page = Arc::new(FakePage::new());
        let narration = MemoryNarration::new();
        let session = Session::new(
            "sign up flow",
            "desc",
            Arc::new(config),
            page.clone(),
            Arc::new(narration.clone()),
        );
        (session, page, narration)
    }

    #[test]
    fn test_output_folder_name_sanitizes() {
        assert_eq!(
            output_folder_name(Path::new("docs"), "sign up/flow"),
            PathBuf::from("docs/sign_up_flow")
        );
    }

    #[test]
    fn test_silent_unless_error_buffers() {
        let (mut session, _, narration) = session_with(E2e2dConfig {
            silent_unless_error: true,
            ..Default::default()
        });
        session.print_msg("hidden for now");
        assert!(narration.lines().is_empty());
        assert_eq!(session.deferred_output(), ["hidden for now"]);

        session.flush_deferred();
        assert_eq!(narration.lines(), vec!["hidden for now"]);
        assert!(session.deferred_output().is_empty());
    }

    #[tokio::test]
    async fn test_screenshot_skipped_while_not_recording() {
        let (mut session, page, _) = session_with(E2e2dConfig::default());
        session.stop_recording();
        assert_eq!(session.take_screenshot("navTo", "before").await.unwrap(), "");

        session.start_recording();
        session.advance();
        assert_eq!(
            session.take_screenshot("navTo", "before").await.unwrap(),
            "1_navTo_before.png"
        );
        assert_eq!(
            page.screenshots(),
            vec![PathBuf::from("e2e2documentation/sign_up_flow/1_navTo_before.png")]
        );
    }

    #[tokio::test]
    async fn test_highlight_respects_config() {
        let (session, page, _) = session_with(E2e2dConfig {
            highlight: false,
            ..Default::default()
        });
        session.highlight("#name", true).await.unwrap();
        session.de_highlight("#name", true).await.unwrap();
        assert!(page.calls().is_empty());

        let (session, page, _) = session_with(E2e2dConfig::default());
        session.highlight("", true).await.unwrap();
        session.highlight("#name", false).await.unwrap();
        assert!(page.calls().is_empty());
        session.highlight("#name", true).await.unwrap();
        assert!(matches!(page.calls().as_slice(), [PageCall::Evaluate(_)]));
    }

    #[test]
    fn test_handle_error_narrates_and_wraps() {
        let (mut session, _, narration) = session_with(E2e2dConfig::default());
        let error = session.handle_error(PageError::Timeout("load".into()), "navTo", "'https://x'");
        assert_eq!(
            narration.lines(),
            vec![
                "\t\tYou navTo 'https://x' failed",
                "\t\t\twith error",
                "Timeout waiting for: load"
            ]
        );
        assert!(matches!(error, E2e2dError::Delegated { ref action, .. } if action == "navTo"));
    }

    #[test]
    fn test_interpolate() {
        let mut data = BTreeMap::new();
        data.insert("user".to_string(), json!("ada"));
        data.insert("port".to_string(), json!(8080));
        assert_eq!(
            interpolate("http://${user}.test:${port}/${missing}", &data),
            "http://ada.test:8080/${missing}"
        );
    }

    #[test]
    fn test_add_step_goes_to_recording() {
        let (mut session, _, _) = session_with(E2e2dConfig::default());
        session.add_step(Step::new(StepKind::Comment, "", "hello"));
        assert_eq!(session.recording().len(), 1);
    }
}
