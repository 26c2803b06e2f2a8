//! Chain executor: runs entries in order, stops at the first failure and
//! always hands the recording to the trace sink before releasing the page

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{debug, error, info, warn};

use crate::config::{AfterPrecondition, E2e2dConfig, FailurePolicy};
use crate::error::{display_value, E2e2dError, E2e2dResult, ErrorKind};
use crate::narration::{console_text, NarrationSink, StdoutNarration};
use crate::page::Page;
use crate::recording::Recording;
use crate::session::{output_folder_name, Session};
use crate::trace::{FsTraceSink, TraceSink};

/// Something a chain can run against the session
#[async_trait]
pub trait Action: Send + Sync {
    async fn run(&self, session: &mut Session) -> E2e2dResult<()>;
}

/// A closure as an [`Action`]; see [`action`] and [`fn_action`].
pub struct FnAction<F>(F);

#[async_trait]
impl<F> Action for FnAction<F>
where
    F: for<'a> Fn(&'a mut Session) -> BoxFuture<'a, E2e2dResult<()>> + Send + Sync,
{
    async fn run(&self, session: &mut Session) -> E2e2dResult<()> {
        (self.0)(session).await
    }
}

pub fn fn_action<F>(f: F) -> Arc<dyn Action>
where
    F: for<'a> Fn(&'a mut Session) -> BoxFuture<'a, E2e2dResult<()>> + Send + Sync + 'static,
{
    Arc::new(FnAction(f))
}

/// A bare action entry from a closure:
///
/// ```ignore
/// action(|s| Box::pin(async move { s.nav_to("https://example.test", "").await }))
/// ```
pub fn action<F>(f: F) -> Entry
where
    F: for<'a> Fn(&'a mut Session) -> BoxFuture<'a, E2e2dResult<()>> + Send + Sync + 'static,
{
    Entry::Action(fn_action(f))
}

/// Several actions run one after the other as one
#[derive(Clone, Default)]
pub struct Steps(Vec<Arc<dyn Action>>);

impl Steps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, action: impl Action + 'static) -> Self {
        self.0.push(Arc::new(action));
        self
    }

    pub fn push(&mut self, action: Arc<dyn Action>) {
        self.0.push(action);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[async_trait]
impl Action for Steps {
    async fn run(&self, session: &mut Session) -> E2e2dResult<()> {
        for action in &self.0 {
            action.run(session).await?;
        }
        Ok(())
    }
}

/// A named, reusable sub-chain. Unless `record_steps` is set, only its
/// `followStepsIn` marker reaches the recording; the action still runs.
#[derive(Clone)]
pub struct Precondition {
    pub name: String,
    pub action: Arc<dyn Action>,
    pub record_steps: bool,
}

impl Precondition {
    pub fn new(name: impl Into<String>, action: Arc<dyn Action>) -> Self {
        Self {
            name: name.into(),
            action,
            record_steps: false,
        }
    }

    pub fn record_steps(mut self, record: bool) -> Self {
        self.record_steps = record;
        self
    }
}

pub fn precondition<F>(name: impl Into<String>, f: F) -> Precondition
where
    F: for<'a> Fn(&'a mut Session) -> BoxFuture<'a, E2e2dResult<()>> + Send + Sync + 'static,
{
    Precondition::new(name, fn_action(f))
}

#[derive(Clone)]
pub enum Entry {
    Action(Arc<dyn Action>),
    Precondition(Precondition),
}

impl Entry {
    pub fn action(action: impl Action + 'static) -> Self {
        Entry::Action(Arc::new(action))
    }
}

impl From<Precondition> for Entry {
    fn from(precondition: Precondition) -> Self {
        Entry::Precondition(precondition)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Succeeded,
    Failed {
        kind: ErrorKind,
        /// Index of the entry that failed
        entry: usize,
        message: String,
    },
}

/// Result of one run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub name: String,
    pub outcome: RunOutcome,
    pub entries_run: usize,
    pub duration_ms: u64,
    pub trace_path: Option<PathBuf>,
    pub recording: Recording,
}

impl RunReport {
    pub fn success(&self) -> bool {
        self.outcome == RunOutcome::Succeeded
    }
}

pub struct Runner {
    config: Arc<E2e2dConfig>,
    narration: Arc<dyn NarrationSink>,
    trace: Box<dyn TraceSink>,
}

impl Runner {
    /// Narrates to stdout and writes traces to the filesystem
    pub fn new(config: E2e2dConfig) -> Self {
        Self {
            config: Arc::new(config),
            narration: Arc::new(StdoutNarration),
            trace: Box::new(FsTraceSink),
        }
    }

    pub fn with_narration(mut self, sink: impl NarrationSink + 'static) -> Self {
        self.narration = Arc::new(sink);
        self
    }

    pub fn with_trace_sink(mut self, sink: impl TraceSink + 'static) -> Self {
        self.trace = Box::new(sink);
        self
    }

    pub fn config(&self) -> &E2e2dConfig {
        &self.config
    }

    /// Run `chain` against `page`. The page is closed exactly once, after the
    /// trace was flushed, whether the chain passed or failed.
    pub async fn in_order_to(
        &self,
        name: &str,
        desc: &str,
        page: Arc<dyn Page>,
        chain: Vec<Entry>,
    ) -> E2e2dResult<RunReport> {
        let start = Instant::now();
        let prefix = output_folder_name(&self.config.output_folder, name);

        if self.config.generate_doc {
            if let Err(e) = self.trace.prepare(&prefix).await {
                release(page.as_ref()).await;
                return Err(e);
            }
        }

        let mut session = Session::new(
            name,
            desc,
            Arc::clone(&self.config),
            Arc::clone(&page),
            Arc::clone(&self.narration),
        );
        session.print_msg(format!("\tName: {}\n\tDesc: {}", name, desc));
        info!("Running '{}' ({} entries)", name, chain.len());

        let mut failure: Option<(usize, E2e2dError)> = None;
        let mut entries_run = 0;
        for (index, entry) in chain.iter().enumerate() {
            entries_run += 1;
            if let Err(e) = self.run_entry(&mut session, entry).await {
                failure = Some((index, e));
                break;
            }
        }

        if let Some((index, e)) = &failure {
            error!("'{}' failed at entry {}: {}", name, index, e);
            session.flush_deferred();
            for line in failure_narration(e, self.config.color) {
                session.emit_now(&line);
            }
        }

        let flushed = if self.config.generate_doc {
            Some(self.trace.flush(&prefix, session.recording()).await)
        } else {
            None
        };
        release(page.as_ref()).await;

        let trace_path = match flushed {
            Some(Ok(path)) => Some(path),
            Some(Err(e)) if failure.is_none() => return Err(e),
            Some(Err(e)) => {
                warn!("Writing the trace of '{}' failed: {}", name, e);
                None
            }
            None => None,
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let recording = session.recording().clone();

        let outcome = match failure {
            None => {
                info!(
                    "✓ {} ({} steps, {} ms)",
                    name,
                    recording.len(),
                    duration_ms
                );
                RunOutcome::Succeeded
            }
            Some((_, e)) if self.config.failure_policy == FailurePolicy::Propagate => {
                return Err(e);
            }
            Some((entry, e)) => RunOutcome::Failed {
                kind: e.kind(),
                entry,
                message: e.to_string(),
            },
        };

        Ok(RunReport {
            name: name.to_string(),
            outcome,
            entries_run,
            duration_ms,
            trace_path,
            recording,
        })
    }

    /// Every entry starts with recording on; only a precondition body can
    /// run hidden.
    async fn run_entry(&self, session: &mut Session, entry: &Entry) -> E2e2dResult<()> {
        session.start_recording();
        match entry {
            Entry::Action(action) => action.run(session).await,
            Entry::Precondition(pre) => {
                debug!("Following steps in '{}' (recorded: {})", pre.name, pre.record_steps);
                session.follow_steps_in(&pre.name);
                if !pre.record_steps {
                    session.stop_recording();
                }
                let result = pre.action.run(session).await;
                if self.config.after_precondition == AfterPrecondition::Restore {
                    session.start_recording();
                }
                result
            }
        }
    }
}

async fn release(page: &dyn Page) {
    if let Err(e) = page.close().await {
        warn!("Closing the page failed: {}", e);
    }
}

/// Lines printed for the failure that ended a run
pub fn failure_narration(error: &E2e2dError, color: bool) -> Vec<String> {
    match error {
        E2e2dError::Comparison {
            trail,
            got,
            expected,
            ..
        } => {
            let mut words = trail.msg.clone();
            words.push("|".to_string());
            words.push(format!("Got: '{}'", display_value(got)));
            words.push(format!("Expected: '{}'", display_value(expected)));
            vec![console_text(false, color, &words)]
        }
        E2e2dError::Predicate { trail, .. } => vec![console_text(false, color, &trail.msg)],
        other => {
            let mut lines = vec![format!("Error: {}", other)];
            let mut source = std::error::Error::source(other);
            while let Some(cause) = source {
                lines.push(format!("\tcaused by: {}", cause));
                source = cause.source();
            }
            lines
        }
    }
}
