//! Where a finished (or aborted) run's recording goes

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::error::E2e2dResult;
use crate::recording::Recording;
use crate::session::TRACE_FILE_NAME;

#[async_trait]
pub trait TraceSink: Send + Sync {
    /// Called once before the first entry runs
    async fn prepare(&self, dir: &Path) -> E2e2dResult<()>;

    /// Called exactly once per run, after success or the first failure
    async fn flush(&self, dir: &Path, recording: &Recording) -> E2e2dResult<PathBuf>;
}

/// Writes `<dir>/e2e2d.json`
#[derive(Debug, Default, Clone, Copy)]
pub struct FsTraceSink;

#[async_trait]
impl TraceSink for FsTraceSink {
    async fn prepare(&self, dir: &Path) -> E2e2dResult<()> {
        tokio::fs::create_dir_all(dir).await?;
        Ok(())
    }

    async fn flush(&self, dir: &Path, recording: &Recording) -> E2e2dResult<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(TRACE_FILE_NAME);
        tokio::fs::write(&path, recording.to_json_pretty()?).await?;
        info!("Trace written to: {}", path.display());
        Ok(path)
    }
}

/// Keeps every flushed recording in memory; clones share the buffer.
#[derive(Debug, Default, Clone)]
pub struct MemoryTraceSink {
    flushed: Arc<Mutex<Vec<Recording>>>,
}

impl MemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flushed(&self) -> Vec<Recording> {
        self.flushed.lock().clone()
    }
}

#[async_trait]
impl TraceSink for MemoryTraceSink {
    async fn prepare(&self, _dir: &Path) -> E2e2dResult<()> {
        Ok(())
    }

    async fn flush(&self, dir: &Path, recording: &Recording) -> E2e2dResult<PathBuf> {
        self.flushed.lock().push(recording.clone());
        Ok(dir.join(TRACE_FILE_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{Step, StepKind};

    #[tokio::test]
    async fn test_fs_sink_writes_pretty_json() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = dir.path().join("sign_up");
        let mut recording = Recording::new();
        recording.add_step(Step::new(StepKind::Comment, "", "hello"));

        FsTraceSink.prepare(&run_dir).await.unwrap();
        let path = FsTraceSink.flush(&run_dir, &recording).await.unwrap();

        assert_eq!(path, run_dir.join("e2e2d.json"));
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, recording.to_json_pretty().unwrap());
        assert_eq!(Recording::from_json(&written).unwrap(), recording);
    }
}
