//! Playwright browser automation
//!
//! [`PlaywrightPage`] keeps one Node process alive for the whole run. The
//! process runs a small bridge script that owns the browser and answers
//! JSON-lines requests on stdin/stdout:
//!
//! ```text
//! -> {"id": 7, "op": "fill", "args": {"selector": "#name", "value": "Ada"}}
//! <- {"id": 7, "ok": true, "result": null}
//! ```
//!
//! Replies are matched to requests by id, so a navigating click can have
//! `waitForNavigation` and `click` in flight together.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use crate::config::PlaywrightConfig;
use crate::error::{PageError, PageResult};
use crate::page::{ElementHandle, Page};

const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);
const EXIT_GRACE: Duration = Duration::from_secs(2);

const BRIDGE_SCRIPT: &str = r#"
const playwright = require(require.resolve('playwright', { paths: [process.cwd()] }));
const readline = require('readline');

const launch = JSON.parse(process.env.E2E2D_LAUNCH || '{}');
const send = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');
const failure = (error) => String((error && error.message) || error);

(async () => {
  const browser = await playwright[launch.browser || 'chromium'].launch({
    headless: launch.headless,
    slowMo: launch.slowMo,
    devtools: launch.devtools,
  });
  const page = await browser.newPage({
    viewport: { width: launch.width, height: launch.height },
  });

  const ops = {
    navigate: (a) => page.goto(a.url).then(() => null),
    click: (a) => page.click(a.selector).then(() => null),
    fill: (a) => page.fill(a.selector, a.value).then(() => null),
    querySelector: async (a) => (await page.$(a.selector)) !== null,
    screenshot: (a) => page.screenshot({ path: a.path }).then(() => null),
    evaluate: (a) => page.evaluate(a.script),
    waitForNavigation: (a) =>
      page.waitForNavigation({ waitUntil: 'networkidle', timeout: a.timeoutMs }).then(() => null),
    close: () => browser.close().then(() => null),
  };

  readline.createInterface({ input: process.stdin }).on('line', (line) => {
    const req = JSON.parse(line);
    Promise.resolve()
      .then(() => ops[req.op](req.args || {}))
      .then((result) => send({ id: req.id, ok: true, result: result === undefined ? null : result }))
      .catch((error) => send({ id: req.id, ok: false, error: failure(error) }))
      .then(() => { if (req.op === 'close') process.exit(0); });
  });

  send({ id: 0, ok: true, result: null });
})().catch((error) => {
  send({ id: 0, ok: false, error: failure(error) });
  process.exit(1);
});
"#;

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<BridgeReply>>>>;

#[derive(Serialize)]
struct BridgeRequest<'a> {
    id: u64,
    op: &'a str,
    args: Value,
}

#[derive(Debug, Deserialize)]
struct BridgeReply {
    id: u64,
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

impl BridgeReply {
    fn into_result(self) -> PageResult<Value> {
        if self.ok {
            Ok(self.result)
        } else {
            Err(PageError::Playwright(
                self.error.unwrap_or_else(|| "unknown bridge error".to_string()),
            ))
        }
    }
}

/// A browser page driven through a Playwright bridge process
pub struct PlaywrightPage {
    stdin: AsyncMutex<ChildStdin>,
    child: AsyncMutex<Child>,
    pending: Pending,
    /// Cleared by the reader task once the bridge stdout is gone
    alive: Arc<AtomicBool>,
    next_id: AtomicU64,
    closed: AtomicBool,
    _bridge_dir: tempfile::TempDir,
}

impl PlaywrightPage {
    /// Launch the browser and open one page
    pub async fn launch(config: &PlaywrightConfig) -> PageResult<Self> {
        Self::check_playwright_installed().await?;

        let bridge_dir = tempfile::tempdir()?;
        let script_path = bridge_dir.path().join("bridge.js");
        tokio::fs::write(&script_path, BRIDGE_SCRIPT).await?;

        let launch = json!({
            "browser": config.browser.as_str(),
            "headless": config.headless,
            "slowMo": config.slow_mo,
            "devtools": config.dev_tools,
            "width": config.screen_x,
            "height": config.screen_y,
        });

        debug!("Starting Playwright bridge: {}", script_path.display());
        let mut child = Command::new("node")
            .arg(&script_path)
            .env("E2E2D_LAUNCH", launch.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PageError::Protocol("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PageError::Protocol("bridge stdout unavailable".to_string()))?;

        let pending: Pending = Arc::default();
        let alive = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = oneshot::channel();
        pending.lock().insert(0, ready_tx);
        tokio::spawn(read_replies(stdout, Arc::clone(&pending), Arc::clone(&alive)));

        let page = Self {
            stdin: AsyncMutex::new(stdin),
            child: AsyncMutex::new(child),
            pending,
            alive,
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            _bridge_dir: bridge_dir,
        };

        match tokio::time::timeout(LAUNCH_TIMEOUT, ready_rx).await {
            Ok(Ok(reply)) => {
                reply.into_result()?;
            }
            Ok(Err(_)) => return Err(PageError::Closed),
            Err(_) => return Err(PageError::Timeout("browser launch".to_string())),
        }

        info!(
            "Launched {} ({}x{}, headless: {})",
            config.browser.as_str(),
            config.screen_x,
            config.screen_y,
            config.headless
        );
        Ok(page)
    }

    /// Check if Playwright is installed
    async fn check_playwright_installed() -> PageResult<()> {
        let status = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(PageError::PlaywrightNotFound),
        }
    }

    async fn call(&self, op: &str, args: Value) -> PageResult<Value> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PageError::Closed);
        }
        self.send(op, args).await
    }

    async fn send(&self, op: &str, args: Value) -> PageResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        if !self.alive.load(Ordering::SeqCst) {
            self.pending.lock().remove(&id);
            return Err(PageError::Closed);
        }

        let mut line = serde_json::to_string(&BridgeRequest { id, op, args })?;
        line.push('\n');

        let written = {
            let mut stdin = self.stdin.lock().await;
            match stdin.write_all(line.as_bytes()).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = written {
            self.pending.lock().remove(&id);
            return Err(e.into());
        }

        debug!("Bridge request {} sent: {}", id, op);
        rx.await.map_err(|_| PageError::Closed)?.into_result()
    }

    async fn wait_for_exit(child: &mut Child) -> bool {
        match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Bridge exited with {}", status);
                true
            }
            Ok(Err(e)) => {
                warn!("Waiting for bridge failed: {}", e);
                true
            }
            Err(_) => false,
        }
    }
}

async fn read_replies(stdout: ChildStdout, pending: Pending, alive: Arc<AtomicBool>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match serde_json::from_str::<BridgeReply>(&line) {
                Ok(reply) => match pending.lock().remove(&reply.id) {
                    Some(tx) => {
                        let _ = tx.send(reply);
                    }
                    None => warn!("Bridge reply for unknown request {}", reply.id),
                },
                Err(_) => debug!("Bridge output: {}", line),
            },
            Ok(None) => break,
            Err(e) => {
                warn!("Reading bridge output failed: {}", e);
                break;
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
    // Dropping the senders fails every outstanding request with `Closed`.
    pending.lock().clear();
}

#[async_trait]
impl Page for PlaywrightPage {
    async fn navigate(&self, url: &str) -> PageResult<()> {
        self.call("navigate", json!({ "url": url })).await.map(|_| ())
    }

    async fn click(&self, selector: &str) -> PageResult<()> {
        self.call("click", json!({ "selector": selector }))
            .await
            .map(|_| ())
    }

    async fn fill(&self, selector: &str, value: &str) -> PageResult<()> {
        self.call("fill", json!({ "selector": selector, "value": value }))
            .await
            .map(|_| ())
    }

    async fn query_selector(&self, selector: &str) -> PageResult<Option<ElementHandle>> {
        let found = self
            .call("querySelector", json!({ "selector": selector }))
            .await?;
        Ok(found
            .as_bool()
            .unwrap_or(false)
            .then(|| ElementHandle::new(selector)))
    }

    async fn screenshot(&self, path: &Path) -> PageResult<()> {
        self.call("screenshot", json!({ "path": path.to_string_lossy() }))
            .await
            .map(|_| ())
    }

    async fn evaluate(&self, script: &str) -> PageResult<Value> {
        self.call("evaluate", json!({ "script": script })).await
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> PageResult<()> {
        self.call(
            "waitForNavigation",
            json!({ "timeoutMs": timeout.as_millis() as u64 }),
        )
        .await
        .map(|_| ())
    }

    async fn close(&self) -> PageResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Closing browser");
        let result = self.send("close", Value::Null).await;

        let mut child = self.child.lock().await;
        if !Self::wait_for_exit(&mut child).await {
            #[cfg(unix)]
            {
                use nix::sys::signal::{kill, Signal};
                use nix::unistd::Pid;

                if let Some(pid) = child.id() {
                    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
                }
            }
            if !Self::wait_for_exit(&mut child).await {
                warn!("Bridge ignored SIGTERM, killing it");
                let _ = child.kill().await;
            }
        }

        result.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_into_result() {
        let ok: BridgeReply = serde_json::from_str(r#"{"id":3,"ok":true,"result":"Ada"}"#).unwrap();
        assert_eq!(ok.into_result().unwrap(), json!("Ada"));

        let missing: BridgeReply = serde_json::from_str(r#"{"id":4,"ok":true}"#).unwrap();
        assert_eq!(missing.into_result().unwrap(), Value::Null);

        let failed: BridgeReply =
            serde_json::from_str(r#"{"id":5,"ok":false,"error":"Timeout 30000ms exceeded"}"#)
                .unwrap();
        assert!(matches!(
            failed.into_result(),
            Err(PageError::Playwright(msg)) if msg.contains("Timeout")
        ));
    }

    #[test]
    fn test_request_line_shape() {
        let line = serde_json::to_string(&BridgeRequest {
            id: 9,
            op: "fill",
            args: json!({ "selector": "#name", "value": "Ada" }),
        })
        .unwrap();
        assert_eq!(
            line,
            r##"{"id":9,"op":"fill","args":{"selector":"#name","value":"Ada"}}"##
        );
    }

    #[test]
    fn test_bridge_script_covers_page_ops() {
        for op in [
            "navigate",
            "click",
            "fill",
            "querySelector",
            "screenshot",
            "evaluate",
            "waitForNavigation",
            "close",
        ] {
            assert!(BRIDGE_SCRIPT.contains(&format!("{}:", op)), "missing op {}", op);
        }
    }
}
