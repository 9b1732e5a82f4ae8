//! Headless Chrome backend.
//!
//! `headless_chrome` is blocking, so every protocol call runs on the blocking
//! pool. Page scripts are wrapped so that results and exceptions both come
//! back as a JSON string; console output is captured by a small in-page shim
//! and drained after each evaluation.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;

use super::{Browser, BrowserLauncher, ConsoleLevel, ConsoleMessage, ConsoleSender, ConsoleSubscription, Page};
use crate::error::{HarnessError, Result};

const CONSOLE_SHIM: &str = r#"(() => {
  if (window.__domrig_console) return;
  window.__domrig_console = [];
  for (const type of ['log', 'info', 'warn', 'error', 'debug', 'trace', 'dir', 'table', 'assert']) {
    const original = console[type].bind(console);
    console[type] = (...args) => {
      const shown = type !== 'assert' ? args : args[0] ? null : ['Assertion failed:', ...args.slice(1)];
      if (shown) window.__domrig_console.push({ type, text: shown.map(String).join(' ') });
      original(...args);
    };
  }
})()"#;

const CONSOLE_DRAIN: &str =
    "JSON.stringify(window.__domrig_console ? window.__domrig_console.splice(0) : [])";

/// Launches a local headless Chrome.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    args: Vec<String>,
    idle_timeout: Duration,
}

impl Default for ChromeLauncher {
    fn default() -> Self {
        Self {
            args: vec![
                "--disable-gpu".to_string(),
                "--disable-dev-shm-usage".to_string(),
                "--disable-extensions".to_string(),
            ],
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl ChromeLauncher {
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn Browser>> {
        let args = self.args.clone();
        let idle_timeout = self.idle_timeout;
        let browser = blocking(move || {
            let args: Vec<&OsStr> = args.iter().map(OsStr::new).collect();
            let options = headless_chrome::LaunchOptionsBuilder::default()
                .headless(true)
                .idle_browser_timeout(idle_timeout)
                .args(args)
                .build()
                .map_err(|e| HarnessError::Browser(e.to_string()))?;
            headless_chrome::Browser::new(options).map_err(|e| HarnessError::Browser(e.to_string()))
        })
        .await?;
        Ok(Box::new(ChromeBrowser {
            inner: Mutex::new(Some(browser)),
        }))
    }
}

/// A running Chrome process. Dropping the last handle shuts it down.
pub struct ChromeBrowser {
    inner: Mutex<Option<headless_chrome::Browser>>,
}

#[async_trait]
impl Browser for ChromeBrowser {
    async fn new_page(&self) -> Result<Box<dyn Page>> {
        let browser = self
            .inner
            .lock()
            .clone()
            .ok_or_else(|| HarnessError::Browser("browser is closed".to_string()))?;
        let tab = blocking(move || browser.new_tab().map_err(|e| HarnessError::Browser(e.to_string()))).await?;
        Ok(Box::new(ChromePage {
            tab,
            console: Mutex::new(None),
        }))
    }

    async fn close(&self) -> Result<()> {
        let browser = self.inner.lock().take();
        if let Some(browser) = browser {
            blocking(move || {
                drop(browser);
                Ok(())
            })
            .await?;
        }
        Ok(())
    }
}

struct ChromePage {
    tab: Arc<headless_chrome::Tab>,
    console: Mutex<Option<ConsoleSender>>,
}

#[derive(Deserialize)]
struct Outcome {
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct CapturedMessage {
    #[serde(rename = "type")]
    kind: String,
    text: String,
}

impl ChromePage {
    /// Evaluate `expression` and return its raw string result.
    async fn eval_string(&self, expression: String) -> Result<String> {
        let tab = Arc::clone(&self.tab);
        let remote = blocking(move || {
            tab.evaluate(&expression, true)
                .map_err(|e| HarnessError::Browser(e.to_string()))
        })
        .await?;
        match remote.value {
            Some(Value::String(s)) => Ok(s),
            other => Err(HarnessError::Browser(format!(
                "unexpected evaluation result: {:?}",
                other
            ))),
        }
    }

    async fn drain_console(&self) -> Result<()> {
        let raw = self.eval_string(CONSOLE_DRAIN.to_string()).await?;
        let captured: Vec<CapturedMessage> =
            serde_json::from_str(&raw).map_err(|e| HarnessError::Browser(e.to_string()))?;
        if let Some(tx) = self.console.lock().as_ref() {
            for message in captured {
                // receiver gone means nobody listens any more
                let _ = tx.send(ConsoleMessage::new(ConsoleLevel::from_type(&message.kind), message.text));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Page for ChromePage {
    async fn console(&self) -> Result<ConsoleSubscription> {
        let (tx, subscription) = ConsoleSubscription::channel();
        *self.console.lock() = Some(tx);
        Ok(subscription)
    }

    async fn set_content(&self, html: &str) -> Result<()> {
        let html = serde_json::to_string(html).map_err(|e| HarnessError::Browser(e.to_string()))?;
        self.eval_string(format!(
            "{}; document.body.innerHTML = {}; ''",
            CONSOLE_SHIM, html
        ))
        .await?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let raw = self.eval_string(wrap_script(script)?).await;
        self.drain_console().await?;
        let outcome: Outcome =
            serde_json::from_str(&raw?).map_err(|e| HarnessError::Browser(e.to_string()))?;
        if outcome.ok {
            Ok(outcome.value)
        } else {
            Err(HarnessError::Execution {
                message: outcome.message,
            })
        }
    }

    async fn close(&self) -> Result<()> {
        self.console.lock().take();
        let tab = Arc::clone(&self.tab);
        blocking(move || {
            tab.close(true)
                .map(|_| ())
                .map_err(|e| HarnessError::Browser(e.to_string()))
        })
        .await
    }
}

/// Evaluate `script` with indirect eval so top-level declarations become
/// globals, await the result, and report it or the thrown error as JSON.
fn wrap_script(script: &str) -> Result<String> {
    let source = serde_json::to_string(script).map_err(|e| HarnessError::Browser(e.to_string()))?;
    Ok(format!(
        r#"(async () => {{
  try {{
    const value = await (0, eval)({source});
    let json = null;
    try {{ json = value === undefined ? null : JSON.parse(JSON.stringify(value)); }} catch (_) {{ json = String(value); }}
    return JSON.stringify({{ ok: true, value: json }});
  }} catch (e) {{
    return JSON.stringify({{ ok: false, message: String(e) }});
  }}
}})()"#
    ))
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| HarnessError::Browser(format!("browser task failed: {}", e)))?
}
