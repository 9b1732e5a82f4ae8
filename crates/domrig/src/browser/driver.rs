//! Runs one generated bundle inside one fresh page.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::{spawn_relay, Browser, ConsoleMessage, Page};
use crate::error::Result;

/// Document every page starts from; the entry function mounts into `<main>`.
pub const PAGE_HTML: &str = "<main></main>";

/// Expression that runs the bundle's exported entry function.
pub const ENTRY_INVOCATION: &str = "test(document.querySelector('main'))";

/// How long to wait for console output still in flight after close.
const RELAY_GRACE: Duration = Duration::from_secs(1);

/// What a successful page run produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageOutput {
    /// Value the entry function resolved to, `Null` for `undefined`.
    pub result: Value,
    pub console: Vec<ConsoleMessage>,
}

/// Closes the page if the run is dropped before reaching its explicit close,
/// e.g. when a timeout cancels it.
struct PageGuard {
    page: Arc<dyn Page>,
    closed: bool,
}

impl PageGuard {
    fn new(page: Box<dyn Page>) -> Self {
        Self {
            page: Arc::from(page),
            closed: false,
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.page.close().await
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let page = Arc::clone(&self.page);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = page.close().await {
                    tracing::warn!(target: "domrig::browser", "failed to close abandoned page: {}", e);
                }
            });
        }
    }
}

/// Load `code` into a new page of `browser` and invoke its entry function.
///
/// Console output is relayed to the log while the page lives. The page is
/// closed exactly once whatever happens; a close failure is reported only
/// when the run itself succeeded.
pub async fn run_bundle(browser: &dyn Browser, code: &str) -> Result<PageOutput> {
    let mut guard = PageGuard::new(browser.new_page().await?);

    let relay = match guard.page.console().await {
        Ok(subscription) => spawn_relay(subscription),
        Err(e) => {
            if let Err(close_err) = guard.close().await {
                tracing::warn!(target: "domrig::browser", "failed to close page: {}", close_err);
            }
            return Err(e);
        }
    };
    let outcome = drive(guard.page.as_ref(), code).await;
    let closed = guard.close().await;
    let console = finish_relay(relay).await;

    match (outcome, closed) {
        (Ok(result), Ok(())) => Ok(PageOutput { result, console }),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(e), closed) => {
            if let Err(close_err) = closed {
                tracing::warn!(target: "domrig::browser", "failed to close page: {}", close_err);
            }
            Err(e)
        }
    }
}

type Relay = tokio::task::JoinHandle<Vec<ConsoleMessage>>;

async fn drive(page: &dyn Page, code: &str) -> Result<Value> {
    page.set_content(PAGE_HTML).await?;
    page.evaluate(code).await?;
    let result = page.evaluate(ENTRY_INVOCATION).await?;

    if is_truthy(&result) {
        tracing::info!(target: "domrig::browser", "{}", display_value(&result));
    }
    Ok(result)
}

async fn finish_relay(mut relay: Relay) -> Vec<ConsoleMessage> {
    match tokio::time::timeout(RELAY_GRACE, &mut relay).await {
        Ok(Ok(messages)) => messages,
        Ok(Err(_)) => Vec::new(),
        Err(_) => {
            relay.abort();
            Vec::new()
        }
    }
}

/// JavaScript truthiness of a value that crossed the page boundary.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
