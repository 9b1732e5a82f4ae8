//! Browser controller seam and console relay.
//!
//! - **mod**: the controller traits and console message plumbing
//! - **driver**: runs one bundle inside one fresh page
//! - **chrome**: headless Chrome implementation (feature `chrome`)

pub mod driver;

#[cfg(feature = "chrome")]
pub mod chrome;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;

pub use driver::{run_bundle, PageOutput, ENTRY_INVOCATION, PAGE_HTML};

/// Severity of a page console message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

impl ConsoleLevel {
    /// Map a console API type name (`log`, `warning`, `error`, ...) to a level.
    pub fn from_type(kind: &str) -> Self {
        match kind {
            "error" | "assert" => ConsoleLevel::Error,
            "warn" | "warning" => ConsoleLevel::Warn,
            "info" => ConsoleLevel::Info,
            "debug" | "trace" => ConsoleLevel::Debug,
            _ => ConsoleLevel::Log,
        }
    }
}

/// One message written to the page console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleMessage {
    pub level: ConsoleLevel,
    pub text: String,
}

impl ConsoleMessage {
    pub fn new(level: ConsoleLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }
}

/// Sending half held by a page implementation.
pub type ConsoleSender = mpsc::UnboundedSender<ConsoleMessage>;

/// Receiving half of a page's console stream.
///
/// The stream ends once the page drops its [`ConsoleSender`], which page
/// implementations do when they close.
#[derive(Debug)]
pub struct ConsoleSubscription {
    rx: mpsc::UnboundedReceiver<ConsoleMessage>,
}

impl ConsoleSubscription {
    pub fn channel() -> (ConsoleSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    pub async fn next(&mut self) -> Option<ConsoleMessage> {
        self.rx.recv().await
    }
}

/// Forward every message of `subscription` to the harness log at the
/// matching level. The task finishes when the stream ends and returns the
/// relayed messages.
pub fn spawn_relay(mut subscription: ConsoleSubscription) -> JoinHandle<Vec<ConsoleMessage>> {
    tokio::spawn(async move {
        let mut relayed = Vec::new();
        while let Some(message) = subscription.next().await {
            relay(&message);
            relayed.push(message);
        }
        relayed
    })
}

fn relay(message: &ConsoleMessage) {
    let text = message.text.as_str();
    match message.level {
        ConsoleLevel::Error => tracing::error!(target: "domrig::console", "{}", text),
        ConsoleLevel::Warn => tracing::warn!(target: "domrig::console", "{}", text),
        ConsoleLevel::Debug => tracing::debug!(target: "domrig::console", "{}", text),
        ConsoleLevel::Log | ConsoleLevel::Info => tracing::info!(target: "domrig::console", "{}", text),
    }
}

/// An isolated browser page.
#[async_trait]
pub trait Page: Send + Sync {
    /// Subscribe to console output produced from now on.
    async fn console(&self) -> Result<ConsoleSubscription>;

    /// Replace the document with `html`.
    async fn set_content(&self, html: &str) -> Result<()>;

    /// Evaluate a script or expression in the page, awaiting a returned promise.
    ///
    /// A page-side throw or rejection is reported as
    /// [`HarnessError::Execution`](crate::error::HarnessError::Execution);
    /// `undefined` comes back as `Null`.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Close the page and end its console stream.
    async fn close(&self) -> Result<()>;
}

/// A running browser process shared by every page of a suite.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn Page>>;

    async fn close(&self) -> Result<()>;
}

/// Starts a browser process.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn Browser>>;
}
