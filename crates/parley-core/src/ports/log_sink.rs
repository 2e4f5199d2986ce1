//! LogSink port - エンジンの診断出力
//!
//! 観測専用: sink が何をしても制御フローには影響しない。

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Subscriptions, conversations, shutdown.
    Client,
    /// The receive loop and per-message dispatch.
    Polling,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Client => "BrokerClient",
            Category::Polling => "BrokerClientPolling",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait LogSink: Send + Sync {
    fn log(&self, message: &str, category: Category, severity: Severity);
}

/// Shared handle to a [`LogSink`] with per-severity helpers.
#[derive(Clone)]
pub struct Diagnostics {
    sink: Arc<dyn LogSink>,
}

impl Diagnostics {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    pub fn log(&self, message: &str, category: Category, severity: Severity) {
        self.sink.log(message, category, severity);
    }

    pub fn trace(&self, category: Category, message: impl AsRef<str>) {
        self.log(message.as_ref(), category, Severity::Trace);
    }

    pub fn debug(&self, category: Category, message: impl AsRef<str>) {
        self.log(message.as_ref(), category, Severity::Debug);
    }

    pub fn info(&self, category: Category, message: impl AsRef<str>) {
        self.log(message.as_ref(), category, Severity::Info);
    }

    pub fn warn(&self, category: Category, message: impl AsRef<str>) {
        self.log(message.as_ref(), category, Severity::Warning);
    }

    pub fn error(&self, category: Category, message: impl AsRef<str>) {
        self.log(message.as_ref(), category, Severity::Error);
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics").finish_non_exhaustive()
    }
}
