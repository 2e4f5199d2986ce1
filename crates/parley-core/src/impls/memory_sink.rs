//! MemoryLogSink - ログを記録するだけの LogSink（テスト・デバッグ用）
//!
//! Clone は同じバッファを共有します。

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ports::{Category, Clock, LogSink, Severity, SystemClock};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub at: DateTime<Utc>,
    pub category: Category,
    pub severity: Severity,
    pub message: String,
}

#[derive(Clone)]
pub struct MemoryLogSink {
    records: Arc<Mutex<Vec<LogRecord>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            clock,
        }
    }

    fn records_mut(&self) -> MutexGuard<'_, Vec<LogRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records_mut().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records_mut()
            .iter()
            .map(|r| r.message.clone())
            .collect()
    }

    /// `severity` 以上のレコードのみ
    pub fn at_least(&self, severity: Severity) -> Vec<LogRecord> {
        self.records_mut()
            .iter()
            .filter(|r| r.severity >= severity)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.records_mut().clear();
    }
}

impl Default for MemoryLogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for MemoryLogSink {
    fn log(&self, message: &str, category: Category, severity: Severity) {
        let record = LogRecord {
            at: self.clock.now(),
            category,
            severity,
            message: message.to_string(),
        };
        self.records_mut().push(record);
    }
}

impl std::fmt::Debug for MemoryLogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLogSink")
            .field("records", &self.records_mut().len())
            .finish()
    }
}
