//! TracingLogSink - `tracing` へ転送する LogSink（デフォルト）
//!
//! category は `category` フィールドとして付与します。
//! subscriber の設定（EnvFilter など）はアプリケーション側で行います。

use crate::ports::{Category, LogSink, Severity};

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl TracingLogSink {
    pub fn new() -> Self {
        Self
    }
}

impl LogSink for TracingLogSink {
    fn log(&self, message: &str, category: Category, severity: Severity) {
        let category = category.as_str();
        match severity {
            Severity::Trace => tracing::trace!(category, "{message}"),
            Severity::Debug => tracing::debug!(category, "{message}"),
            Severity::Info => tracing::info!(category, "{message}"),
            Severity::Warning => tracing::warn!(category, "{message}"),
            Severity::Error => tracing::error!(category, "{message}"),
        }
    }
}
