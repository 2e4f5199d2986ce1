//! ClientBuilder - BrokerClient の構築とワイヤリング
//!
//! # 設計
//! - Builder パターン
//! - 起動時検証（Fail-fast）: Transport が無ければ build() で失敗
//! - LogSink 省略時は `TracingLogSink`

use std::sync::Arc;

use crate::app::client::BrokerClient;
use crate::impls::TracingLogSink;
use crate::ports::{Diagnostics, LogSink, Transport};

/// ClientBuilder は BrokerClient を構築
///
/// # 使用例
/// ```ignore
/// let client = BrokerClient::builder()
///     .transport(Arc::new(SessionTransport::new(broker)))
///     .log_sink(Arc::new(MemoryLogSink::new()))
///     .build()?;
/// ```
#[derive(Default)]
pub struct ClientBuilder {
    transport: Option<Arc<dyn Transport>>,
    log_sink: Option<Arc<dyn LogSink>>,
}

/// BuildError はクライアント構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no transport configured; call .transport(..) before build()")]
    MissingTransport,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// キュー操作に使う Transport（必須）
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// 診断ログの出力先
    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// # 検証
    /// - transport() が呼ばれていなければ `BuildError::MissingTransport`
    pub fn build(self) -> Result<BrokerClient, BuildError> {
        let transport = self.transport.ok_or(BuildError::MissingTransport)?;
        let sink = self
            .log_sink
            .unwrap_or_else(|| Arc::new(TracingLogSink::new()));
        Ok(BrokerClient::new(transport, Diagnostics::new(sink)))
    }
}
