//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **SessionTransport**: Connector を操作ごとのトランザクションで包む Transport
//! - **InMemoryBroker**: 開発・テスト用のトランザクショナルなブローカー（Connector）
//! - **TracingLogSink**: `tracing` へ転送する LogSink（デフォルト）
//! - **MemoryLogSink**: ログを記録するだけの LogSink（テスト用）
//!
//! # 本番用実装
//! 実際のブローカーへの Connector は別クレートに配置します。

pub mod inmem_broker;
pub mod memory_sink;
pub mod session_transport;
pub mod tracing_sink;

pub use self::inmem_broker::InMemoryBroker;
pub use self::memory_sink::{LogRecord, MemoryLogSink};
pub use self::session_transport::SessionTransport;
pub use self::tracing_sink::TracingLogSink;
