//! parley-core
//!
//! 会話指向のトランザクショナルなメッセージキューに対するクライアントエンジン。
//!
//! # モジュール構成
//! - **domain**: 値型（Message, 予約済みメッセージ種別, エラー, ShutdownResult）
//! - **ports**: 抽象化レイヤー（Transport, Connector/Session, Subscriber, LogSink, Clock, IdGenerator）
//! - **app**: エンジン（購読者レジストリ, 受信ループ, 配信, 停止プロトコル, BrokerClient）
//! - **impls**: 実装（SessionTransport, InMemoryBroker, TracingLogSink, MemoryLogSink）
//!
//! # 使用例
//! ```ignore
//! let broker = InMemoryBroker::new();
//! broker.bind_service("//demo/Target", "target_queue");
//!
//! let client = BrokerClient::builder()
//!     .transport(Arc::new(SessionTransport::new(broker)))
//!     .build()?;
//! let _subscription = client.subscribe(Arc::new(MySubscriber));
//! let running = client.start_receiving("target_queue")?;
//! // ...
//! let result = running.stop_receiving().await?;
//! result.into_result()?;
//! ```

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;

pub use crate::app::{
    BrokerClient, BuildError, ClientBuilder, ClientStatus, RECEIVE_TIMEOUT, RunningClient,
    Subscription,
};
pub use crate::domain::{
    BrokerError, Message, MessageKind, ShutdownError, ShutdownResult, SubscriberError,
    TransportError,
};
pub use crate::ports::{Connector, LogSink, Subscriber, Transport};
