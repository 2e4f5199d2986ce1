//! Ports - エンジンと外部の境界
//!
//! - **Transport**: エンジンが呼ぶキュー操作
//! - **Session**: 接続 + トランザクション + コマンド（セッション型のトランスポート向け）
//! - **Subscriber**: 受信メッセージの受け手
//! - **LogSink**: 診断ログの出力先
//! - **Clock / IdGenerator**: 時刻と ID の差し替え口

pub mod clock;
pub mod id_generator;
pub mod log_sink;
pub mod session;
pub mod subscriber;
pub mod transport;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, RandomIds};
pub use self::log_sink::{Category, Diagnostics, LogSink, Severity};
pub use self::session::{Command, Connector, Reply, Session};
pub use self::subscriber::Subscriber;
pub use self::transport::Transport;
pub use crate::domain::{SubscriberError, TransportError};
