//! Domain - 値型（メッセージ, 予約済み種別, エラー, 停止結果）

pub mod errors;
pub mod kind;
pub mod message;
pub mod shutdown;

pub use self::errors::{BrokerError, Callback, ShutdownStep, SubscriberError, TransportError};
pub use self::kind::{END_CONVERSATION_KIND, ERROR_KIND, MessageKind};
pub use self::message::Message;
pub use self::shutdown::{ShutdownError, ShutdownResult};
