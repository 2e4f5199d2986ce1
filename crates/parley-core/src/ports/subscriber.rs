//! Subscriber port - 受信メッセージの受け手
//!
//! コールバックは spawn されたタスクから呼ばれ、別メッセージ分と並行しうる。
//! 実装側で自分の状態を守ること。
//! `Err`（や panic）が他の購読者に影響することはない:
//! - `on_next` の失敗はメッセージ付きで同じ購読者の `on_error` へ
//! - `on_error` の失敗はログのみ
//! - `on_completed` の失敗は `stop_receiving` が報告する

use async_trait::async_trait;

use crate::domain::{BrokerError, Message, SubscriberError};

#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    async fn on_next(&self, message: &Message) -> Result<(), SubscriberError>;

    /// `message` is the one being processed when the error happened, if any.
    async fn on_error(
        &self,
        error: &BrokerError,
        message: Option<&Message>,
    ) -> Result<(), SubscriberError>;

    /// Called once, after receiving stopped and all in-flight work drained.
    async fn on_completed(&self) -> Result<(), SubscriberError>;

    /// Name used in logs and errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
