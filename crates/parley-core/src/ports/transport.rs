//! Transport port - エンジンが呼ぶキュー操作
//!
//! 呼び出しごとに 1 作業単位: 戻る前に commit するか完全に rollback する。
//! 独立したタスクから並行に呼ばれてもよい。

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Message, TransportError};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Take at most one message off `queue`, waiting up to `timeout`.
    ///
    /// Returns `Message::empty()` when nothing arrived in time.
    async fn receive(&self, queue: &str, timeout: Duration) -> Result<Message, TransportError>;

    /// Open a conversation from service `from` to service `to` under `contract`.
    async fn begin_conversation(
        &self,
        from: &str,
        to: &str,
        contract: &str,
    ) -> Result<Uuid, TransportError>;

    /// Send `message` on `message.conversation()`.
    async fn send(&self, message: &Message) -> Result<(), TransportError>;

    async fn end_conversation(&self, conversation: Uuid) -> Result<(), TransportError>;

    /// End a conversation, telling the far side why.
    async fn end_conversation_with_error(
        &self,
        conversation: Uuid,
        code: i32,
        description: &str,
    ) -> Result<(), TransportError>;
}
