//! MessageKind - 予約済みのメッセージ種別
//!
//! ブローカー自身が出す制御メッセージは 2 種類。それ以外はすべてアプリケーションデータ。

/// Kind of the message the broker emits when a conversation fails on the far side.
pub const ERROR_KIND: &str = "http://schemas.microsoft.com/SQL/ServiceBroker/Error";

/// Kind of the message the broker emits when the far side ends a conversation.
pub const END_CONVERSATION_KIND: &str = "http://schemas.microsoft.com/SQL/ServiceBroker/EndDialog";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Error,
    EndConversation,
    Data,
}

impl MessageKind {
    pub fn of(kind: &str) -> Self {
        match kind {
            ERROR_KIND => MessageKind::Error,
            END_CONVERSATION_KIND => MessageKind::EndConversation,
            _ => MessageKind::Data,
        }
    }
}
