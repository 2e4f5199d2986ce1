//! Session port - ブローカーへの 1 接続 + 1 トランザクション
//!
//! [`Connector`] がセッションを開き、[`Session`] は 1 トランザクション内で
//! [`Command`] を実行して `commit` か `rollback` で終わる。
//! commit せずに drop したセッションは rollback と同じ扱い。

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Message, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Receive {
        queue: String,
        timeout: Duration,
    },
    BeginConversation {
        from: String,
        to: String,
        contract: String,
    },
    Send {
        message: Message,
    },
    EndConversation {
        conversation: Uuid,
    },
    EndConversationWithError {
        conversation: Uuid,
        code: i32,
        description: String,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Receive { .. } => "receive",
            Command::BeginConversation { .. } => "begin_conversation",
            Command::Send { .. } => "send",
            Command::EndConversation { .. } => "end_conversation",
            Command::EndConversationWithError { .. } => "end_conversation_with_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Message(Message),
    Conversation(Uuid),
    Done,
}

impl Reply {
    pub fn name(&self) -> &'static str {
        match self {
            Reply::Message(_) => "message",
            Reply::Conversation(_) => "conversation",
            Reply::Done => "done",
        }
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection and begin a transaction.
    async fn open(&self) -> Result<Box<dyn Session>, TransportError>;
}

#[async_trait]
pub trait Session: Send {
    async fn execute(&mut self, command: Command) -> Result<Reply, TransportError>;

    async fn commit(self: Box<Self>) -> Result<(), TransportError>;

    async fn rollback(self: Box<Self>) -> Result<(), TransportError>;
}
