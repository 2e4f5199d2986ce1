//! Errors - エラー型と分類
//!
//! - [`TransportError`]: キュー操作（とそのセッション）の失敗
//! - [`SubscriberError`]: 購読者のコールバック自身の失敗
//! - [`BrokerError`]: エンジンが報告するすべて（上の 2 つを包む）
//!
//! キャンセルは [`BrokerError::Cancelled`] で表します。
//! 根本原因が `Cancelled` のエラーはキャンセル扱いで、停止結果では失敗と区別されます。

use std::error::Error as StdError;

use thiserror::Error;
use uuid::Uuid;

/// Failure of a transport operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("failed to open connection: {0}")]
    Connect(String),

    #[error("failed to begin transaction: {0}")]
    Begin(String),

    #[error("command failed: {0}")]
    Execute(String),

    #[error("commit failed: {0}")]
    Commit(String),

    #[error("rollback failed: {0}")]
    Rollback(String),

    #[error("unknown queue: {0}")]
    UnknownQueue(String),

    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("unknown conversation: {0}")]
    UnknownConversation(Uuid),

    #[error("conversation {0} has already ended")]
    ConversationEnded(Uuid),

    #[error("unexpected reply to {command}: {reply}")]
    UnexpectedReply {
        command: &'static str,
        reply: &'static str,
    },
}

/// Failure raised by a subscriber callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SubscriberError {
    message: String,
}

impl SubscriberError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for SubscriberError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for SubscriberError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Which subscriber callback failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callback {
    OnNext,
    OnError,
    OnCompleted,
}

impl Callback {
    pub fn as_str(&self) -> &'static str {
        match self {
            Callback::OnNext => "on_next",
            Callback::OnError => "on_error",
            Callback::OnCompleted => "on_completed",
        }
    }
}

impl std::fmt::Display for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step of the shutdown protocol an error was captured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownStep {
    Cancel,
    Drain,
    Release,
    Complete,
    Clear,
}

impl std::fmt::Display for ShutdownStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ShutdownStep::Cancel => "cancel",
            ShutdownStep::Drain => "drain",
            ShutdownStep::Release => "release",
            ShutdownStep::Complete => "complete",
            ShutdownStep::Clear => "clear",
        };
        f.write_str(name)
    }
}

/// Errors reported by the client engine.
#[non_exhaustive]
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Synthesized from an error-kind message; renders as the message body.
    #[error("{description}")]
    ErrorMessage {
        conversation: Uuid,
        description: String,
    },

    #[error("failed to end conversation {conversation}")]
    EndConversation {
        conversation: Uuid,
        #[source]
        source: TransportError,
    },

    #[error("subscriber `{subscriber}` failed in {callback}")]
    Subscriber {
        subscriber: String,
        callback: Callback,
        #[source]
        source: SubscriberError,
    },

    #[error("subscriber `{subscriber}` panicked in {callback}: {info}")]
    SubscriberPanicked {
        subscriber: String,
        callback: Callback,
        info: String,
    },

    /// `on_error` itself failed while handling `original`.
    #[error("error handler failed while handling `{original}`")]
    CallbackFailed {
        original: Box<BrokerError>,
        #[source]
        handler: Box<BrokerError>,
    },

    #[error("worker panicked: {0}")]
    Worker(String),

    #[error("shutdown step `{step}` failed")]
    Shutdown {
        step: ShutdownStep,
        #[source]
        source: Box<BrokerError>,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("message has no conversation")]
    MissingConversation,
}

// Boxed sources show up in the chain as `Box<BrokerError>`, not `BrokerError`.
fn as_broker<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a BrokerError> {
    err.downcast_ref::<BrokerError>()
        .or_else(|| err.downcast_ref::<Box<BrokerError>>().map(|b| b.as_ref()))
}

impl BrokerError {
    pub fn error_message(conversation: Uuid, description: impl Into<String>) -> Self {
        BrokerError::ErrorMessage {
            conversation,
            description: description.into(),
        }
    }

    pub fn at_step(self, step: ShutdownStep) -> Self {
        BrokerError::Shutdown {
            step,
            source: Box::new(self),
        }
    }

    /// The innermost error of the `source()` chain (or `self`).
    pub fn root_cause(&self) -> &(dyn StdError + 'static) {
        let mut current: &(dyn StdError + 'static) = self;
        while let Some(next) = current.source() {
            current = next;
        }
        current
    }

    /// `true` when the root cause is a cooperative cancellation.
    pub fn is_cancellation(&self) -> bool {
        matches!(as_broker(self.root_cause()), Some(BrokerError::Cancelled))
    }

    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            BrokerError::Transport(_) => "transport",
            BrokerError::ErrorMessage { .. } => "error_message",
            BrokerError::EndConversation { .. } => "end_conversation",
            BrokerError::Subscriber { .. } => "subscriber",
            BrokerError::SubscriberPanicked { .. } => "subscriber_panicked",
            BrokerError::CallbackFailed { .. } => "callback_failed",
            BrokerError::Worker(_) => "worker",
            BrokerError::Shutdown { .. } => "shutdown",
            BrokerError::Cancelled => "cancelled",
            BrokerError::InvalidState(_) => "invalid_state",
            BrokerError::MissingConversation => "missing_conversation",
        }
    }

    /// Every message of the chain joined with `: `.
    pub fn chain_message(&self) -> String {
        let mut parts = vec![self.to_string()];
        let mut current: &(dyn StdError + 'static) = self;
        while let Some(next) = current.source() {
            parts.push(next.to_string());
            current = next;
        }
        parts.join(": ")
    }
}
