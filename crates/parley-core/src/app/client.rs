//! BrokerClient - 利用者が触る表面
//!
//! - `subscribe` / `Subscription::unsubscribe`
//! - `start_receiving(queue)` → [`RunningClient`] → `stop_receiving()`
//!   受信ループはクライアントごとに 1 つ（停止か drop の後で再開できる）
//! - `begin_conversation`, `send`, `end_conversation_with_error`:
//!   呼び出し側から見て 1 回で完結する transport 操作

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::app::builder::ClientBuilder;
use crate::app::receive_loop::ReceiveLoop;
use crate::app::registry::{SubscriberRegistry, Subscription};
use crate::app::running::{ReceiverSlot, RunningClient};
use crate::app::work::OutstandingWork;
use crate::domain::{BrokerError, Message};
use crate::ports::{Category, Diagnostics, Subscriber, Transport};

pub struct BrokerClient {
    transport: Arc<dyn Transport>,
    registry: Arc<SubscriberRegistry>,
    receiving: Arc<AtomicBool>,
    diagnostics: Diagnostics,
}

/// Snapshot of a client for logs and status endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientStatus {
    pub subscribers: usize,
    /// A receive loop started from this client has not been stopped or dropped yet.
    pub running: bool,
}

impl BrokerClient {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn new(transport: Arc<dyn Transport>, diagnostics: Diagnostics) -> Self {
        Self {
            transport,
            registry: Arc::new(SubscriberRegistry::new(diagnostics.clone())),
            receiving: Arc::new(AtomicBool::new(false)),
            diagnostics,
        }
    }

    /// Register `subscriber` for messages received from now on.
    ///
    /// Callbacks run on spawned tasks and may overlap; guard shared state.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> Subscription {
        self.registry.register(subscriber)
    }

    /// Currently registered subscribers.
    pub fn subscribers(&self) -> Vec<Arc<dyn Subscriber>> {
        self.registry.snapshot()
    }

    pub fn status(&self) -> ClientStatus {
        ClientStatus {
            subscribers: self.registry.len(),
            running: self.receiving.load(Ordering::SeqCst),
        }
    }

    /// Start polling `queue` on a background task.
    ///
    /// One receiver per client: fails with `InvalidState` until the previous
    /// [`RunningClient`] is stopped or dropped. Must be called from within a tokio runtime.
    pub fn start_receiving(
        &self,
        queue: impl Into<String>,
    ) -> Result<RunningClient, BrokerError> {
        let Some(slot) = ReceiverSlot::acquire(&self.receiving) else {
            return Err(BrokerError::InvalidState("client is already receiving"));
        };
        let queue = queue.into();
        let token = CancellationToken::new();
        let work = Arc::new(OutstandingWork::new(self.diagnostics.clone()));

        let receive_loop = ReceiveLoop {
            queue: queue.clone(),
            transport: Arc::clone(&self.transport),
            registry: Arc::clone(&self.registry),
            work: Arc::clone(&work),
            token: token.clone(),
            diagnostics: self.diagnostics.clone(),
        };
        self.diagnostics
            .debug(Category::Client, format!("starting receiver on {queue}"));
        let receiver = tokio::spawn(receive_loop.run());

        Ok(RunningClient::new(
            queue,
            token,
            receiver,
            slot,
            work,
            Arc::clone(&self.registry),
            self.diagnostics.clone(),
        ))
    }

    /// Open a conversation and return its id.
    pub async fn begin_conversation(
        &self,
        from: &str,
        to: &str,
        contract: &str,
    ) -> Result<Uuid, BrokerError> {
        let conversation = self
            .transport
            .begin_conversation(from, to, contract)
            .await
            .inspect_err(|e| {
                self.diagnostics
                    .error(Category::Client, format!("begin conversation failed: {e}"))
            })?;
        self.diagnostics.debug(
            Category::Client,
            format!("began conversation {conversation} from {from} to {to} on {contract}"),
        );
        Ok(conversation)
    }

    /// Send `message` on its conversation.
    pub async fn send(&self, message: &Message) -> Result<(), BrokerError> {
        if message.conversation().is_nil() {
            return Err(BrokerError::MissingConversation);
        }
        self.transport.send(message).await.inspect_err(|e| {
            self.diagnostics
                .error(Category::Client, format!("send failed: {e}"))
        })?;
        self.diagnostics.debug(
            Category::Client,
            format!("sent {} on {}", message.kind(), message.conversation()),
        );
        Ok(())
    }

    /// End `conversation`, telling the far side why.
    pub async fn end_conversation_with_error(
        &self,
        conversation: Uuid,
        code: i32,
        description: &str,
    ) -> Result<(), BrokerError> {
        self.transport
            .end_conversation_with_error(conversation, code, description)
            .await?;
        self.diagnostics.debug(
            Category::Client,
            format!("ended conversation {conversation} with error {code}"),
        );
        Ok(())
    }
}

impl std::fmt::Debug for BrokerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerClient")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
