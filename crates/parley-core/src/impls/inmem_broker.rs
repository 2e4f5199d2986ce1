//! InMemoryBroker - 開発用のトランザクショナルなブローカー
//!
//! # 学習ポイント
//! - Connector / Session の実装例（`SessionTransport` と組み合わせて使う）
//! - receive はすぐに見えるが、rollback（または commit 前の drop）で先頭に戻る
//! - begin / send / end は commit まで他のセッションから見えない
//! - 受信待ちは `tokio::sync::Notify`（commit 時に notify_waiters）
//!
//! # 会話モデル
//! begin_conversation は 2 つのハンドルを作ります（開始側と相手側）。
//! 開始側ハンドルで send すると、相手サービスのキューに相手側ハンドル付きで届きます。
//! end_conversation は自分のハンドルを閉じ、相手がまだ開いていれば
//! 相手のキューに終了メッセージ（エラー付きならエラーメッセージ）を積みます。
//! 両側が閉じた会話はハンドルごと削除されます（以後の end は UnknownConversation）。
//!
//! ID はすべて execute 時に払い出して `Op` に持たせる。commit で再適用しても同じ値になる。

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use crate::domain::{END_CONVERSATION_KIND, ERROR_KIND, Message, TransportError};
use crate::ports::{Command, Connector, IdGenerator, RandomIds, Reply, Session};

#[derive(Debug, Clone)]
struct Endpoint {
    group: Uuid,
    contract: String,
    /// 相手サービス（このハンドルで送ったメッセージの宛先）
    far_service: String,
    peer: Uuid,
    open: bool,
}

#[derive(Debug, Clone, Default)]
struct BrokerState {
    /// service -> queue
    services: HashMap<String, String>,
    queues: HashMap<String, VecDeque<Message>>,
    conversations: HashMap<Uuid, Endpoint>,
}

#[derive(Debug, Clone)]
enum Op {
    Begin {
        handle: Uuid,
        peer: Uuid,
        handle_group: Uuid,
        peer_group: Uuid,
        from: String,
        to: String,
        contract: String,
    },
    Send(Message),
    End {
        handle: Uuid,
        error: Option<(i32, String)>,
    },
}

impl BrokerState {
    fn queue_of(&mut self, service: &str) -> Result<&mut VecDeque<Message>, TransportError> {
        let queue = self
            .services
            .get(service)
            .ok_or_else(|| TransportError::UnknownService(service.to_string()))?;
        self.queues
            .get_mut(queue)
            .ok_or_else(|| TransportError::UnknownQueue(queue.clone()))
    }

    fn endpoint(&self, handle: Uuid) -> Result<&Endpoint, TransportError> {
        self.conversations
            .get(&handle)
            .ok_or(TransportError::UnknownConversation(handle))
    }

    fn apply(&mut self, op: &Op) -> Result<(), TransportError> {
        match op {
            Op::Begin {
                handle,
                peer,
                handle_group,
                peer_group,
                from,
                to,
                contract,
            } => {
                self.queue_of(to)?;
                self.conversations.insert(
                    *handle,
                    Endpoint {
                        group: *handle_group,
                        contract: contract.clone(),
                        far_service: to.clone(),
                        peer: *peer,
                        open: true,
                    },
                );
                self.conversations.insert(
                    *peer,
                    Endpoint {
                        group: *peer_group,
                        contract: contract.clone(),
                        far_service: from.clone(),
                        peer: *handle,
                        open: true,
                    },
                );
                Ok(())
            }
            Op::Send(message) => {
                let handle = message.conversation();
                let endpoint = self.endpoint(handle)?.clone();
                let peer = self.endpoint(endpoint.peer)?.clone();
                if !endpoint.open || !peer.open {
                    return Err(TransportError::ConversationEnded(handle));
                }
                let contract = if message.contract().is_empty() {
                    endpoint.contract.clone()
                } else {
                    message.contract().to_string()
                };
                let delivered = Message::new(
                    contract,
                    message.kind(),
                    message.body(),
                    peer.group,
                    endpoint.peer,
                );
                self.queue_of(&endpoint.far_service)?.push_back(delivered);
                Ok(())
            }
            Op::End { handle, error } => {
                let endpoint = self.endpoint(*handle)?.clone();
                if !endpoint.open {
                    return Ok(());
                }
                if let Some(own) = self.conversations.get_mut(handle) {
                    own.open = false;
                }

                let peer_open = self
                    .conversations
                    .get(&endpoint.peer)
                    .is_some_and(|peer| peer.open);
                if !peer_open {
                    self.conversations.remove(handle);
                    self.conversations.remove(&endpoint.peer);
                    return Ok(());
                }
                let peer_group = self.endpoint(endpoint.peer)?.group;
                let notice = match error {
                    None => Message::new(
                        endpoint.contract.clone(),
                        END_CONVERSATION_KIND,
                        "",
                        peer_group,
                        endpoint.peer,
                    ),
                    Some((_, description)) => Message::new(
                        endpoint.contract.clone(),
                        ERROR_KIND,
                        description.clone(),
                        peer_group,
                        endpoint.peer,
                    ),
                };
                // 相手サービスが未登録なら通知は捨てる
                if let Ok(queue) = self.queue_of(&endpoint.far_service) {
                    queue.push_back(notice);
                }
                Ok(())
            }
        }
    }
}

struct Shared {
    state: Mutex<BrokerState>,
    arrivals: Notify,
    ids: Arc<dyn IdGenerator>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take(&self, queue: &str) -> Result<Option<Message>, TransportError> {
        let mut state = self.state();
        let messages = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| TransportError::UnknownQueue(queue.to_string()))?;
        Ok(messages.pop_front())
    }
}

/// InMemoryBroker は開発・テスト用のブローカー
///
/// # 使用例
/// ```ignore
/// let broker = InMemoryBroker::new();
/// broker.bind_service("//demo/Target", "target_queue");
/// let transport = SessionTransport::new(broker.clone());
/// ```
#[derive(Clone)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_ids(Arc::new(RandomIds))
    }

    pub fn with_ids(ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BrokerState::default()),
                arrivals: Notify::new(),
                ids,
            }),
        }
    }

    /// `service` 宛のメッセージを `queue` に届ける（queue は無ければ作成）
    pub fn bind_service(&self, service: impl Into<String>, queue: impl Into<String>) {
        let queue = queue.into();
        let mut state = self.shared.state();
        state.queues.entry(queue.clone()).or_default();
        state.services.insert(service.into(), queue);
    }

    /// commit 済みで未受信のメッセージ数（未知のキューは 0）
    pub fn depth(&self, queue: &str) -> usize {
        self.shared
            .state()
            .queues
            .get(queue)
            .map_or(0, VecDeque::len)
    }

    /// commit 済みで削除されていない会話ハンドルの数
    pub fn conversations(&self) -> usize {
        self.shared.state().conversations.len()
    }

    /// 会話ハンドルがまだ開いているか
    pub fn is_open(&self, conversation: Uuid) -> bool {
        self.shared
            .state()
            .conversations
            .get(&conversation)
            .is_some_and(|endpoint| endpoint.open)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state();
        f.debug_struct("InMemoryBroker")
            .field("services", &state.services.len())
            .field("queues", &state.queues.len())
            .field("conversations", &state.conversations.len())
            .finish()
    }
}

#[async_trait]
impl Connector for InMemoryBroker {
    async fn open(&self) -> Result<Box<dyn Session>, TransportError> {
        Ok(Box::new(InMemorySession {
            shared: Arc::clone(&self.shared),
            view: None,
            ops: Vec::new(),
            received: Vec::new(),
            finished: false,
        }))
    }
}

/// 1 トランザクション分のセッション
///
/// - `view`: 書き込み系コマンドの検証用スナップショット（最初の書き込みで作成）
/// - `ops`: commit 時に適用する操作
/// - `received`: rollback 時に戻すメッセージ
struct InMemorySession {
    shared: Arc<Shared>,
    view: Option<BrokerState>,
    ops: Vec<Op>,
    received: Vec<(String, Message)>,
    finished: bool,
}

impl InMemorySession {
    fn stage(&mut self, op: Op) -> Result<(), TransportError> {
        let shared = &self.shared;
        let view = self.view.get_or_insert_with(|| shared.state().clone());
        view.apply(&op)?;
        self.ops.push(op);
        Ok(())
    }

    async fn receive(&mut self, queue: &str, timeout: Duration) -> Result<Message, TransportError> {
        let shared = Arc::clone(&self.shared);
        let deadline = Instant::now() + timeout;
        loop {
            // notified() は生成時点から notify_waiters を受け取る
            let arrived = shared.arrivals.notified();
            if let Some(message) = shared.take(queue)? {
                self.received.push((queue.to_string(), message.clone()));
                return Ok(message);
            }
            if tokio::time::timeout_at(deadline, arrived).await.is_err() {
                return Ok(Message::empty());
            }
        }
    }

    fn undo(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.ops.clear();
        if self.received.is_empty() {
            return;
        }
        {
            let mut state = self.shared.state();
            for (queue, message) in self.received.drain(..).rev() {
                if let Some(messages) = state.queues.get_mut(&queue) {
                    messages.push_front(message);
                }
            }
        }
        self.shared.arrivals.notify_waiters();
    }
}

#[async_trait]
impl Session for InMemorySession {
    async fn execute(&mut self, command: Command) -> Result<Reply, TransportError> {
        match command {
            Command::Receive { queue, timeout } => {
                self.receive(&queue, timeout).await.map(Reply::Message)
            }
            Command::BeginConversation { from, to, contract } => {
                let ids = Arc::clone(&self.shared.ids);
                let handle = ids.conversation_id();
                let peer = ids.conversation_id();
                self.stage(Op::Begin {
                    handle,
                    peer,
                    handle_group: ids.conversation_group_id(),
                    peer_group: ids.conversation_group_id(),
                    from,
                    to,
                    contract,
                })?;
                Ok(Reply::Conversation(handle))
            }
            Command::Send { message } => {
                self.stage(Op::Send(message))?;
                Ok(Reply::Done)
            }
            Command::EndConversation { conversation } => {
                self.stage(Op::End {
                    handle: conversation,
                    error: None,
                })?;
                Ok(Reply::Done)
            }
            Command::EndConversationWithError {
                conversation,
                code,
                description,
            } => {
                self.stage(Op::End {
                    handle: conversation,
                    error: Some((code, description)),
                })?;
                Ok(Reply::Done)
            }
        }
    }

    async fn commit(mut self: Box<Self>) -> Result<(), TransportError> {
        let ops = std::mem::take(&mut self.ops);
        {
            let mut state = self.shared.state();
            let mut next = state.clone();
            for op in &ops {
                next.apply(op)
                    .map_err(|e| TransportError::Commit(e.to_string()))?;
            }
            *state = next;
        }
        self.received.clear();
        self.finished = true;
        if !ops.is_empty() {
            self.shared.arrivals.notify_waiters();
        }
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), TransportError> {
        self.undo();
        Ok(())
    }
}

impl Drop for InMemorySession {
    fn drop(&mut self) {
        self.undo();
    }
}
