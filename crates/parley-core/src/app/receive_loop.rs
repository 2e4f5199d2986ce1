//! ReceiveLoop - キューをポーリングし、受け取ったものを振り分ける
//!
//! # 流れ
//! 1. `Transport::receive(queue, RECEIVE_TIMEOUT)`
//! 2. 空 → 次の poll
//! 3. transport エラー → on_error の fan-out を起動（停止中ならログのみ）
//! 4. メッセージ → 作業単位を起動: 会話終了 → 分類 → 配信
//! 5. キャンセル要求 → ループを抜ける（エラーではなく `Ok`）
//!
//! キャンセル以外でループが止まることはありません。
//! 実行中の transport 呼び出しは中断せず、キャンセルは poll の間で確認します。

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::app::classifier::{Action, settle};
use crate::app::delivery::{broadcast_error, broadcast_next};
use crate::app::registry::SubscriberRegistry;
use crate::app::work::OutstandingWork;
use crate::domain::{BrokerError, Message};
use crate::ports::{Category, Diagnostics, Transport};

/// Per-attempt wait of a receive.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Polling,
    Stopping,
}

pub(crate) struct ReceiveLoop {
    pub(crate) queue: String,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) registry: Arc<SubscriberRegistry>,
    pub(crate) work: Arc<OutstandingWork>,
    pub(crate) token: CancellationToken,
    pub(crate) diagnostics: Diagnostics,
}

impl ReceiveLoop {
    pub(crate) async fn run(self) -> Result<(), BrokerError> {
        self.diagnostics.debug(
            Category::Polling,
            format!("receiver started on queue {}", self.queue),
        );

        let mut state = LoopState::Polling;
        while state == LoopState::Polling {
            self.poll_once().await;

            if self.token.is_cancelled() {
                state = LoopState::Stopping;
            }
        }

        self.diagnostics.debug(
            Category::Polling,
            format!("receiver on queue {} stopping", self.queue),
        );
        Ok(())
    }

    async fn poll_once(&self) {
        match self.transport.receive(&self.queue, RECEIVE_TIMEOUT).await {
            Ok(message) if message.is_empty() => {}
            Ok(message) => self.dispatch(message),
            Err(err) => self.report(err.into()),
        }
    }

    /// Spawn the unit that settles and delivers `message`.
    fn dispatch(&self, message: Message) {
        self.diagnostics.trace(
            Category::Polling,
            format!("received {} on {}", message.kind(), message.conversation()),
        );

        let transport = Arc::clone(&self.transport);
        let registry = Arc::clone(&self.registry);
        let token = self.token.clone();
        let diagnostics = self.diagnostics.clone();

        self.work.spawn(async move {
            match settle(transport.as_ref(), &message, &diagnostics).await {
                Action::Deliver(message) => {
                    broadcast_next(registry.snapshot(), message, &diagnostics).await
                }
                Action::Fail(err @ BrokerError::ErrorMessage { .. }) => {
                    broadcast_error(registry.snapshot(), err, Some(message), &diagnostics).await
                }
                Action::Fail(err) => {
                    fan_out_failure(&registry, &token, &diagnostics, err, Some(message)).await
                }
                Action::Ignore => Ok(()),
            }
        });
    }

    /// Route a transport failure to subscribers, unless we are stopping.
    fn report(&self, err: BrokerError) {
        if self.token.is_cancelled() {
            self.diagnostics.trace(
                Category::Polling,
                format!("receive failed while stopping: {}", err.chain_message()),
            );
            return;
        }
        self.diagnostics.warn(
            Category::Polling,
            format!("receive failed: {}", err.chain_message()),
        );

        let registry = Arc::clone(&self.registry);
        let token = self.token.clone();
        let diagnostics = self.diagnostics.clone();
        self.work.spawn(async move {
            fan_out_failure(&registry, &token, &diagnostics, err, None).await
        });
    }
}

/// `on_error` fan-out that stands down once shutdown has begun.
async fn fan_out_failure(
    registry: &SubscriberRegistry,
    token: &CancellationToken,
    diagnostics: &Diagnostics,
    err: BrokerError,
    message: Option<Message>,
) -> Result<(), BrokerError> {
    if token.is_cancelled() {
        diagnostics.trace(
            Category::Polling,
            format!("not reporting while stopping: {}", err.chain_message()),
        );
        return Err(BrokerError::Cancelled);
    }
    broadcast_error(registry.snapshot(), err, message, diagnostics).await
}
