//! RunningClient - 開始済みの受信ループへのハンドル
//!
//! # 停止の流れ
//! ```text
//! stop_receiving()
//!   ├─ token.cancel()                 現在の poll の後でループが抜ける
//!   ├─ ループ終了を待ち、作業を drain   起動済みの作業単位はすべて完了
//!   ├─ token を破棄
//!   ├─ 各購読者の on_completed()       on_next/on_error と競合しない
//!   ├─ registry.clear()
//!   └─ ReceiverSlot を解放             クライアントは再び start_receiving できる
//! ```
//! 途中の失敗はすべて [`ShutdownResult`] に記録されます。
//! キャンセルも記録されますが `failed()` にはなりません。
//!
//! # 設計
//! - 停止手順は別タスクで走る。`stop_receiving` の future が途中で破棄されても最後まで進む
//! - ハンドルを drop すると token を cancel するだけ。起動済みの作業単位は detach されて完了する

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::app::delivery::complete_all;
use crate::app::registry::SubscriberRegistry;
use crate::app::work::OutstandingWork;
use crate::domain::{BrokerError, ShutdownResult, ShutdownStep};
use crate::ports::{Category, Diagnostics};

/// クライアントごとに 1 つだけの受信枠。drop で解放される
pub(crate) struct ReceiverSlot(Arc<AtomicBool>);

impl ReceiverSlot {
    /// 既に受信中なら `None`
    pub(crate) fn acquire(receiving: &Arc<AtomicBool>) -> Option<Self> {
        receiving
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(Arc::clone(receiving)))
    }
}

impl Drop for ReceiverSlot {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct Active {
    token: CancellationToken,
    receiver: JoinHandle<Result<(), BrokerError>>,
    slot: ReceiverSlot,
}

pub struct RunningClient {
    queue: String,
    active: Mutex<Option<Active>>,
    work: Arc<OutstandingWork>,
    registry: Arc<SubscriberRegistry>,
    diagnostics: Diagnostics,
}

impl RunningClient {
    pub(crate) fn new(
        queue: String,
        token: CancellationToken,
        receiver: JoinHandle<Result<(), BrokerError>>,
        slot: ReceiverSlot,
        work: Arc<OutstandingWork>,
        registry: Arc<SubscriberRegistry>,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            queue,
            active: Mutex::new(Some(Active {
                token,
                receiver,
                slot,
            })),
            work,
            registry,
            diagnostics,
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<Active>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// `true` until `stop_receiving` has been called.
    pub fn is_running(&self) -> bool {
        self.active().is_some()
    }

    /// Units of work spawned by the loop and not yet reaped.
    pub fn outstanding(&self) -> usize {
        self.work.len()
    }

    /// Stop polling, drain outstanding work, complete and remove every subscriber.
    ///
    /// Fails with `InvalidState` if this handle was already stopped. A stop whose
    /// future is dropped early still runs to the end; only its result is lost.
    pub async fn stop_receiving(&self) -> Result<ShutdownResult, BrokerError> {
        let active = self.active().take();
        let Some(active) = active else {
            return Err(BrokerError::InvalidState("client is not receiving"));
        };
        let shutdown = Shutdown {
            queue: self.queue.clone(),
            work: Arc::clone(&self.work),
            registry: Arc::clone(&self.registry),
            diagnostics: self.diagnostics.clone(),
        };
        tokio::spawn(shutdown.run(active))
            .await
            .map_err(|err| BrokerError::Worker(err.to_string()))
    }
}

struct Shutdown {
    queue: String,
    work: Arc<OutstandingWork>,
    registry: Arc<SubscriberRegistry>,
    diagnostics: Diagnostics,
}

impl Shutdown {
    async fn run(self, active: Active) -> ShutdownResult {
        let Active {
            token,
            receiver,
            slot,
        } = active;
        let mut result = ShutdownResult::new();

        self.diagnostics.debug(
            Category::Client,
            format!("stopping receiver on queue {}", self.queue),
        );
        token.cancel();

        match receiver.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => result.record(err.at_step(ShutdownStep::Drain)),
            Err(err) if err.is_cancelled() => {
                result.record(BrokerError::Cancelled.at_step(ShutdownStep::Drain))
            }
            Err(err) => {
                result.record(BrokerError::Worker(err.to_string()).at_step(ShutdownStep::Drain))
            }
        }
        result.merge(self.work.drain().await);
        self.diagnostics.debug(Category::Client, "receiver stopped");

        drop(token);

        let subscribers = self.registry.snapshot();
        for err in complete_all(subscribers, &self.diagnostics).await {
            result.record(err.at_step(ShutdownStep::Complete));
        }

        let removed = self.registry.clear();
        self.diagnostics.debug(
            Category::Client,
            format!("all subscribers removed ({removed})"),
        );
        drop(slot);

        if result.failed() {
            self.diagnostics.warn(
                Category::Client,
                format!("stopped with {} error(s)", result.exceptions().len()),
            );
        }
        result
    }
}

impl Drop for RunningClient {
    fn drop(&mut self) {
        if let Some(active) = self.active().take() {
            active.token.cancel();
        }
    }
}

impl std::fmt::Debug for RunningClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningClient")
            .field("queue", &self.queue)
            .field("running", &self.is_running())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}
