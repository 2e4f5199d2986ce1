//! OutstandingWork - 受信ループが起動した作業単位の集合
//!
//! 停止時に「何を待てばよいか」を知るためだけに使います。
//! - `spawn` はロックを保持したまま JoinSet に追加する（drain が見落とさない）
//! - 作業単位がさらに作業単位を起動してもよい（drain は空になるまで繰り返す）
//! - 終了済みの作業は spawn のたびに回収し、失敗は drain の報告用に保持する
//! - drain されずに破棄されたら作業は detach する（中断はしない）

use std::future::Future;
use std::mem;
use std::sync::{Mutex, MutexGuard};

use tokio::task::{JoinError, JoinSet};

use crate::domain::{BrokerError, ShutdownResult, ShutdownStep};
use crate::ports::{Category, Diagnostics};

type UnitResult = Result<(), BrokerError>;

pub struct OutstandingWork {
    state: Mutex<WorkState>,
    diagnostics: Diagnostics,
}

#[derive(Default)]
struct WorkState {
    running: JoinSet<UnitResult>,
    settled: Vec<BrokerError>,
}

impl Drop for WorkState {
    fn drop(&mut self) {
        self.running.detach_all();
    }
}

fn from_join(err: JoinError) -> BrokerError {
    if err.is_cancelled() {
        BrokerError::Cancelled
    } else {
        BrokerError::Worker(err.to_string())
    }
}

impl OutstandingWork {
    pub fn new(diagnostics: Diagnostics) -> Self {
        Self {
            state: Mutex::new(WorkState::default()),
            diagnostics,
        }
    }

    fn state(&self) -> MutexGuard<'_, WorkState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Track and start `unit`. Must be called from within a tokio runtime.
    pub fn spawn<F>(&self, unit: F)
    where
        F: Future<Output = UnitResult> + Send + 'static,
    {
        let mut state = self.state();
        state.running.spawn(unit);
        self.reap(&mut state);
    }

    fn reap(&self, state: &mut WorkState) {
        let mut released = 0usize;
        while let Some(joined) = state.running.try_join_next() {
            released += 1;
            if let Some(err) = self.outcome(joined) {
                state.settled.push(err);
            }
        }
        if released > 0 {
            self.diagnostics.trace(
                Category::Polling,
                format!(
                    "released {released} completed unit(s); {} outstanding",
                    state.running.len()
                ),
            );
        }
    }

    fn outcome(&self, joined: Result<UnitResult, JoinError>) -> Option<BrokerError> {
        let err = match joined {
            Ok(Ok(())) => return None,
            Ok(Err(err)) => err,
            Err(err) => from_join(err),
        };
        if err.is_cancellation() {
            self.diagnostics
                .trace(Category::Polling, format!("unit cancelled: {err}"));
        } else {
            self.diagnostics
                .error(Category::Polling, format!("unit failed: {}", err.chain_message()));
        }
        Some(err)
    }

    /// Units not yet reaped.
    pub fn len(&self) -> usize {
        self.state().running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for every unit, including units spawned while draining.
    ///
    /// Every failure is recorded; cancellations stay distinguishable.
    pub async fn drain(&self) -> ShutdownResult {
        let mut result = ShutdownResult::new();
        loop {
            let (mut batch, settled) = {
                let mut state = self.state();
                (
                    mem::take(&mut state.running),
                    mem::take(&mut state.settled),
                )
            };
            for err in settled {
                result.record(err.at_step(ShutdownStep::Drain));
            }
            if batch.is_empty() {
                break;
            }
            while let Some(joined) = batch.join_next().await {
                if let Some(err) = self.outcome(joined) {
                    result.record(err.at_step(ShutdownStep::Drain));
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::{diagnostics, wait_until};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn drain_waits_for_every_unit() {
        let work = OutstandingWork::new(diagnostics());
        let done = Arc::new(AtomicUsize::new(0));

        for i in 0..5 {
            let done = Arc::clone(&done);
            work.spawn(async move {
                tokio::time::sleep(Duration::from_millis(10 * i)).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        let result = work.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert!(!result.failed());
        assert!(work.is_empty());
    }

    #[tokio::test]
    async fn drain_includes_units_spawned_by_units() {
        let work = Arc::new(OutstandingWork::new(diagnostics()));
        let done = Arc::new(AtomicUsize::new(0));

        let inner_work = Arc::clone(&work);
        let inner_done = Arc::clone(&done);
        work.spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            inner_work.spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                inner_done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });

        work.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_and_cancellations_are_both_recorded() {
        let work = OutstandingWork::new(diagnostics());
        work.spawn(async { Err(BrokerError::Cancelled) });
        work.spawn(async { Err(BrokerError::Worker("boom".into())) });

        let result = work.drain().await;
        assert_eq!(result.all().len(), 2);
        assert_eq!(result.exceptions().len(), 1);
        assert_eq!(result.cancellations().len(), 1);
        assert!(result.failed());
    }

    #[tokio::test]
    async fn panicking_unit_is_reported() {
        let work = OutstandingWork::new(diagnostics());
        work.spawn(async { panic!("unit exploded") });

        let result = work.drain().await;
        assert!(result.failed());
        assert!(result.exceptions()[0].chain_message().contains("worker panicked"));
    }

    #[tokio::test]
    async fn finished_units_are_reaped_on_spawn() {
        let work = OutstandingWork::new(diagnostics());
        work.spawn(async { Err(BrokerError::Worker("early".into())) });
        tokio::time::sleep(Duration::from_millis(20)).await;

        work.spawn(async { Ok(()) });
        assert!(work.len() <= 1);

        let result = work.drain().await;
        assert_eq!(result.exceptions().len(), 1);
    }

    #[tokio::test]
    async fn dropped_set_lets_units_finish() {
        let work = OutstandingWork::new(diagnostics());
        let done = Arc::new(AtomicUsize::new(0));

        let unit_done = Arc::clone(&done);
        work.spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            unit_done.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        drop(work);

        wait_until(|| done.load(Ordering::SeqCst) == 1).await;
    }
}
