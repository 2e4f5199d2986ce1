//! Delivery - 失敗を閉じ込めて購読者のコールバックを呼ぶ
//!
//! ```text
//! broadcast_next(msg)
//!     ├──► task ──► s1.on_next(msg) ── Err/panic ──► s1.on_error(err, Some(msg)) ── Err ──► log
//!     ├──► task ──► s2.on_next(msg)
//!     └──► task ──► sN.on_next(msg)
//! ```
//!
//! # ルール
//! - 購読者ごとに 1 タスク。購読者間の順序はない
//! - `Err` も panic もその購読者だけに影響する
//! - panic は `catch_unwind` で捕まえる。`AssertUnwindSafe` なので、
//!   自分のロックを持ったまま panic した購読者の状態は poison されうる

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::join_all;
use tokio::task::JoinError;

use crate::domain::{BrokerError, Callback, Message, SubscriberError};
use crate::ports::{Category, Diagnostics, Subscriber};

fn panic_info(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run one callback, turning `Err` and panics into a [`BrokerError`].
async fn guarded<F>(subscriber: &str, callback: Callback, fut: F) -> Result<(), BrokerError>
where
    F: Future<Output = Result<(), SubscriberError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(BrokerError::Subscriber {
            subscriber: subscriber.to_string(),
            callback,
            source,
        }),
        Err(panic) => Err(BrokerError::SubscriberPanicked {
            subscriber: subscriber.to_string(),
            callback,
            info: panic_info(&*panic),
        }),
    }
}

/// `on_next`; a failure is re-dispatched to the same subscriber's `on_error`.
pub async fn deliver_next(
    subscriber: &Arc<dyn Subscriber>,
    message: &Message,
    diagnostics: &Diagnostics,
) {
    let result = guarded(
        subscriber.name(),
        Callback::OnNext,
        subscriber.on_next(message),
    )
    .await;

    if let Err(err) = result {
        diagnostics.warn(Category::Polling, err.chain_message());
        deliver_error(subscriber, &err, Some(message), diagnostics).await;
    }
}

/// `on_error`; if the handler itself fails, both errors are logged together.
pub async fn deliver_error(
    subscriber: &Arc<dyn Subscriber>,
    error: &BrokerError,
    message: Option<&Message>,
    diagnostics: &Diagnostics,
) {
    let result = guarded(
        subscriber.name(),
        Callback::OnError,
        subscriber.on_error(error, message),
    )
    .await;

    if let Err(handler) = result {
        let combined = BrokerError::CallbackFailed {
            original: Box::new(error.clone()),
            handler: Box::new(handler),
        };
        diagnostics.error(Category::Polling, combined.chain_message());
    }
}

/// `on_completed`; the failure is returned so shutdown can report it.
pub async fn deliver_completed(
    subscriber: &Arc<dyn Subscriber>,
    diagnostics: &Diagnostics,
) -> Result<(), BrokerError> {
    let result = guarded(
        subscriber.name(),
        Callback::OnCompleted,
        subscriber.on_completed(),
    )
    .await;

    if let Err(err) = &result {
        diagnostics.error(Category::Client, err.chain_message());
    }
    result
}

/// Spawn `deliver` once per subscriber and wait for all of them.
async fn fan_out<F, Fut>(
    subscribers: Vec<Arc<dyn Subscriber>>,
    deliver: F,
) -> Vec<Result<Fut::Output, JoinError>>
where
    F: Fn(Arc<dyn Subscriber>) -> Fut,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    let handles = subscribers
        .into_iter()
        .map(|subscriber| tokio::spawn(deliver(subscriber)));
    join_all(handles).await
}

fn join_failure(err: JoinError) -> BrokerError {
    if err.is_cancelled() {
        BrokerError::Cancelled
    } else {
        BrokerError::Worker(err.to_string())
    }
}

fn first_join_failure(results: Vec<Result<(), JoinError>>) -> Result<(), BrokerError> {
    match results.into_iter().find_map(Result::err) {
        Some(err) => Err(join_failure(err)),
        None => Ok(()),
    }
}

/// `on_next(message)` for every subscriber, concurrently.
pub async fn broadcast_next(
    subscribers: Vec<Arc<dyn Subscriber>>,
    message: Message,
    diagnostics: &Diagnostics,
) -> Result<(), BrokerError> {
    diagnostics.debug(
        Category::Polling,
        format!("calling on_next for {} subscriber(s)", subscribers.len()),
    );
    let message = Arc::new(message);
    let results = fan_out(subscribers, |subscriber| {
        let message = Arc::clone(&message);
        let diagnostics = diagnostics.clone();
        async move { deliver_next(&subscriber, &message, &diagnostics).await }
    })
    .await;
    first_join_failure(results)
}

/// `on_error(error, message)` for every subscriber, concurrently.
pub async fn broadcast_error(
    subscribers: Vec<Arc<dyn Subscriber>>,
    error: BrokerError,
    message: Option<Message>,
    diagnostics: &Diagnostics,
) -> Result<(), BrokerError> {
    diagnostics.debug(
        Category::Polling,
        format!("calling on_error for {} subscriber(s)", subscribers.len()),
    );
    let error = Arc::new(error);
    let message = message.map(Arc::new);
    let results = fan_out(subscribers, |subscriber| {
        let error = Arc::clone(&error);
        let message = message.clone();
        let diagnostics = diagnostics.clone();
        async move {
            deliver_error(&subscriber, &error, message.as_deref(), &diagnostics).await
        }
    })
    .await;
    first_join_failure(results)
}

/// `on_completed` for every subscriber; returns every failure.
pub async fn complete_all(
    subscribers: Vec<Arc<dyn Subscriber>>,
    diagnostics: &Diagnostics,
) -> Vec<BrokerError> {
    diagnostics.debug(
        Category::Client,
        format!("calling on_completed for {} subscriber(s)", subscribers.len()),
    );
    let results = fan_out(subscribers, |subscriber| {
        let diagnostics = diagnostics.clone();
        async move { deliver_completed(&subscriber, &diagnostics).await }
    })
    .await;

    results
        .into_iter()
        .filter_map(|joined| match joined {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(err) => Some(join_failure(err)),
        })
        .collect()
}
