//! parley - InMemoryBroker を使ったデモランチャー
//!
//! ```text
//! parley [config.json]
//! PARLEY_LOG=debug parley
//! ```

mod config;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parley_core::impls::{InMemoryBroker, SessionTransport};
use parley_core::{BrokerClient, BrokerError, Message, Subscriber, SubscriberError};
use tracing_subscriber::EnvFilter;

use crate::config::LauncherConfig;

/// 受け取ったものを tracing に出すだけの Subscriber
#[derive(Default)]
struct LoggingSubscriber {
    received: AtomicUsize,
}

#[async_trait]
impl Subscriber for LoggingSubscriber {
    async fn on_next(&self, message: &Message) -> Result<(), SubscriberError> {
        let n = self.received.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(n, kind = message.kind(), conversation = %message.conversation(), "received: {}", message.body());
        Ok(())
    }

    async fn on_error(
        &self,
        error: &BrokerError,
        message: Option<&Message>,
    ) -> Result<(), SubscriberError> {
        match message {
            Some(message) => tracing::warn!(conversation = %message.conversation(), "error: {error}"),
            None => tracing::warn!("error: {error}"),
        }
        Ok(())
    }

    async fn on_completed(&self) -> Result<(), SubscriberError> {
        tracing::info!(
            received = self.received.load(Ordering::Relaxed),
            "subscriber completed"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}

fn init_tracing(config: &LauncherConfig) {
    let filter = EnvFilter::try_from_env("PARLEY_LOG")
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn send_all(client: &BrokerClient, config: &LauncherConfig) -> Result<(), BrokerError> {
    for body in &config.bodies {
        let conversation = client
            .begin_conversation(&config.initiator_service, &config.target_service, &config.contract)
            .await?;
        let message = Message::empty()
            .with_contract(&config.contract)
            .with_kind(&config.kind)
            .with_body(body)
            .with_conversation(Default::default(), conversation);
        client.send(&message).await?;
    }

    if let Some(description) = &config.reject_with {
        let conversation = client
            .begin_conversation(&config.initiator_service, &config.target_service, &config.contract)
            .await?;
        client
            .end_conversation_with_error(conversation, 50_000, description)
            .await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = LauncherConfig::load(path.as_deref())?;
    init_tracing(&config);

    // (A) ブローカーとサービスの紐づけ
    let broker = InMemoryBroker::new();
    broker.bind_service(&config.target_service, &config.queue);
    broker.bind_service(&config.initiator_service, &config.initiator_queue);

    // (B) クライアントを構築して購読
    let client = BrokerClient::builder()
        .transport(Arc::new(SessionTransport::new(broker.clone())))
        .build()?;
    let _subscription = client.subscribe(Arc::new(LoggingSubscriber::default()));

    // (C) 受信開始 → 送信
    let running = client.start_receiving(&config.queue)?;
    send_all(&client, &config).await?;

    // (D) 指定時間（または Ctrl-C）まで待つ
    tokio::select! {
        _ = tokio::time::sleep(config.run_for()) => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted"),
    }

    // (E) 停止して結果を報告
    let result = running.stop_receiving().await?;
    tracing::info!(
        cancellations = result.cancellations().len(),
        pending = broker.depth(&config.queue),
        "stopped"
    );
    result.into_result()?;
    Ok(())
}
