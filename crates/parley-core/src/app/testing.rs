//! テスト用ヘルパー（`cfg(test)` のみ）
//!
//! - **RecordingSubscriber**: 呼ばれたコールバックを記録する Subscriber
//! - **ScriptedTransport**: 台本どおりに receive を返す Transport
//! - `data_message` / `diagnostics` / `wait_until`

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::domain::{BrokerError, Message, SubscriberError, TransportError};
use crate::impls::MemoryLogSink;
use crate::ports::{Diagnostics, RandomIds, Subscriber, Transport};

pub fn diagnostics() -> Diagnostics {
    Diagnostics::new(Arc::new(MemoryLogSink::new()))
}

/// データ種別のメッセージ（会話 ID は毎回新規）
pub fn data_message(body: &str) -> Message {
    Message::new(
        "//parley/test/Contract",
        "//parley/test/Data",
        body,
        RandomIds::generate(),
        RandomIds::generate(),
    )
}

/// `cond` が真になるまで待つ。2 秒で panic。
pub async fn wait_until(cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not met within 2s");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    Next(Message),
    Error {
        error: String,
        message: Option<Message>,
    },
    Completed,
}

#[derive(Debug, Default, Clone, Copy)]
struct Faults {
    fail_next: bool,
    panic_next: bool,
    fail_error: bool,
    fail_completed: bool,
}

pub struct RecordingSubscriber {
    name: String,
    faults: Faults,
    delay: Option<Duration>,
    events: Mutex<Vec<Event>>,
}

impl RecordingSubscriber {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            faults: Faults::default(),
            delay: None,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_next(mut self) -> Self {
        self.faults.fail_next = true;
        self
    }

    pub fn panicking_next(mut self) -> Self {
        self.faults.panic_next = true;
        self
    }

    pub fn failing_error(mut self) -> Self {
        self.faults.fail_error = true;
        self
    }

    pub fn failing_completed(mut self) -> Self {
        self.faults.fail_completed = true;
        self
    }

    /// `on_next` が記録前に `ms` ミリ秒眠る
    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Some(Duration::from_millis(ms));
        self
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn nexts(&self) -> Vec<Message> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Next(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    /// `(error.to_string(), message)` の一覧
    pub fn errors(&self) -> Vec<(String, Option<Message>)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Error { error, message } => Some((error, message)),
                _ => None,
            })
            .collect()
    }

    pub fn completed(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Completed))
            .count()
    }
}

#[async_trait]
impl Subscriber for RecordingSubscriber {
    async fn on_next(&self, message: &Message) -> Result<(), SubscriberError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.push(Event::Next(message.clone()));
        if self.faults.panic_next {
            panic!("{} exploded in on_next", self.name);
        }
        if self.faults.fail_next {
            return Err(SubscriberError::new("rejected"));
        }
        Ok(())
    }

    async fn on_error(
        &self,
        error: &BrokerError,
        message: Option<&Message>,
    ) -> Result<(), SubscriberError> {
        self.push(Event::Error {
            error: error.to_string(),
            message: message.cloned(),
        });
        if self.faults.fail_error {
            return Err(SubscriberError::new("on_error refused"));
        }
        Ok(())
    }

    async fn on_completed(&self) -> Result<(), SubscriberError> {
        self.push(Event::Completed);
        if self.faults.fail_completed {
            return Err(SubscriberError::new("cleanup failed"));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

enum Step {
    Message(Message),
    Empty,
    Failure(TransportError),
}

#[derive(Default)]
struct Script {
    steps: VecDeque<Step>,
    gate: Option<Arc<Notify>>,
    receives: usize,
    ended: Vec<Uuid>,
    sent: Vec<Message>,
    end_failure: Option<TransportError>,
    end_delay: Option<Duration>,
    begin_failure: Option<TransportError>,
}

/// 台本どおりに動く Transport
///
/// 台本が尽きると 5ms 待って空メッセージを返す。
pub struct ScriptedTransport {
    script: Mutex<Script>,
    next_conversation: Uuid,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script::default()),
            next_conversation: RandomIds::generate(),
        }
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn push_message(&self, message: Message) {
        self.script().steps.push_back(Step::Message(message));
    }

    pub fn push_empty(&self) {
        self.script().steps.push_back(Step::Empty);
    }

    pub fn push_failure(&self, err: TransportError) {
        self.script().steps.push_back(Step::Failure(err));
    }

    /// 次の receive は返された Notify が鳴るまで止まる
    pub fn hold_next_receive(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.script().gate = Some(Arc::clone(&gate));
        gate
    }

    pub fn fail_end_conversation(&self, err: TransportError) {
        self.script().end_failure = Some(err);
    }

    /// `end_conversation` が `ms` ミリ秒かかる
    pub fn slow_end_conversation(&self, ms: u64) {
        self.script().end_delay = Some(Duration::from_millis(ms));
    }

    pub fn fail_begin(&self, err: TransportError) {
        self.script().begin_failure = Some(err);
    }

    pub fn receives(&self) -> usize {
        self.script().receives
    }

    pub fn ended(&self) -> Vec<Uuid> {
        self.script().ended.clone()
    }

    pub fn sent(&self) -> Vec<Message> {
        self.script().sent.clone()
    }

    /// `begin_conversation` が返す ID
    pub fn next_conversation(&self) -> Uuid {
        self.next_conversation
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn receive(&self, _queue: &str, _timeout: Duration) -> Result<Message, TransportError> {
        let gate = {
            let mut script = self.script();
            script.receives += 1;
            script.gate.take()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let step = self.script().steps.pop_front();
        match step {
            Some(Step::Message(message)) => Ok(message),
            Some(Step::Empty) => Ok(Message::empty()),
            Some(Step::Failure(err)) => Err(err),
            None => {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(Message::empty())
            }
        }
    }

    async fn begin_conversation(
        &self,
        _from: &str,
        _to: &str,
        _contract: &str,
    ) -> Result<Uuid, TransportError> {
        match self.script().begin_failure.clone() {
            Some(err) => Err(err),
            None => Ok(self.next_conversation),
        }
    }

    async fn send(&self, message: &Message) -> Result<(), TransportError> {
        self.script().sent.push(message.clone());
        Ok(())
    }

    async fn end_conversation(&self, conversation: Uuid) -> Result<(), TransportError> {
        let delay = self.script().end_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut script = self.script();
        if let Some(err) = script.end_failure.clone() {
            return Err(err);
        }
        script.ended.push(conversation);
        Ok(())
    }

    async fn end_conversation_with_error(
        &self,
        conversation: Uuid,
        _code: i32,
        _description: &str,
    ) -> Result<(), TransportError> {
        self.script().ended.push(conversation);
        Ok(())
    }
}
