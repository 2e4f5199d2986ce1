//! SessionTransport - Connector を Transport に変換するアダプタ
//!
//! # 設計
//! 操作ごとに 1 セッション（接続 + トランザクション）:
//! ```text
//! open → execute → 期待した Reply ? commit : rollback → drop
//! ```
//! - rollback の失敗はログに残し、元のエラーを返す
//! - Reply の形が違えば `UnexpectedReply`（rollback してから返す）

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Message, TransportError};
use crate::impls::TracingLogSink;
use crate::ports::{Category, Command, Connector, Diagnostics, Reply, Transport};

pub struct SessionTransport<C> {
    connector: C,
    diagnostics: Diagnostics,
}

impl<C: Connector> SessionTransport<C> {
    pub fn new(connector: C) -> Self {
        Self::with_diagnostics(connector, Diagnostics::new(Arc::new(TracingLogSink)))
    }

    pub fn with_diagnostics(connector: C, diagnostics: Diagnostics) -> Self {
        Self {
            connector,
            diagnostics,
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// 1 コマンドを 1 トランザクションで実行
    ///
    /// `extract` が `Err(reply)` を返したら UnexpectedReply として rollback する。
    async fn run<T: Send>(
        &self,
        command: Command,
        extract: fn(Reply) -> Result<T, Reply>,
    ) -> Result<T, TransportError> {
        let name = command.name();
        let mut session = self.connector.open().await?;

        let outcome = session
            .execute(command)
            .await
            .and_then(|reply| {
                extract(reply).map_err(|other| TransportError::UnexpectedReply {
                    command: name,
                    reply: other.name(),
                })
            });

        match outcome {
            Ok(value) => {
                session.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = session.rollback().await {
                    self.diagnostics.error(
                        Category::Client,
                        format!("{name}: rollback failed ({rollback}) after: {err}"),
                    );
                }
                Err(err)
            }
        }
    }
}

fn message(reply: Reply) -> Result<Message, Reply> {
    match reply {
        Reply::Message(message) => Ok(message),
        other => Err(other),
    }
}

fn conversation(reply: Reply) -> Result<Uuid, Reply> {
    match reply {
        Reply::Conversation(id) => Ok(id),
        other => Err(other),
    }
}

fn done(reply: Reply) -> Result<(), Reply> {
    match reply {
        Reply::Done => Ok(()),
        other => Err(other),
    }
}

#[async_trait]
impl<C: Connector> Transport for SessionTransport<C> {
    async fn receive(&self, queue: &str, timeout: Duration) -> Result<Message, TransportError> {
        let command = Command::Receive {
            queue: queue.to_string(),
            timeout,
        };
        self.run(command, message).await
    }

    async fn begin_conversation(
        &self,
        from: &str,
        to: &str,
        contract: &str,
    ) -> Result<Uuid, TransportError> {
        let command = Command::BeginConversation {
            from: from.to_string(),
            to: to.to_string(),
            contract: contract.to_string(),
        };
        self.run(command, conversation).await
    }

    async fn send(&self, message: &Message) -> Result<(), TransportError> {
        let command = Command::Send {
            message: message.clone(),
        };
        self.run(command, done).await
    }

    async fn end_conversation(&self, conversation: Uuid) -> Result<(), TransportError> {
        self.run(Command::EndConversation { conversation }, done).await
    }

    async fn end_conversation_with_error(
        &self,
        conversation: Uuid,
        code: i32,
        description: &str,
    ) -> Result<(), TransportError> {
        let command = Command::EndConversationWithError {
            conversation,
            code,
            description: description.to_string(),
        };
        self.run(command, done).await
    }
}

impl<C> std::fmt::Debug for SessionTransport<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTransport").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryBroker, MemoryLogSink};
    use crate::ports::Session;
    use std::sync::Mutex;

    /// 指定した Reply / エラーを返し、commit と rollback を数える Connector
    #[derive(Clone, Default)]
    struct Recording {
        reply: Arc<Mutex<Option<Result<Reply, TransportError>>>>,
        fail_rollback: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    struct RecordingSession {
        reply: Result<Reply, TransportError>,
        fail_rollback: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Recording {
        fn replying(reply: Result<Reply, TransportError>) -> Self {
            Self {
                reply: Arc::new(Mutex::new(Some(reply))),
                ..Self::default()
            }
        }

        fn log(&self) -> Vec<&'static str> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Connector for Recording {
        async fn open(&self) -> Result<Box<dyn Session>, TransportError> {
            let reply = self.reply.lock().unwrap().take().unwrap_or(Ok(Reply::Done));
            Ok(Box::new(RecordingSession {
                reply,
                fail_rollback: self.fail_rollback,
                log: Arc::clone(&self.log),
            }))
        }
    }

    #[async_trait]
    impl Session for RecordingSession {
        async fn execute(&mut self, _command: Command) -> Result<Reply, TransportError> {
            self.reply.clone()
        }

        async fn commit(self: Box<Self>) -> Result<(), TransportError> {
            self.log.lock().unwrap().push("commit");
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<(), TransportError> {
            self.log.lock().unwrap().push("rollback");
            if self.fail_rollback {
                return Err(TransportError::Rollback("connection lost".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn success_commits() {
        let connector = Recording::replying(Ok(Reply::Done));
        let transport = SessionTransport::new(connector.clone());

        transport.end_conversation(Uuid::nil()).await.unwrap();

        assert_eq!(connector.log(), vec!["commit"]);
    }

    #[tokio::test]
    async fn failure_rolls_back_and_returns_original_error() {
        let connector = Recording::replying(Err(TransportError::Execute("deadlock".into())));
        let transport = SessionTransport::new(connector.clone());

        let err = transport.end_conversation(Uuid::nil()).await.unwrap_err();

        assert_eq!(err, TransportError::Execute("deadlock".into()));
        assert_eq!(connector.log(), vec!["rollback"]);
    }

    #[tokio::test]
    async fn rollback_failure_is_logged_not_returned() {
        let connector = Recording {
            fail_rollback: true,
            ..Recording::replying(Err(TransportError::Execute("deadlock".into())))
        };
        let sink = MemoryLogSink::new();
        let transport = SessionTransport::with_diagnostics(
            connector.clone(),
            Diagnostics::new(Arc::new(sink.clone())),
        );

        let err = transport.end_conversation(Uuid::nil()).await.unwrap_err();

        assert_eq!(err, TransportError::Execute("deadlock".into()));
        assert!(sink.messages()[0].contains("rollback failed"));
    }

    #[tokio::test]
    async fn wrong_reply_shape_is_rejected_and_rolled_back() {
        let connector = Recording::replying(Ok(Reply::Done));
        let transport = SessionTransport::new(connector.clone());

        let err = transport.begin_conversation("a", "b", "c").await.unwrap_err();

        assert_eq!(
            err,
            TransportError::UnexpectedReply {
                command: "begin_conversation",
                reply: "done",
            }
        );
        assert_eq!(connector.log(), vec!["rollback"]);
    }

    #[tokio::test]
    async fn round_trip_through_in_memory_broker() {
        let broker = InMemoryBroker::new();
        broker.bind_service("//t/Target", "target_q");
        broker.bind_service("//t/Initiator", "initiator_q");
        let transport = SessionTransport::new(broker.clone());

        let conversation = transport
            .begin_conversation("//t/Initiator", "//t/Target", "//t/Contract")
            .await
            .unwrap();
        let outgoing = Message::new("", "//t/Data", "ping", Uuid::nil(), conversation);
        transport.send(&outgoing).await.unwrap();

        let incoming = transport
            .receive("target_q", Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(incoming.body(), "ping");
        assert_eq!(broker.depth("target_q"), 0);

        transport.end_conversation(incoming.conversation()).await.unwrap();
        assert!(!broker.is_open(incoming.conversation()));
        assert_eq!(broker.depth("initiator_q"), 1);
    }
}
