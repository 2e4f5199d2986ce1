//! Classifier - 受け取ったメッセージを購読者にどう伝えるかを決める
//!
//! 1 メッセージ 1 会話: 種別に関係なく、購読者に伝える前に会話を終了する。
//! 会話の終了に失敗したら、その失敗が分類結果の代わりになる。

use crate::domain::{BrokerError, Message, MessageKind};
use crate::ports::{Category, Diagnostics, Transport};

#[derive(Debug)]
pub enum Action {
    /// Data message: `on_next` for every subscriber.
    Deliver(Message),
    /// Error message or failed settlement: `on_error` for every subscriber.
    Fail(BrokerError),
    /// Control message: nobody is told.
    Ignore,
}

/// Pure mapping from message kind to action.
pub fn classify(message: &Message) -> Action {
    match message.message_kind() {
        MessageKind::Error => Action::Fail(BrokerError::error_message(
            message.conversation(),
            message.body(),
        )),
        MessageKind::EndConversation => Action::Ignore,
        MessageKind::Data => Action::Deliver(message.clone()),
    }
}

/// End the message's conversation, then classify it.
pub async fn settle(
    transport: &dyn Transport,
    message: &Message,
    diagnostics: &Diagnostics,
) -> Action {
    let conversation = message.conversation();
    diagnostics.trace(
        Category::Polling,
        format!("ending conversation {conversation}"),
    );

    if let Err(source) = transport.end_conversation(conversation).await {
        diagnostics.error(
            Category::Polling,
            format!("failed to end conversation {conversation}: {source}"),
        );
        return Action::Fail(BrokerError::EndConversation {
            conversation,
            source,
        });
    }

    let action = classify(message);
    match &action {
        Action::Deliver(_) => diagnostics.debug(
            Category::Polling,
            format!("delivering {} from {conversation}", message.kind()),
        ),
        Action::Fail(err) => diagnostics.debug(
            Category::Polling,
            format!("error message on {conversation}: {err}"),
        ),
        Action::Ignore => diagnostics.debug(
            Category::Polling,
            format!("conversation {conversation} ended by peer"),
        ),
    }
    action
}
