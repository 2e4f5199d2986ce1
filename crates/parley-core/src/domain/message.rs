//! Message - キューから受け取る（またはキューに送る）1 件
//!
//! # 設計
//! - 不変の値: フィールドは非公開、`with_*` は変更したコピーを返す
//! - 等価性は全フィールドの値で判定
//! - `Message::empty()` は「この poll では何も無かった」を表す番兵

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::kind::MessageKind;

/// A message as the broker hands it out.
///
/// Absent text (a NULL column, a missing contract) normalizes to the empty
/// string, so none of the string fields is ever "missing".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    contract: String,
    kind: String,
    body: String,
    conversation_group: Uuid,
    conversation: Uuid,
}

impl Message {
    pub fn new(
        contract: impl Into<String>,
        kind: impl Into<String>,
        body: impl Into<String>,
        conversation_group: Uuid,
        conversation: Uuid,
    ) -> Self {
        Self {
            contract: contract.into(),
            kind: kind.into(),
            body: body.into(),
            conversation_group,
            conversation,
        }
    }

    /// Build a message from nullable columns.
    pub fn from_parts(
        contract: Option<String>,
        kind: Option<String>,
        body: Option<String>,
        conversation_group: Option<Uuid>,
        conversation: Option<Uuid>,
    ) -> Self {
        Self {
            contract: contract.unwrap_or_default(),
            kind: kind.unwrap_or_default(),
            body: body.unwrap_or_default(),
            conversation_group: conversation_group.unwrap_or_else(Uuid::nil),
            conversation: conversation.unwrap_or_else(Uuid::nil),
        }
    }

    /// The "no message available" sentinel.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::empty()
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message_kind(&self) -> MessageKind {
        MessageKind::of(&self.kind)
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn conversation_group(&self) -> Uuid {
        self.conversation_group
    }

    pub fn conversation(&self) -> Uuid {
        self.conversation
    }

    pub fn with_contract(&self, contract: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            ..self.clone()
        }
    }

    pub fn with_kind(&self, kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..self.clone()
        }
    }

    pub fn with_body(&self, body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..self.clone()
        }
    }

    pub fn with_conversation(&self, conversation_group: Uuid, conversation: Uuid) -> Self {
        Self {
            conversation_group,
            conversation,
            ..self.clone()
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "contract={} kind={} body={} group={} conversation={}",
            self.contract, self.kind, self.body, self.conversation_group, self.conversation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sample() -> Message {
        Message::new(
            "contract",
            "kind",
            "body",
            Uuid::from_u128(1),
            Uuid::from_u128(2),
        )
    }

    #[test]
    fn empty_equals_all_blank_fields() {
        let blank = Message::new("", "", "", Uuid::nil(), Uuid::nil());
        assert_eq!(Message::empty(), blank);
        assert!(blank.is_empty());
        assert!(!sample().is_empty());
    }

    #[test]
    fn identical_fields_are_equal() {
        assert_eq!(sample(), sample());
    }

    #[rstest]
    #[case::contract(sample().with_contract("other"))]
    #[case::kind(sample().with_kind("other"))]
    #[case::body(sample().with_body("other"))]
    #[case::group(sample().with_conversation(Uuid::from_u128(9), Uuid::from_u128(2)))]
    #[case::conversation(sample().with_conversation(Uuid::from_u128(1), Uuid::from_u128(9)))]
    fn any_differing_field_breaks_equality(#[case] changed: Message) {
        assert_ne!(sample(), changed);
    }

    #[test]
    fn absent_parts_normalize_to_empty() {
        let msg = Message::from_parts(None, Some("kind".into()), None, None, None);
        assert_eq!(msg.contract(), "");
        assert_eq!(msg.body(), "");
        assert_eq!(msg.conversation(), Uuid::nil());
        assert_eq!(msg, Message::empty().with_kind("kind"));
    }

    #[test]
    fn builders_leave_original_untouched() {
        let original = sample();
        let changed = original.with_body("new body");
        assert_eq!(original.body(), "body");
        assert_eq!(changed.body(), "new body");
        assert_eq!(changed.kind(), original.kind());
    }

    #[test]
    fn display_names_every_field() {
        let text = sample().to_string();
        assert!(text.contains("kind=kind"));
        assert!(text.contains("body=body"));
        assert!(text.contains(&Uuid::from_u128(2).to_string()));
    }

    #[test]
    fn messages_can_be_serialized() {
        let msg = sample();
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }
}
