//! IdGenerator port - 会話 ID の生成
//!
//! ブローカー側（`InMemoryBroker` など）が会話と会話グループの ID を払い出すために使います。
//! テストで決定的な ID を使えるよう trait として抽象化しています。
//!
//! # 実装
//! - **RandomIds**: UUID v4（本番用）

use uuid::{Builder, Uuid};

pub trait IdGenerator: Send + Sync {
    /// 新しい会話 ID
    fn conversation_id(&self) -> Uuid;

    /// 新しい会話グループ ID
    fn conversation_group_id(&self) -> Uuid;
}

/// UUID v4 を `rand` で生成
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl RandomIds {
    pub fn generate() -> Uuid {
        Builder::from_random_bytes(rand::random()).into_uuid()
    }
}

impl IdGenerator for RandomIds {
    fn conversation_id(&self) -> Uuid {
        Self::generate()
    }

    fn conversation_group_id(&self) -> Uuid {
        Self::generate()
    }
}
