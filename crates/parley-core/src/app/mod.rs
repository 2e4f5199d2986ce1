//! App - エンジン層
//!
//! ports を組み合わせて受信・配信・停止を実装します。
//!
//! # 主要コンポーネント
//! - **ClientBuilder**: BrokerClient の構築
//! - **BrokerClient**: 購読、受信開始、会話の開始と送信
//! - **SubscriberRegistry**: 購読者の登録（インスタンス単位で重複なし）
//! - **ReceiveLoop**: receive → 会話終了 → 分類 → 配信
//! - **OutstandingWork**: 停止時に待つべき作業
//! - **RunningClient**: 停止プロトコル（ShutdownResult を返す）

pub mod builder;
pub mod classifier;
pub mod client;
pub mod delivery;
pub mod receive_loop;
pub mod registry;
pub mod running;
pub mod work;

#[cfg(test)]
pub(crate) mod testing;

pub use self::builder::{BuildError, ClientBuilder};
pub use self::classifier::{Action, classify};
pub use self::client::{BrokerClient, ClientStatus};
pub use self::receive_loop::RECEIVE_TIMEOUT;
pub use self::registry::{SubscriberRegistry, Subscription};
pub use self::running::RunningClient;
pub use self::work::OutstandingWork;
