//! LauncherConfig - JSON で与えるデモ実行の設定
//!
//! 全フィールドにデフォルトがあるので、部分的な JSON でも読み込めます。
//! ```json
//! { "queue": "orders_queue", "bodies": ["a", "b"], "run_for_ms": 500 }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LauncherConfig {
    /// 受信するキュー（target_service に紐づく）
    pub queue: String,
    pub initiator_service: String,
    pub initiator_queue: String,
    pub target_service: String,
    pub contract: String,
    pub kind: String,
    /// 1 件ごとに新しい会話で送る本文
    pub bodies: Vec<String>,
    /// 指定すると、会話をこの説明付きでエラー終了させる
    pub reject_with: Option<String>,
    pub run_for_ms: u64,
    /// `PARLEY_LOG` が無いときの EnvFilter
    pub log_filter: String,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            queue: "parley_target_queue".into(),
            initiator_service: "//parley/demo/Initiator".into(),
            initiator_queue: "parley_initiator_queue".into(),
            target_service: "//parley/demo/Target".into(),
            contract: "//parley/demo/Contract".into(),
            kind: "//parley/demo/Greeting".into(),
            bodies: vec!["hello".into(), "world".into()],
            reject_with: None,
            run_for_ms: 300,
            log_filter: "info".into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl LauncherConfig {
    /// `path` が None ならデフォルト
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn run_for(&self) -> Duration {
        Duration::from_millis(self.run_for_ms)
    }
}
