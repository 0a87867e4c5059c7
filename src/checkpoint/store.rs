//! 检查点存储：按 session id 分区、带版本号的追加写
//!
//! put 必须携带期望版本；存储中的当前版本（不存在时为 0）与之不符即 VersionConflict。
//! 成功写入后版本为 expected + 1。

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::core::AgentError;
use crate::session::{PendingInterrupt, Session};

/// 会话的持久化快照
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: String,
    pub session: Session,
    /// 挂起的外部输入请求
    pub pending: Option<PendingInterrupt>,
    pub version: u64,
}

impl Checkpoint {
    pub fn of(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            session: session.clone(),
            pending: session.pending_interrupt(),
            version: session.version(),
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("version conflict: expected {expected}, actual {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid session id: {0}")]
    InvalidKey(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for AgentError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::VersionConflict { expected, actual } => {
                AgentError::CheckpointConflict { expected, actual }
            }
            other => AgentError::Store(other.to_string()),
        }
    }
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// 最新检查点；不存在时 None
    async fn get(&self, session_id: &str) -> Result<Option<Checkpoint>, StoreError>;

    /// 写入新版本，返回写入后的版本号
    async fn put(&self, checkpoint: &Checkpoint, expected_version: u64) -> Result<u64, StoreError>;
}

/// 会话 id 只允许字母数字、'-'、'_'（文件名与表键共用）
pub fn validate_session_id(id: &str) -> Result<(), StoreError> {
    let ok = !id.is_empty()
        && id.len() <= 128
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(id.to_string()))
    }
}

/// 内存存储：保留每个会话的全部历史版本
#[derive(Default)]
pub struct MemoryCheckpointStore {
    entries: RwLock<HashMap<String, Vec<Checkpoint>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn history_len(&self, session_id: &str) -> usize {
        self.entries
            .read()
            .await
            .get(session_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get(&self, session_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self
            .entries
            .read()
            .await
            .get(session_id)
            .and_then(|h| h.last().cloned()))
    }

    async fn put(&self, checkpoint: &Checkpoint, expected_version: u64) -> Result<u64, StoreError> {
        validate_session_id(&checkpoint.session_id)?;
        let mut entries = self.entries.write().await;
        let history = entries.entry(checkpoint.session_id.clone()).or_default();
        let actual = history.last().map(|c| c.version).unwrap_or(0);
        if actual != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                actual,
            });
        }
        let mut stored = checkpoint.clone();
        stored.version = expected_version + 1;
        history.push(stored);
        Ok(expected_version + 1)
    }
}
