//! JSONL 文件存储：每个会话一个 `<id>.jsonl`，每次写入追加一行完整检查点
//!
//! 读取取最后一条可解析的记录；写入中途崩溃留下的半行会被忽略。
//! 版本检查在进程内串行化，不防多进程并发写同一会话。
//! 写入时缓存每个会话的最新版本与文件长度，长度未变就不必重读整个文件。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::checkpoint::{validate_session_id, Checkpoint, CheckpointStore, StoreError};

/// 本实例上次写入后的文件状态
#[derive(Clone, Copy, Debug)]
struct Tail {
    version: u64,
    len: u64,
}

pub struct FileCheckpointStore {
    dir: PathBuf,
    /// 同时充当写锁
    tails: Mutex<HashMap<String, Tail>>,
}

impl FileCheckpointStore {
    pub async fn new(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            tails: Mutex::new(HashMap::new()),
        })
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf, StoreError> {
        validate_session_id(session_id)?;
        Ok(self.dir.join(format!("{session_id}.jsonl")))
    }

    async fn read_text(path: &Path) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(path).await {
            Ok(t) => Ok(Some(t)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn file_len(path: &Path) -> Result<u64, StoreError> {
        match tokio::fs::metadata(path).await {
            Ok(m) => Ok(m.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// 从后往前取第一条可解析的记录
    fn latest(path: &Path, text: &str) -> Option<Checkpoint> {
        text.lines()
            .rev()
            .filter(|l| !l.trim().is_empty())
            .find_map(|line| match serde_json::from_str::<Checkpoint>(line) {
                Ok(cp) => Some(cp),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring torn checkpoint line");
                    None
                }
            })
    }

    /// 可解析的历史版本数
    pub async fn history_len(&self, session_id: &str) -> Result<usize, StoreError> {
        let path = self.path_for(session_id)?;
        Ok(Self::read_text(&path)
            .await?
            .map(|t| {
                t.lines()
                    .filter(|l| serde_json::from_str::<Checkpoint>(l).is_ok())
                    .count()
            })
            .unwrap_or(0))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn get(&self, session_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        let path = self.path_for(session_id)?;
        Ok(Self::read_text(&path)
            .await?
            .and_then(|text| Self::latest(&path, &text)))
    }

    async fn put(&self, checkpoint: &Checkpoint, expected_version: u64) -> Result<u64, StoreError> {
        let path = self.path_for(&checkpoint.session_id)?;
        let mut tails = self.tails.lock().await;

        // 文件长度与上次写入后一致时沿用缓存；否则（首次写入、他处写过、有半行）重读
        let len = Self::file_len(&path).await?;
        let (actual, torn) = match tails.get(&checkpoint.session_id) {
            Some(tail) if tail.len == len => (tail.version, false),
            _ => {
                let text = Self::read_text(&path).await?.unwrap_or_default();
                let actual = Self::latest(&path, &text).map(|c| c.version).unwrap_or(0);
                (actual, !text.is_empty() && !text.ends_with('\n'))
            }
        };
        if actual != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                actual,
            });
        }

        let mut stored = checkpoint.clone();
        stored.version = expected_version + 1;
        let mut line = String::new();
        // 上次写入若留下半行，先换行隔开
        if torn {
            line.push('\n');
        }
        line.push_str(&serde_json::to_string(&stored)?);
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.sync_data().await?;
        tails.insert(
            checkpoint.session_id.clone(),
            Tail {
                version: stored.version,
                len: len + line.len() as u64,
            },
        );
        tracing::debug!(session = %checkpoint.session_id, version = stored.version, "checkpoint written");
        Ok(stored.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_store_roundtrip_and_conflict() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path()).await.unwrap();
        let cp = Checkpoint::of(&Session::new("s1", "/work"));

        assert_eq!(store.put(&cp, 0).await.unwrap(), 1);
        assert_eq!(store.put(&cp, 1).await.unwrap(), 2);
        assert!(matches!(
            store.put(&cp, 1).await,
            Err(StoreError::VersionConflict { expected: 1, actual: 2 })
        ));

        // 新实例读到同样的内容
        let reopened = FileCheckpointStore::new(dir.path()).await.unwrap();
        let latest = reopened.get("s1").await.unwrap().unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(latest.session.id, "s1");
        assert_eq!(reopened.history_len("s1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_torn_last_line_ignored() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path()).await.unwrap();
        let cp = Checkpoint::of(&Session::new("s1", "/work"));
        store.put(&cp, 0).await.unwrap();

        let path = dir.path().join("s1.jsonl");
        let mut f = tokio::fs::OpenOptions::new().append(true).open(&path).await.unwrap();
        f.write_all(b"{\"session_id\": \"s1\", \"sess").await.unwrap();
        drop(f);

        assert_eq!(store.get("s1").await.unwrap().unwrap().version, 1);
        assert_eq!(store.put(&cp, 1).await.unwrap(), 2);
        assert_eq!(store.get("s1").await.unwrap().unwrap().version, 2);
        assert_eq!(store.history_len("s1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_write_from_another_instance_detected() {
        let dir = TempDir::new().unwrap();
        let first = FileCheckpointStore::new(dir.path()).await.unwrap();
        let second = FileCheckpointStore::new(dir.path()).await.unwrap();
        let cp = Checkpoint::of(&Session::new("s1", "/work"));

        assert_eq!(first.put(&cp, 0).await.unwrap(), 1);
        assert_eq!(second.put(&cp, 1).await.unwrap(), 2);
        // first 缓存的还是版本 1，但文件长度变了
        assert!(matches!(
            first.put(&cp, 1).await,
            Err(StoreError::VersionConflict { expected: 1, actual: 2 })
        ));
        assert_eq!(first.put(&cp, 2).await.unwrap(), 3);
        assert_eq!(first.put(&cp, 3).await.unwrap(), 4);
        assert_eq!(second.get("s1").await.unwrap().unwrap().version, 4);
        assert_eq!(second.history_len("s1").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_invalid_id_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path()).await.unwrap();
        assert!(matches!(store.get("../x").await, Err(StoreError::InvalidKey(_))));
    }
}
