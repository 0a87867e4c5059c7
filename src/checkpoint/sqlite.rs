//! SQLite 存储（feature = "sqlite"）：checkpoints 表按 (session_id, version) 追加

use std::path::Path;

use async_trait::async_trait;
use sqlx::Row;

use crate::checkpoint::{validate_session_id, Checkpoint, CheckpointStore, StoreError};

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

pub struct SqliteCheckpointStore {
    pool: sqlx::sqlite::SqlitePool,
}

impl SqliteCheckpointStore {
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());
        Self::connect(&db_url, 5).await
    }

    /// 内存库每个连接独立，测试时 max_connections 取 1
    pub async fn connect(db_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await?;
        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    async fn init_tables(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                session_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (session_id, version)
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn get(&self, session_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        validate_session_id(session_id)?;
        let row = sqlx::query(
            "SELECT data FROM checkpoints WHERE session_id = ? ORDER BY version DESC LIMIT 1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => {
                let data: String = row.get("data");
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, checkpoint: &Checkpoint, expected_version: u64) -> Result<u64, StoreError> {
        validate_session_id(&checkpoint.session_id)?;
        let mut tx = self.pool.begin().await?;

        let actual: i64 = sqlx::query(
            "SELECT COALESCE(MAX(version), 0) AS v FROM checkpoints WHERE session_id = ?",
        )
        .bind(&checkpoint.session_id)
        .fetch_one(&mut *tx)
        .await?
        .get("v");
        if actual as u64 != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                actual: actual as u64,
            });
        }

        let mut stored = checkpoint.clone();
        stored.version = expected_version + 1;
        let data = serde_json::to_string(&stored)?;
        // 并发写入同一版本时主键冲突，同样视为版本冲突
        let inserted = sqlx::query(
            "INSERT INTO checkpoints (session_id, version, data, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&stored.session_id)
        .bind(stored.version as i64)
        .bind(&data)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await;
        if let Err(e) = inserted {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return Err(StoreError::VersionConflict {
                        expected: expected_version,
                        actual: stored.version,
                    });
                }
            }
            return Err(e.into());
        }
        tx.commit().await?;
        tracing::debug!(session = %stored.session_id, version = stored.version, "checkpoint written");
        Ok(stored.version)
    }
}
