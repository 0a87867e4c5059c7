//! 检查点层：版本化会话存储（内存 / JSONL 文件 / SQLite）与控制器

pub mod controller;
pub mod file;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;

pub use controller::CheckpointController;
pub use file::FileCheckpointStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCheckpointStore;
pub use store::{validate_session_id, Checkpoint, CheckpointStore, MemoryCheckpointStore, StoreError};
