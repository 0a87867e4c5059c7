//! 检查点控制器：加载 / 提交会话，提交时携带会话当前版本做乐观并发检查

use std::path::Path;
use std::sync::Arc;

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::core::AgentError;
use crate::session::Session;

#[derive(Clone)]
pub struct CheckpointController {
    store: Arc<dyn CheckpointStore>,
}

impl CheckpointController {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self { store }
    }

    pub async fn inspect(&self, session_id: &str) -> Result<Checkpoint, AgentError> {
        self.store
            .get(session_id)
            .await?
            .ok_or_else(|| AgentError::SessionNotFound(session_id.to_string()))
    }

    /// 读取会话；会话中的版本号以检查点为准
    pub async fn load(&self, session_id: &str) -> Result<Session, AgentError> {
        let cp = self.inspect(session_id).await?;
        let mut session = cp.session;
        session.set_version(cp.version);
        Ok(session)
    }

    /// 不存在时创建新会话（尚未写入）
    pub async fn load_or_create(&self, session_id: &str, cwd: &Path) -> Result<Session, AgentError> {
        match self.store.get(session_id).await? {
            Some(cp) => {
                let mut session = cp.session;
                session.set_version(cp.version);
                Ok(session)
            }
            None => Ok(Session::new(session_id, cwd)),
        }
    }

    /// 以会话当前版本为期望版本写入；成功后会话版本前移
    pub async fn commit(&self, session: &mut Session) -> Result<u64, AgentError> {
        let expected = session.version();
        let version = self.store.put(&Checkpoint::of(session), expected).await?;
        session.set_version(version);
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::session::{payload, Role, StepKind};
    use serde_json::json;

    #[tokio::test]
    async fn test_commit_and_load() {
        let ctl = CheckpointController::new(Arc::new(MemoryCheckpointStore::new()));
        let mut s = ctl.load_or_create("s1", Path::new("/work")).await.unwrap();
        assert_eq!(s.version(), 0);
        s.append(Role::User, StepKind::Input, payload([("content", json!("hi"))]));
        assert_eq!(ctl.commit(&mut s).await.unwrap(), 1);
        assert_eq!(s.version(), 1);

        let loaded = ctl.load("s1").await.unwrap();
        assert_eq!(loaded.version(), 1);
        assert_eq!(loaded.turns().len(), 1);
    }

    #[tokio::test]
    async fn test_two_writers_one_loses() {
        let ctl = CheckpointController::new(Arc::new(MemoryCheckpointStore::new()));
        let mut s = Session::new("s1", "/work");
        ctl.commit(&mut s).await.unwrap();

        let mut a = ctl.load("s1").await.unwrap();
        let mut b = ctl.load("s1").await.unwrap();
        ctl.commit(&mut a).await.unwrap();
        assert!(matches!(
            ctl.commit(&mut b).await,
            Err(AgentError::CheckpointConflict { expected: 1, actual: 2 })
        ));
    }

    #[tokio::test]
    async fn test_missing_session() {
        let ctl = CheckpointController::new(Arc::new(MemoryCheckpointStore::new()));
        assert!(matches!(ctl.load("nope").await, Err(AgentError::SessionNotFound(_))));
    }
}
