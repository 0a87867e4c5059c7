//! Session：唯一拥有 Turn 记录的会话对象
//!
//! Turn 只能追加，不能修改或删除；同一时刻最多一个未完成的 ToolInvocation。

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{AgentError, SessionStatus};
use crate::session::{InvocationStatus, Payload, PendingInterrupt, Role, StepKind, ToolInvocation, Turn};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    turns: Vec<Turn>,
    status: SessionStatus,
    /// 检查点版本，每次成功写入后递增
    version: u64,
    /// 逻辑当前目录（始终位于沙箱根之内）
    cwd: PathBuf,
    outstanding: Option<ToolInvocation>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, cwd: impl AsRef<Path>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            turns: Vec::new(),
            status: SessionStatus::AwaitingInput,
            version: 0,
            cwd: cwd.as_ref().to_path_buf(),
            outstanding: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub(crate) fn set_cwd(&mut self, cwd: PathBuf) {
        self.cwd = cwd;
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// 追加一条 Turn，返回其副本
    pub fn append(&mut self, role: Role, kind: StepKind, payload: Payload) -> Turn {
        let turn = Turn {
            id: self.turns.len() as u64,
            role,
            kind,
            payload,
            timestamp: Utc::now(),
        };
        self.turns.push(turn.clone());
        self.updated_at = turn.timestamp;
        turn
    }

    /// 最近一次用户输入（作为检索的原始查询）
    pub fn last_user_input(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content())
    }

    pub fn outstanding(&self) -> Option<&ToolInvocation> {
        self.outstanding.as_ref()
    }

    /// 登记一个新的工具调用；已有未完成调用时拒绝
    pub(crate) fn begin_invocation(&mut self, invocation: ToolInvocation) -> Result<(), AgentError> {
        if let Some(existing) = &self.outstanding {
            if !existing.is_resolved() {
                return Err(AgentError::InterruptPending(self.id.clone()));
            }
        }
        self.outstanding = Some(invocation);
        Ok(())
    }

    /// 将当前调用标记为等待外部输入，返回中断记录
    pub(crate) fn suspend_invocation(&mut self, query: String) -> Option<PendingInterrupt> {
        let inv = self.outstanding.as_mut()?;
        inv.status = InvocationStatus::AwaitingExternalInput;
        inv.query = Some(query);
        self.status = SessionStatus::PausedOnTool;
        self.pending_interrupt()
    }

    /// 取出当前调用（完成后调用方负责写入 observe）
    pub(crate) fn take_outstanding(&mut self) -> Option<ToolInvocation> {
        self.outstanding.take()
    }

    pub fn pending_interrupt(&self) -> Option<PendingInterrupt> {
        let inv = self.outstanding.as_ref()?;
        if inv.status != InvocationStatus::AwaitingExternalInput {
            return None;
        }
        Some(PendingInterrupt {
            invocation_id: inv.id.clone(),
            tool: inv.tool.clone(),
            query: inv.query.clone().unwrap_or_default(),
            turn_id: inv.turn_id,
        })
    }

    /// 最后一条是已追加但尚未得到观察结果的派发步骤（且没有挂起中断）
    pub fn dangling_dispatch(&self) -> Option<&Turn> {
        if self.pending_interrupt().is_some() {
            return None;
        }
        self.turns.last().filter(|t| t.kind.dispatches())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::payload;
    use crate::tools::{SafetyVerdict, ToolResult};
    use serde_json::json;

    #[test]
    fn test_append_assigns_sequential_ids() {
        let mut s = Session::new("s1", "/work");
        let a = s.append(Role::User, StepKind::Input, payload([("content", json!("hi"))]));
        let b = s.append(Role::Model, StepKind::Think, payload([("content", json!("hmm"))]));
        assert_eq!(a.id, 0);
        assert_eq!(b.id, 1);
        assert_eq!(s.turns().len(), 2);
        assert_eq!(s.last_user_input(), Some("hi"));
    }

    #[test]
    fn test_single_outstanding_invocation() {
        let mut s = Session::new("s1", "/work");
        let inv = ToolInvocation::new("run_commands", json!("ls"), SafetyVerdict::Allowed, 0);
        s.begin_invocation(inv).unwrap();
        let second = ToolInvocation::new("run_commands", json!("pwd"), SafetyVerdict::Allowed, 1);
        assert!(matches!(
            s.begin_invocation(second),
            Err(AgentError::InterruptPending(_))
        ));

        let mut done = s.take_outstanding().unwrap();
        done.complete(ToolResult::executed("ok"));
        assert!(done.is_resolved());
        let third = ToolInvocation::new("run_commands", json!("pwd"), SafetyVerdict::Allowed, 2);
        assert!(s.begin_invocation(third).is_ok());
    }

    #[test]
    fn test_suspend_produces_pending_interrupt() {
        let mut s = Session::new("s1", "/work");
        s.append(Role::Model, StepKind::ToolCall, Payload::new());
        let inv = ToolInvocation::new("human_assistance", json!({"query": "refund?"}), SafetyVerdict::NeedsConfirmation, 0);
        s.begin_invocation(inv).unwrap();
        let pending = s.suspend_invocation("refund?".into()).unwrap();
        assert_eq!(pending.tool, "human_assistance");
        assert_eq!(pending.query, "refund?");
        assert_eq!(s.status(), SessionStatus::PausedOnTool);
        assert!(s.dangling_dispatch().is_none());
    }

    #[test]
    fn test_dangling_dispatch_detected() {
        let mut s = Session::new("s1", "/work");
        s.append(Role::User, StepKind::Input, Payload::new());
        assert!(s.dangling_dispatch().is_none());
        s.append(Role::Model, StepKind::Retrieve, Payload::new());
        assert_eq!(s.dangling_dispatch().map(|t| t.id), Some(1));
    }
}
