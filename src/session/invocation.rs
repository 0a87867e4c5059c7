//! 工具调用记录与中断记录

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::{SafetyVerdict, ToolResult, ToolStatus};

/// 工具调用生命周期
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    /// 已追加 tool_call，尚未得到结果
    Pending,
    /// 等待外部（人工）输入
    AwaitingExternalInput,
    Completed,
    Rejected,
    Failed,
    /// 进程在派发前后崩溃，结果丢失
    Abandoned,
}

/// 一次工具调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub tool: String,
    pub args: Value,
    pub verdict: SafetyVerdict,
    pub status: InvocationStatus,
    pub result: Option<ToolResult>,
    /// 对应 tool_call Turn 的序号
    pub turn_id: u64,
    /// 外部输入问题（仅 AwaitingExternalInput 时存在）
    #[serde(default)]
    pub query: Option<String>,
}

impl ToolInvocation {
    pub fn new(tool: impl Into<String>, args: Value, verdict: SafetyVerdict, turn_id: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tool: tool.into(),
            args,
            verdict,
            status: InvocationStatus::Pending,
            result: None,
            turn_id,
            query: None,
        }
    }

    /// 写入结果并据此确定最终状态
    pub fn complete(&mut self, result: ToolResult) {
        self.status = match result.status {
            ToolStatus::Executed => InvocationStatus::Completed,
            ToolStatus::Rejected => InvocationStatus::Rejected,
            ToolStatus::Error | ToolStatus::NotFound => InvocationStatus::Failed,
        };
        self.verdict = result.verdict;
        self.result = Some(result);
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(
            self.status,
            InvocationStatus::Pending | InvocationStatus::AwaitingExternalInput
        )
    }
}

/// 检查点中的挂起中断：哪个工具在等待什么问题的回答
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInterrupt {
    pub invocation_id: String,
    pub tool: String,
    pub query: String,
    pub turn_id: u64,
}
