//! 引擎错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定 RetryWithPrompt / Observe / Abort。

use thiserror::Error;

/// 引擎运行过程中可能出现的错误（协议解析、工具、检索、检查点、中断等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 模型输出不符合步骤 Schema
    #[error("Protocol parse error: {0}")]
    ProtocolParse(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// 沙箱拒绝（危险命令、目录越界、用户拒绝确认）
    #[error("Tool rejected: {0}")]
    ToolRejected(String),

    /// 非零退出码或执行异常
    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Retrieval partially failed: {failed}/{total} queries")]
    RetrievalPartialFailure { failed: usize, total: usize },

    #[error("Retrieval returned no chunks above threshold")]
    RetrievalEmpty { degraded: bool },

    #[error("Checkpoint conflict: expected version {expected}, found {actual}")]
    CheckpointConflict { expected: u64, actual: u64 },

    /// 会话正等待外部输入时又提交了新一轮
    #[error("Interrupt pending on session {0}")]
    InterruptPending(String),

    #[error("No pending interrupt on session {0}")]
    NoPendingInterrupt(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session closed: {0}")]
    SessionClosed(String),

    #[error("Step limit exceeded ({0})")]
    StepLimitExceeded(usize),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl AgentError {
    /// 可作为 observe 步骤回传给模型的错误（工具 / 检索类）
    pub fn is_observable(&self) -> bool {
        matches!(
            self,
            AgentError::ToolNotFound(_)
                | AgentError::ToolRejected(_)
                | AgentError::ToolExecution(_)
                | AgentError::ToolTimeout(_)
                | AgentError::RetrievalPartialFailure { .. }
                | AgentError::RetrievalEmpty { .. }
        )
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone)]
pub enum RecoveryAction {
    /// 将纠正提示注入下一次模型调用（如 JSON 格式错误）
    RetryWithPrompt(String),
    /// 作为 observe 步骤写入对话，让模型自行应对
    Observe(String),
    /// 终止当前轮次，直接报告给调用方
    Abort,
}
