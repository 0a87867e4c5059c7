//! 工具执行结果

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::tools::SafetyVerdict;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Executed,
    Rejected,
    Error,
    NotFound,
}

/// 组合命令中单条子命令的执行记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub command: String,
    /// 执行时（cd 则为切换后）的目录
    pub cwd: PathBuf,
    pub status: ToolStatus,
    pub verdict: SafetyVerdict,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub verdict: SafetyVerdict,
    /// 组合命令的逐条记录（非 shell 工具为空）
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<CommandRecord>,
}

impl ToolResult {
    pub fn executed(stdout: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Executed,
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
            verdict: SafetyVerdict::Allowed,
            commands: Vec::new(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Rejected,
            stdout: String::new(),
            stderr: reason.into(),
            exit_code: None,
            verdict: SafetyVerdict::Rejected,
            commands: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            stdout: String::new(),
            stderr: message.into(),
            exit_code: None,
            verdict: SafetyVerdict::Allowed,
            commands: Vec::new(),
        }
    }

    pub fn not_found(tool: &str) -> Self {
        Self {
            status: ToolStatus::NotFound,
            stdout: String::new(),
            stderr: format!("{tool} - This tool is currently not available or does not exist."),
            exit_code: None,
            verdict: SafetyVerdict::Rejected,
            commands: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Executed
    }

    /// 非成功结果对应的错误（用于 observe 内容与恢复策略）
    pub fn to_error(&self, tool: &str) -> Option<AgentError> {
        match self.status {
            ToolStatus::Executed => None,
            ToolStatus::NotFound => Some(AgentError::ToolNotFound(tool.to_string())),
            ToolStatus::Rejected => Some(AgentError::ToolRejected(self.stderr.clone())),
            ToolStatus::Error => Some(AgentError::ToolExecution(self.stderr.clone())),
        }
    }
}

/// 工具执行的两种结局：同步得到结果，或需要外部输入
#[derive(Clone, Debug, PartialEq)]
pub enum ToolOutcome {
    Completed(ToolResult),
    AwaitingExternalInput { query: String },
}
