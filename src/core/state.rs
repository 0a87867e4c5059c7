//! 状态定义：会话持久状态 SessionStatus 与单轮循环状态 LoopState
//!
//! SessionStatus 随检查点落盘；LoopState 只存在于一次 submit / resume 调用内部。

use serde::{Deserialize, Serialize};

/// 会话状态（持久化）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// 正在生成 / 执行中
    Active,
    /// 等待用户输入（新会话、最终回答之后、模型提出澄清问题之后）
    AwaitingInput,
    /// 工具要求外部（人工）输入，等待 resume
    PausedOnTool,
    /// 会话已被用户关闭
    Terminal,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::AwaitingInput => "awaiting_input",
            Self::PausedOnTool => "paused_on_tool",
            Self::Terminal => "terminal",
        }
    }
}

/// 单轮内的控制器状态机
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    AwaitingUserInput,
    Generating,
    Thinking,
    AwaitingClarification,
    InvokingTool,
    Retrieving,
    /// 工具已挂起等待外部输入，控制权交还调用方
    Suspended,
    AwaitingObservation,
    Terminal,
}

impl LoopState {
    /// 合法迁移；任何状态都可以因协议失败回到 AwaitingUserInput
    pub fn can_transition_to(&self, next: LoopState) -> bool {
        use LoopState::*;
        if next == AwaitingUserInput {
            return true;
        }
        match self {
            AwaitingUserInput => matches!(next, Generating),
            Generating => matches!(
                next,
                Thinking | AwaitingClarification | InvokingTool | Retrieving | Terminal
            ),
            Thinking => matches!(next, Generating),
            AwaitingClarification => false,
            InvokingTool => matches!(next, AwaitingObservation | Suspended),
            Retrieving => matches!(next, AwaitingObservation),
            Suspended => matches!(next, AwaitingObservation),
            AwaitingObservation => matches!(next, Generating),
            Terminal => false,
        }
    }
}
