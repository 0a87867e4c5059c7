//! Turn：会话记录中的最小不可变单元

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Turn 的键值内容
pub type Payload = Map<String, Value>;

/// 发言方
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Model,
    Tool,
}

/// 步骤类型（模型输出经分类后的结果，外加用户输入与观察）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// 用户输入
    Input,
    /// 思考 / 分析，无副作用
    Think,
    /// 请求用户澄清，挂起循环
    Ask,
    /// 分支决策，无副作用
    DecideTool,
    /// 调用工具
    ToolCall,
    /// 多查询检索扇出
    Retrieve,
    /// 工具 / 检索结果
    Observe,
    /// 最终回答，结束本轮
    Final,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Think => "think",
            Self::Ask => "ask",
            Self::DecideTool => "decide_tool",
            Self::ToolCall => "tool_call",
            Self::Retrieve => "retrieve",
            Self::Observe => "observe",
            Self::Final => "final",
        }
    }

    /// 需要在追加后执行副作用的步骤
    pub fn dispatches(&self) -> bool {
        matches!(self, Self::ToolCall | Self::Retrieve)
    }
}

/// 一条已追加的记录；追加后不再修改
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// 在会话中的序号（从 0 开始）
    pub id: u64,
    pub role: Role,
    pub kind: StepKind,
    pub payload: Payload,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// payload 中的 "content" 字段，没有则为空串
    pub fn content(&self) -> &str {
        self.payload
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or("")
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

/// 由若干 (key, value) 构建 Payload
pub fn payload<I, K>(entries: I) -> Payload
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    entries.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
