//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / safety / execute），由 ToolRegistry 按名注册为
//! ToolDescriptor；ToolExecutor 调用时构造 ToolContext（沙箱、策略、确认、命令执行面、当前目录）。

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::{CommandRunner, Confirmer, SafetyPolicy, SafetyVerdict, Sandbox, ToolOutcome, ToolResult};

/// 工具声明的安全等级
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSafety {
    /// 执行命令，每条命令经 SafetyPolicy 分类
    Guarded,
    /// 需要外部（人工）输入，调用会挂起会话
    ExternalInput,
}

impl ToolSafety {
    /// 派发前的初始判定
    pub fn initial_verdict(&self) -> SafetyVerdict {
        match self {
            ToolSafety::Guarded => SafetyVerdict::Allowed,
            ToolSafety::ExternalInput => SafetyVerdict::NeedsConfirmation,
        }
    }
}

/// 单次调用的执行上下文；工具可修改 cwd（仅限沙箱内）
///
/// timeout 只约束实际的命令执行，等待人工确认的时间不计入。
pub struct ToolContext<'a> {
    pub cwd: PathBuf,
    pub timeout: Duration,
    pub sandbox: &'a Sandbox,
    pub policy: &'a SafetyPolicy,
    pub confirmer: &'a dyn Confirmer,
    pub runner: &'a dyn CommandRunner,
}

#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（模型输出 JSON 中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供模型理解功能）
    fn description(&self) -> &str;

    fn safety(&self) -> ToolSafety;

    /// 参数 JSON Schema，默认无约束
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, args: Value, ctx: &mut ToolContext<'_>) -> ToolOutcome;

    /// 外部回答到达后生成的结果
    fn complete_external(&self, answer: &str) -> ToolResult {
        ToolResult::executed(answer)
    }
}

/// 注册表条目：处理器 + 描述 + 安全等级
#[derive(Clone)]
pub struct ToolDescriptor {
    pub handler: Arc<dyn Tool>,
    pub description: String,
    pub safety: ToolSafety,
}

/// 初始化后只读；BTreeMap 保证提示词中工具顺序稳定
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        let descriptor = ToolDescriptor {
            description: tool.description().to_string(),
            safety: tool.safety(),
            handler: Arc::new(tool),
        };
        self.tools.insert(name, descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// 工具清单（名称、描述、安全等级、参数 Schema），写入系统提示词
    pub fn to_schema_json(&self) -> String {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|(name, d)| {
                serde_json::json!({
                    "name": name,
                    "description": d.description,
                    "safety": d.safety,
                    "parameters": d.handler.parameters_schema()
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}
