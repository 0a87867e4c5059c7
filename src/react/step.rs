//! 模型步骤协议：一次回复恰好一个 JSON 步骤对象
//!
//! parse_step 从回复中提取 JSON（```json 代码块或最外层花括号），按 "step" 字段分类；
//! 兼容多种别名（plan / understand / action / resolve ...）。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::session::{payload, Payload, StepKind};

/// 步骤对象的线上格式（仅用于生成提示词中的 JSON Schema）
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepObject {
    /// think | ask | decide_tool | tool_call | retrieve | final
    pub step: String,
    /// 思考内容、问题或最终回答
    #[serde(default)]
    pub content: Option<String>,
    /// 工具名（仅 tool_call）
    #[serde(default)]
    pub tool: Option<String>,
    /// 工具参数（仅 tool_call）
    #[serde(default)]
    pub args: Option<Value>,
    /// 改写后的检索查询（仅 retrieve）
    #[serde(default)]
    pub queries: Option<Vec<String>>,
}

pub fn step_schema_json() -> String {
    let schema = schemars::schema_for!(StepObject);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".to_string())
}

/// 分类后的模型步骤
#[derive(Debug, Clone, PartialEq)]
pub enum ModelStep {
    Think { content: String },
    Ask { content: String },
    DecideTool { content: String },
    ToolCall { tool: String, args: Value, content: String },
    Retrieve { queries: Vec<String>, content: String },
    Final { content: String },
}

impl ModelStep {
    pub fn kind(&self) -> StepKind {
        match self {
            Self::Think { .. } => StepKind::Think,
            Self::Ask { .. } => StepKind::Ask,
            Self::DecideTool { .. } => StepKind::DecideTool,
            Self::ToolCall { .. } => StepKind::ToolCall,
            Self::Retrieve { .. } => StepKind::Retrieve,
            Self::Final { .. } => StepKind::Final,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Think { content }
            | Self::Ask { content }
            | Self::DecideTool { content }
            | Self::ToolCall { content, .. }
            | Self::Retrieve { content, .. }
            | Self::Final { content } => content,
        }
    }

    /// 写入 Turn 的规范化 payload
    pub fn to_payload(&self) -> Payload {
        let mut p = payload([("content", Value::String(self.content().to_string()))]);
        match self {
            Self::ToolCall { tool, args, .. } => {
                p.insert("tool".into(), Value::String(tool.clone()));
                p.insert("args".into(), args.clone());
            }
            Self::Retrieve { queries, .. } => {
                p.insert(
                    "queries".into(),
                    Value::Array(queries.iter().cloned().map(Value::String).collect()),
                );
            }
            _ => {}
        }
        p
    }

    /// 规范化的 JSON 形式（作为 assistant 消息回放给模型）
    pub fn to_json(&self) -> String {
        let mut p = self.to_payload();
        p.insert("step".into(), Value::String(self.kind().as_str().to_string()));
        Value::Object(p).to_string()
    }
}

/// 从回复文本中取出 JSON 片段
pub fn extract_json(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

fn first_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match obj.get(*k) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    })
}

fn string_list(v: &Value) -> Option<Vec<String>> {
    v.as_array()?
        .iter()
        .map(|q| q.as_str().map(String::from))
        .collect()
}

pub fn parse_step(raw: &str) -> Result<ModelStep, AgentError> {
    let json = extract_json(raw).ok_or_else(|| AgentError::ProtocolParse("no JSON object found".into()))?;
    let value: Value =
        serde_json::from_str(json).map_err(|e| AgentError::ProtocolParse(format!("invalid JSON: {e}")))?;
    let Value::Object(obj) = value else {
        return Err(AgentError::ProtocolParse("step must be a JSON object".into()));
    };
    let step = first_str(&obj, &["step"])
        .ok_or_else(|| AgentError::ProtocolParse("missing \"step\" field".into()))?
        .trim()
        .to_lowercase();
    let content = first_str(&obj, &["content", "message", "answer", "output"]);
    let require_content = |kind: &str| {
        content
            .clone()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AgentError::ProtocolParse(format!("\"{kind}\" step requires content")))
    };

    match step.as_str() {
        "think" | "understand" | "plan" | "review" | "analyze" | "analysis" => Ok(ModelStep::Think {
            content: require_content(&step)?,
        }),
        "ask" | "clarify" => Ok(ModelStep::Ask {
            content: require_content(&step)?,
        }),
        "decide_tool" | "run_command" => Ok(ModelStep::DecideTool {
            content: content.unwrap_or_default(),
        }),
        "tool_call" | "action" | "tool" => {
            let tool = first_str(&obj, &["tool", "tool_call", "function"])
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| AgentError::ProtocolParse("tool_call step requires a tool name".into()))?;
            let args = ["args", "input", "arguments"]
                .iter()
                .find_map(|k| obj.get(*k).cloned())
                .unwrap_or(Value::Null);
            Ok(ModelStep::ToolCall {
                tool: tool.trim().to_string(),
                args,
                content: content.unwrap_or_default(),
            })
        }
        "retrieve" | "generate_queries" | "generated_queries" => {
            let queries = ["queries", "generated_queries", "content"]
                .iter()
                .filter_map(|k| obj.get(*k))
                .find_map(string_list)
                .ok_or_else(|| AgentError::ProtocolParse("retrieve step requires \"queries\": [string]".into()))?;
            // content 可能就是查询数组
            let content = match obj.get("content") {
                Some(Value::String(s)) => s.clone(),
                _ => String::new(),
            };
            Ok(ModelStep::Retrieve { queries, content })
        }
        "final" | "final_answer" | "answer" | "resolve" | "result" | "output" => Ok(ModelStep::Final {
            content: require_content(&step)?,
        }),
        "observe" => Err(AgentError::ProtocolParse(
            "observe steps are produced by the engine, not the model".into(),
        )),
        other => Err(AgentError::ProtocolParse(format!("unknown step \"{other}\""))),
    }
}
