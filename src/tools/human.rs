//! 人工协助工具：调用即挂起会话，等待外部回答

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{Tool, ToolContext, ToolOutcome, ToolResult, ToolSafety};

pub struct HumanAssistanceTool;

fn query_of(args: &Value) -> Option<String> {
    match args {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("query")
            .or_else(|| map.get("question"))
            .and_then(|v| v.as_str())
            .map(String::from),
        _ => None,
    }
    .filter(|q| !q.trim().is_empty())
}

#[async_trait]
impl Tool for HumanAssistanceTool {
    fn name(&self) -> &str {
        "human_assistance"
    }

    fn description(&self) -> &str {
        "Ask a human for help when you are stuck or need information only a person can give. \
         Args: {\"query\": \"question for the human\"}"
    }

    fn safety(&self) -> ToolSafety {
        ToolSafety::ExternalInput
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Question for the human" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &mut ToolContext<'_>) -> ToolOutcome {
        match query_of(&args) {
            Some(query) => ToolOutcome::AwaitingExternalInput { query },
            None => ToolOutcome::Completed(ToolResult::error("human_assistance requires a query")),
        }
    }

    fn complete_external(&self, answer: &str) -> ToolResult {
        ToolResult::executed(format!("Human support replied: {answer}"))
    }
}
