//! Planner：拼装提示词，调用 LLM 得到下一个步骤
//!
//! 对话记录按 Turn 渲染为消息；模型输出不符合步骤协议时，由 RecoveryEngine 生成纠正提示重试，
//! 纠正提示只出现在本次请求中，不写入会话记录。

use std::sync::Arc;

use serde_json::Value;

use crate::core::{AgentError, RecoveryAction, RecoveryEngine};
use crate::llm::{LlmClient, Message, TokenUsage};
use crate::react::{parse_step, step_schema_json, ModelStep};
use crate::session::{Role, StepKind, Turn};
use crate::tools::ToolRegistry;

const BASE_INSTRUCTIONS: &str = "You are an assistant that works step by step inside a sandboxed workspace.
Reply with exactly one JSON object per message and nothing else.
Steps:
- think: reason about the request (no side effects)
- ask: ask the user a clarifying question and wait for the reply
- decide_tool: state which tool you are going to use and why
- tool_call: invoke a tool with {\"tool\": name, \"args\": ...}; wait for the observe step
- retrieve: search the knowledge base with {\"queries\": [reformulated queries]}; wait for the observe step
- final: give the final answer to the user
Observe steps are written by the system with tool or retrieval output; never produce them yourself.";

/// 构建系统提示词：固定说明 + 步骤 Schema + 可用工具及其参数 Schema
pub fn build_system_prompt(registry: &ToolRegistry) -> String {
    format!(
        "{BASE_INSTRUCTIONS}\n\nStep object JSON schema:\n{}\n\nAvailable tools (args must match \"parameters\"):\n{}",
        step_schema_json(),
        registry.to_schema_json()
    )
}

/// Turn 回放为消息；模型步骤以规范 JSON 形式回放
pub fn render_turn(turn: &Turn) -> Message {
    match (turn.role, turn.kind) {
        (Role::User, StepKind::Input) => Message::user(turn.content()),
        (_, StepKind::Observe) => {
            let mut obj = turn.payload.clone();
            obj.insert("step".into(), Value::String("observe".into()));
            Message::user(Value::Object(obj).to_string())
        }
        (_, kind) => {
            let mut obj = turn.payload.clone();
            obj.insert("step".into(), Value::String(kind.as_str().into()));
            Message::assistant(Value::Object(obj).to_string())
        }
    }
}

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    recovery: RecoveryEngine,
    max_parse_retries: usize,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>, max_parse_retries: usize) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
            recovery: RecoveryEngine::new(),
            max_parse_retries,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn token_usage(&self) -> TokenUsage {
        self.llm.token_usage()
    }

    pub fn messages_for(&self, turns: &[Turn]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(Message::system(self.system_prompt.clone()));
        messages.extend(turns.iter().map(render_turn));
        messages
    }

    /// 请求下一个步骤；解析失败最多重试 max_parse_retries 次
    pub async fn next_step(&self, turns: &[Turn]) -> Result<ModelStep, AgentError> {
        let mut messages = self.messages_for(turns);
        let mut attempt = 0;
        loop {
            let raw = self
                .llm
                .complete(&messages)
                .await
                .map_err(AgentError::LlmError)?;
            let err = match parse_step(&raw) {
                Ok(step) => return Ok(step),
                Err(e) => e,
            };
            tracing::warn!(attempt = attempt + 1, error = %err, "model output rejected");
            if attempt >= self.max_parse_retries {
                return Err(err);
            }
            match self.recovery.handle(&err) {
                RecoveryAction::RetryWithPrompt(prompt) => {
                    messages.push(Message::assistant(raw));
                    messages.push(Message::user(prompt));
                }
                _ => return Err(err),
            }
            attempt += 1;
        }
    }
}
