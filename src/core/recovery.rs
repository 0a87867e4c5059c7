//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，供 Controller 决定是重试、转为 observe 还是终止本轮。

use crate::core::{AgentError, RecoveryAction};

/// 语义化错误恢复：将错误映射为可执行动作（重试提示 / 观察 / 终止）
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::ProtocolParse(raw) => RecoveryAction::RetryWithPrompt(format!(
                "Your previous output was rejected: {raw}. \
                Reply with exactly one JSON object and nothing else. \
                Format: {{\"step\": \"<kind>\", \"content\": \"...\"}}; \
                tool calls add \"tool\" and \"args\"; retrieval adds \"queries\": [...]."
            )),
            e if e.is_observable() => RecoveryAction::Observe(format!("ERROR: {e}")),
            _ => RecoveryAction::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_parse_error_retries() {
        let engine = RecoveryEngine::new();
        let action = engine.handle(&AgentError::ProtocolParse("missing field".into()));
        match action {
            RecoveryAction::RetryWithPrompt(msg) => {
                assert!(msg.contains("missing field"));
                assert!(msg.contains("JSON"));
            }
            other => panic!("Expected RetryWithPrompt, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_tool_errors_become_observations() {
        let engine = RecoveryEngine::new();
        for err in [
            AgentError::ToolNotFound("nope".into()),
            AgentError::ToolRejected("rm -rf /".into()),
            AgentError::ToolExecution("exit 1".into()),
            AgentError::RetrievalEmpty { degraded: false },
        ] {
            assert!(matches!(engine.handle(&err), RecoveryAction::Observe(_)));
        }
    }

    #[test]
    fn test_recovery_checkpoint_conflict_aborts() {
        let engine = RecoveryEngine::new();
        let err = AgentError::CheckpointConflict { expected: 1, actual: 2 };
        assert!(matches!(engine.handle(&err), RecoveryAction::Abort));
    }

    #[test]
    fn test_recovery_interrupt_pending_aborts() {
        let engine = RecoveryEngine::new();
        let err = AgentError::InterruptPending("s1".into());
        assert!(matches!(engine.handle(&err), RecoveryAction::Abort));
    }

    #[test]
    fn test_recovery_llm_error_aborts() {
        let engine = RecoveryEngine::new();
        assert!(matches!(
            engine.handle(&AgentError::LlmError("503".into())),
            RecoveryAction::Abort
        ));
        assert!(matches!(engine.handle(&AgentError::Cancelled), RecoveryAction::Abort));
    }
}
