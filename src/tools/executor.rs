//! 工具执行器
//!
//! 持有 ToolRegistry、沙箱、安全策略与命令超时。invoke(name, args, cwd) 调用工具，
//! 返回结果与新的逻辑目录；每次调用输出结构化审计日志（JSON）。
//! 超时经 ToolContext 交给工具，只套在命令执行上，人工确认可以慢慢答。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use crate::core::AgentError;
use crate::tools::{
    CommandRunner, Confirmer, SafetyPolicy, Sandbox, ShellRunner, StdinConfirmer, ToolContext, ToolOutcome,
    ToolRegistry, ToolResult, ToolSafety, ToolStatus,
};

/// 一次派发的结果；cwd 为调用后的逻辑目录
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub outcome: ToolOutcome,
    pub cwd: PathBuf,
}

pub struct ToolExecutor {
    registry: ToolRegistry,
    sandbox: Sandbox,
    policy: SafetyPolicy,
    confirmer: Arc<dyn Confirmer>,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, sandbox: Sandbox, policy: SafetyPolicy, timeout_secs: u64) -> Self {
        Self {
            registry,
            sandbox,
            policy,
            confirmer: Arc::new(StdinConfirmer),
            runner: Arc::new(ShellRunner),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn with_confirmer(mut self, confirmer: Arc<dyn Confirmer>) -> Self {
        self.confirmer = confirmer;
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// 执行工具。未注册的名称返回 NotFound 结果而非错误；命令超时由工具记为 Error 结果
    pub async fn invoke(&self, tool_name: &str, args: Value, cwd: &Path) -> Dispatch {
        let start = Instant::now();
        let preview = args_preview(&args);
        // 会话恢复出的目录可能已不在沙箱内（例如根目录改过）
        let cwd = if self.sandbox.contains(cwd) {
            cwd.to_path_buf()
        } else {
            self.sandbox.root().to_path_buf()
        };

        let Some(descriptor) = self.registry.get(tool_name) else {
            tracing::warn!(tool = %tool_name, "tool not found");
            audit(tool_name, "not_found", start, &preview);
            return Dispatch {
                outcome: ToolOutcome::Completed(ToolResult::not_found(tool_name)),
                cwd,
            };
        };

        let mut ctx = ToolContext {
            cwd,
            timeout: self.timeout,
            sandbox: &self.sandbox,
            policy: &self.policy,
            confirmer: self.confirmer.as_ref(),
            runner: self.runner.as_ref(),
        };
        let handler = descriptor.handler.clone();
        let outcome = handler.execute(args, &mut ctx).await;
        let cwd = ctx.cwd;
        let timeout_message = AgentError::ToolTimeout(tool_name.to_string()).to_string();

        let (outcome, label) = match outcome {
            ToolOutcome::AwaitingExternalInput { .. } if descriptor.safety != ToolSafety::ExternalInput => {
                let msg = format!("{tool_name} requested external input but is not declared for it");
                (ToolOutcome::Completed(ToolResult::error(msg)), "error")
            }
            ToolOutcome::Completed(result) => {
                let label = match result.status {
                    ToolStatus::Executed => "ok",
                    ToolStatus::Rejected => "rejected",
                    _ if result.stderr.starts_with(&timeout_message) => "timeout",
                    _ => "error",
                };
                (ToolOutcome::Completed(result), label)
            }
            pending => (pending, "awaiting_input"),
        };
        audit(tool_name, label, start, &preview);
        Dispatch { outcome, cwd }
    }

    /// 外部回答到达后，由对应工具生成最终结果
    pub fn complete_external(&self, tool_name: &str, answer: &str) -> ToolResult {
        match self.registry.get(tool_name) {
            Some(d) => d.handler.complete_external(answer),
            None => ToolResult::not_found(tool_name),
        }
    }
}

fn audit(tool: &str, outcome: &str, start: Instant, args_preview: &str) {
    let audit = serde_json::json!({
        "event": "tool_audit",
        "tool": tool,
        "ok": outcome == "ok" || outcome == "awaiting_input",
        "outcome": outcome,
        "duration_ms": start.elapsed().as_millis() as u64,
        "args_preview": args_preview,
    });
    tracing::info!(target: "tool_audit", "{}", audit);
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{FixedConfirmer, HumanAssistanceTool, RunCommandsTool};
    use tempfile::TempDir;

    fn executor(dir: &TempDir, timeout_secs: u64) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(RunCommandsTool);
        registry.register(HumanAssistanceTool);
        let sandbox = Sandbox::new(dir.path().join("work")).unwrap();
        ToolExecutor::new(registry, sandbox, SafetyPolicy::default(), timeout_secs)
            .with_confirmer(Arc::new(FixedConfirmer::deny_all()))
    }

    #[tokio::test]
    async fn test_unknown_tool_not_found() {
        let dir = TempDir::new().unwrap();
        let ex = executor(&dir, 5);
        let root = ex.sandbox().root().to_path_buf();
        let d = ex.invoke("teleport", Value::Null, &root).await;
        match d.outcome {
            ToolOutcome::Completed(r) => {
                assert_eq!(r.status, ToolStatus::NotFound);
                assert!(r.stderr.contains("teleport - This tool is currently not available"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_human_assistance_suspends() {
        let dir = TempDir::new().unwrap();
        let ex = executor(&dir, 5);
        let root = ex.sandbox().root().to_path_buf();
        let d = ex
            .invoke("human_assistance", serde_json::json!({"query": "which?"}), &root)
            .await;
        assert_eq!(
            d.outcome,
            ToolOutcome::AwaitingExternalInput {
                query: "which?".into()
            }
        );
        let r = ex.complete_external("human_assistance", "a.txt");
        assert_eq!(r.stdout, "Human support replied: a.txt");
    }

    #[tokio::test]
    async fn test_cwd_outside_sandbox_resets_to_root() {
        let dir = TempDir::new().unwrap();
        let ex = executor(&dir, 5);
        let d = ex
            .invoke("run_commands", Value::String("pwd".into()), dir.path())
            .await;
        assert_eq!(d.cwd, ex.sandbox().root());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_becomes_error_result() {
        use crate::tools::{CommandOutput, CommandRunner};
        use async_trait::async_trait;

        struct SlowRunner;

        #[async_trait]
        impl CommandRunner for SlowRunner {
            async fn run(&self, _argv: &[String], _cwd: &Path) -> Result<CommandOutput, String> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Err("unreachable".into())
            }
        }

        let dir = TempDir::new().unwrap();
        let mut registry = ToolRegistry::new();
        registry.register(RunCommandsTool);
        let sandbox = Sandbox::new(dir.path().join("work")).unwrap();
        let ex = ToolExecutor::new(registry, sandbox, SafetyPolicy::default(), 0)
            .with_runner(Arc::new(SlowRunner));
        let root = ex.sandbox().root().to_path_buf();
        let d = ex.invoke("run_commands", Value::String("ls".into()), &root).await;
        match d.outcome {
            ToolOutcome::Completed(r) => {
                assert_eq!(r.status, ToolStatus::Error);
                assert!(r.stderr.contains("Tool timeout"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_confirmation_not_counted_against_timeout() {
        use async_trait::async_trait;

        /// 超过命令超时才点头的人
        struct SlowApprover;

        #[async_trait]
        impl Confirmer for SlowApprover {
            async fn confirm(&self, _command: &str, _cwd: &Path) -> bool {
                tokio::time::sleep(Duration::from_millis(1500)).await;
                true
            }
        }

        let dir = TempDir::new().unwrap();
        let ex = executor(&dir, 1).with_confirmer(Arc::new(SlowApprover));
        let root = ex.sandbox().root().to_path_buf();
        let d = ex.invoke("run_commands", Value::String("printf hi".into()), &root).await;
        match d.outcome {
            ToolOutcome::Completed(r) => {
                assert_eq!(r.status, ToolStatus::Executed);
                assert_eq!(r.verdict, crate::tools::SafetyVerdict::NeedsConfirmation);
                assert_eq!(r.commands[0].stdout, "hi");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
