//! 组合命令工具：`cmd1 && cmd2 && ...`
//!
//! 逐条执行：cd 由沙箱处理并更新逻辑目录；其余命令先经 SafetyPolicy 分类，
//! 危险命令拒绝，路径参数越出沙箱的拒绝，未知命令需要人工确认。
//! 超时只套在命令执行上。首条失败或被拒即停止，返回已执行部分的日志。

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::{
    shell_argv, CommandRecord, SafetyVerdict, Tool, ToolContext, ToolOutcome, ToolResult, ToolSafety,
    ToolStatus,
};

const TOOL_NAME: &str = "run_commands";

pub struct RunCommandsTool;

impl RunCommandsTool {
    /// args 可以是字符串，也可以是 {"command": "..."} / {"commands": "..."}
    fn command_string(args: &Value) -> String {
        match args {
            Value::String(s) => s.clone(),
            Value::Object(map) => map
                .get("command")
                .or_else(|| map.get("commands"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            _ => String::new(),
        }
    }

    async fn run_one(command: &str, ctx: &mut ToolContext<'_>) -> CommandRecord {
        if command == "cd" || command.starts_with("cd ") {
            let target = command.strip_prefix("cd").unwrap_or("").trim();
            return match ctx.sandbox.change_dir(&ctx.cwd, target) {
                Ok(dir) => {
                    ctx.cwd = dir;
                    record(command, &ctx.cwd, ToolStatus::Executed, SafetyVerdict::Allowed, "", "", Some(0))
                }
                Err(AgentError::ToolRejected(msg)) => {
                    tracing::warn!(command = %command, "cd outside sandbox");
                    record(command, &ctx.cwd, ToolStatus::Rejected, SafetyVerdict::Rejected, "", &msg, None)
                }
                Err(e) => record(command, &ctx.cwd, ToolStatus::Error, SafetyVerdict::Allowed, "", &e.to_string(), None),
            };
        }

        let classification = ctx.policy.classify(command);
        let verdict = classification.verdict;
        if verdict == SafetyVerdict::Rejected {
            let reason = format!(
                "Forbidden pattern: {}",
                classification.matched.unwrap_or_default()
            );
            tracing::warn!(command = %command, reason = %reason, "command rejected");
            return record(command, &ctx.cwd, ToolStatus::Rejected, verdict, "", &reason, None);
        }

        if let Err(e) = ctx.sandbox.check_command_paths(&ctx.cwd, command) {
            let reason = match e {
                AgentError::ToolRejected(msg) => msg,
                other => other.to_string(),
            };
            tracing::warn!(command = %command, reason = %reason, "path argument outside sandbox");
            return record(command, &ctx.cwd, ToolStatus::Rejected, SafetyVerdict::Rejected, "", &reason, None);
        }

        if verdict == SafetyVerdict::NeedsConfirmation && !ctx.confirmer.confirm(command, &ctx.cwd).await {
            return record(
                command,
                &ctx.cwd,
                ToolStatus::Rejected,
                verdict,
                "",
                "This command was rejected by the user",
                None,
            );
        }

        tracing::info!(command = %command, cwd = %ctx.cwd.display(), "run command");
        match timeout(ctx.timeout, ctx.runner.run(&shell_argv(command), &ctx.cwd)).await {
            Ok(Ok(out)) if out.exit_code == 0 => record(
                command,
                &ctx.cwd,
                ToolStatus::Executed,
                verdict,
                &out.stdout,
                &out.stderr,
                Some(0),
            ),
            Ok(Ok(out)) => record(
                command,
                &ctx.cwd,
                ToolStatus::Error,
                verdict,
                &out.stdout,
                &out.stderr,
                Some(out.exit_code),
            ),
            Ok(Err(e)) => record(command, &ctx.cwd, ToolStatus::Error, verdict, "", &e, None),
            Err(_) => {
                let err = AgentError::ToolTimeout(TOOL_NAME.to_string());
                tracing::warn!(command = %command, timeout_secs = ctx.timeout.as_secs(), "command timed out");
                record(command, &ctx.cwd, ToolStatus::Error, verdict, "", &err.to_string(), None)
            }
        }
    }
}

fn record(
    command: &str,
    cwd: &Path,
    status: ToolStatus,
    verdict: SafetyVerdict,
    stdout: &str,
    stderr: &str,
    exit_code: Option<i32>,
) -> CommandRecord {
    CommandRecord {
        command: command.to_string(),
        cwd: cwd.to_path_buf(),
        status,
        verdict,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        exit_code,
    }
}

/// 目录内容（隐藏文件也列出），供日志中的 Contents 行
async fn list_dir(dir: &Path) -> String {
    let mut names = Vec::new();
    if let Ok(mut entries) = tokio::fs::read_dir(dir).await {
        while let Ok(Some(e)) = entries.next_entry().await {
            let mut name = e.file_name().to_string_lossy().to_string();
            if e.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                name.push('/');
            }
            names.push(name);
        }
    }
    names.sort();
    names.join(" ")
}

fn aggregate_verdict(records: &[CommandRecord]) -> SafetyVerdict {
    if records.iter().any(|r| r.verdict == SafetyVerdict::Rejected) {
        SafetyVerdict::Rejected
    } else if records.iter().any(|r| r.verdict == SafetyVerdict::NeedsConfirmation) {
        SafetyVerdict::NeedsConfirmation
    } else {
        SafetyVerdict::Allowed
    }
}

#[async_trait]
impl Tool for RunCommandsTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Run one or more shell commands inside the sandbox, separated by &&. \
         Args: \"cmd1 && cmd2\" or {\"command\": \"...\"}. cd is tracked across calls."
    }

    fn safety(&self) -> ToolSafety {
        ToolSafety::Guarded
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Commands separated by &&"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value, ctx: &mut ToolContext<'_>) -> ToolOutcome {
        let raw = Self::command_string(&args);
        let commands: Vec<&str> = raw
            .split("&&")
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();
        if commands.is_empty() {
            return ToolOutcome::Completed(ToolResult::error("Empty command"));
        }

        let total = commands.len();
        let mut records = Vec::with_capacity(total);
        let mut log = Vec::with_capacity(total);
        for cmd in commands {
            let rec = Self::run_one(cmd, ctx).await;
            match rec.status {
                ToolStatus::Executed => {
                    let contents = list_dir(&ctx.cwd).await;
                    log.push(format!(
                        "Cmd: {}\nDir: {}\nOutput: {}\nContents: {}",
                        rec.command,
                        rec.cwd.display(),
                        rec.stdout,
                        contents
                    ));
                }
                ToolStatus::Rejected => log.push(format!(
                    "Cmd: {} -- REJECTED: {}\nDir: {}",
                    rec.command,
                    rec.stderr,
                    rec.cwd.display()
                )),
                _ => log.push(format!("Cmd: {} -> {}", rec.command, rec.stderr)),
            }
            let halted = rec.status != ToolStatus::Executed;
            records.push(rec);
            if halted {
                break;
            }
        }

        let ran = records.len();
        if ran < total || records.last().is_some_and(|r| r.status != ToolStatus::Executed) {
            log.push(format!(
                "Halted at command {}/{}; {} not run",
                ran,
                total,
                total - ran
            ));
        }

        let last = records.last();
        let status = last.map(|r| r.status).unwrap_or(ToolStatus::Error);
        let result = ToolResult {
            status,
            stdout: log.join("\n\n"),
            stderr: last
                .filter(|r| r.status != ToolStatus::Executed)
                .map(|r| r.stderr.clone())
                .unwrap_or_default(),
            exit_code: last.and_then(|r| r.exit_code),
            verdict: aggregate_verdict(&records),
            commands: records,
        };
        ToolOutcome::Completed(result)
    }
}
