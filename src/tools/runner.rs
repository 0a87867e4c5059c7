//! 操作系统命令执行面
//!
//! CommandRunner::run(argv, cwd) 以当前进程权限执行，不做任何提权；
//! ShellRunner 通过 sh -c / cmd /C 执行，子进程随 future 丢弃而被终止。

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, argv: &[String], cwd: &Path) -> Result<CommandOutput, String>;
}

/// 将一条 shell 命令包装为 argv
pub fn shell_argv(command: &str) -> Vec<String> {
    if cfg!(target_os = "windows") {
        vec!["cmd".into(), "/C".into(), command.into()]
    } else {
        vec!["sh".into(), "-c".into(), command.into()]
    }
}

#[derive(Debug, Default, Clone)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, argv: &[String], cwd: &Path) -> Result<CommandOutput, String> {
        let (program, args) = argv.split_first().ok_or_else(|| "Empty argv".to_string())?;
        tracing::debug!(program = %program, cwd = %cwd.display(), "spawn command");

        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("Execution failed: {}", e))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            // 被信号终止时没有退出码
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}
