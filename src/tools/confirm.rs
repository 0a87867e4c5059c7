//! 未知命令的人工确认，以及终端输入的统一读取

use std::future::Future;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

#[async_trait]
pub trait Confirmer: Send + Sync {
    /// 返回 true 表示允许执行
    async fn confirm(&self, command: &str, cwd: &Path) -> bool;
}

/// 进程内唯一的 stdin 读取线程，按行送入通道
///
/// 读者的 future 被丢弃（取消、超时）时，下一行仍留在通道里交给下一个读者。
#[derive(Clone)]
pub struct ConsoleInput {
    lines: Arc<Mutex<mpsc::Receiver<String>>>,
}

impl ConsoleInput {
    pub fn shared() -> Self {
        static INPUT: OnceLock<ConsoleInput> = OnceLock::new();
        INPUT.get_or_init(Self::spawn).clone()
    }

    fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(16);
        // 普通线程而非 spawn_blocking：阻塞在 read_line 上也不拖住运行时退出
        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });
        Self::from_channel(rx)
    }

    fn from_channel(rx: mpsc::Receiver<String>) -> Self {
        Self {
            lines: Arc::new(Mutex::new(rx)),
        }
    }

    /// 打印提示并等待一行；EOF 时返回 None
    pub async fn read_line(&self, prompt: &str) -> Option<String> {
        print!("{prompt}");
        let _ = std::io::stdout().flush();
        let line = self.lines.lock().await.recv().await?;
        Some(line.trim_end_matches('\r').to_string())
    }

    /// 同 read_line，但 interrupt 先完成时返回 None（CLI 传入 Ctrl-C 信号）
    pub async fn read_line_until<F: Future>(&self, prompt: &str, interrupt: F) -> Option<String> {
        tokio::select! {
            line = self.read_line(prompt) => line,
            _ = interrupt => {
                println!();
                None
            }
        }
    }
}

/// 终端确认：只有 "yes" / "y" 视为同意
#[derive(Debug, Default, Clone)]
pub struct StdinConfirmer;

#[async_trait]
impl Confirmer for StdinConfirmer {
    async fn confirm(&self, command: &str, cwd: &Path) -> bool {
        let prompt = format!(
            "Command requires approval: '{}' (in {})\nProceed? (yes/no): ",
            command,
            cwd.display()
        );
        match ConsoleInput::shared().read_line(&prompt).await {
            Some(line) => matches!(line.trim().to_lowercase().as_str(), "yes" | "y"),
            None => false,
        }
    }
}

/// 固定答复（非交互环境与测试）
#[derive(Debug, Clone, Copy)]
pub struct FixedConfirmer {
    approve: bool,
}

impl FixedConfirmer {
    pub fn approve_all() -> Self {
        Self { approve: true }
    }

    pub fn deny_all() -> Self {
        Self { approve: false }
    }
}

#[async_trait]
impl Confirmer for FixedConfirmer {
    async fn confirm(&self, command: &str, _cwd: &Path) -> bool {
        tracing::info!(command = %command, approve = self.approve, "fixed confirmation");
        self.approve
    }
}
