//! Hive - Rust 智能体执行引擎
//!
//! 入口：初始化日志、加载配置并装配 Controller，然后运行终端对话。
//!
//! - `hive chat [session-id]`：开始或继续一个会话（省略 id 时新建）
//! - `hive resume <session-id>`：回答挂起的工具问题并继续该会话

use anyhow::Context;
use hive::{
    agent::create_controller,
    core::AgentError,
    observability,
    session::{Role, StepKind, Turn},
    tools::ConsoleInput,
    Controller, TurnOutcome, TurnResult,
};
use tokio_util::sync::CancellationToken;

const USAGE: &str = "Usage:\n  hive chat [session-id]\n  hive resume <session-id>";

/// 读取一行；EOF 或在提示处按 Ctrl-C 时返回 None
///
/// 注册过 ctrl_c 监听后 SIGINT 不再直接结束进程，所以提示处也要自己接住它。
async fn read_line(prompt: &str) -> Option<String> {
    ConsoleInput::shared()
        .read_line_until(prompt, tokio::signal::ctrl_c())
        .await
}

fn print_turn(turn: &Turn) {
    match (turn.role, turn.kind) {
        (Role::User, StepKind::Input) => println!("> {}", turn.content()),
        (_, StepKind::Observe) => println!("  [observe] {}", turn.content()),
        (_, StepKind::ToolCall) => {
            let tool = turn.field("tool").and_then(|v| v.as_str()).unwrap_or("?");
            let args = turn.field("args").map(|v| v.to_string()).unwrap_or_default();
            println!("  [tool_call] {tool} {args}");
        }
        (_, StepKind::Final) => println!("{}", turn.content()),
        (_, kind) => println!("  [{}] {}", kind.as_str(), turn.content()),
    }
}

/// 运行期间按 Ctrl-C 取消当前一轮
fn cancel_on_ctrl_c() -> (CancellationToken, tokio::task::JoinHandle<()>) {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
    (cancel, watcher)
}

/// 打印本轮新增的 Turn；遇到工具挂起时当场询问回答并 resume
async fn drive(controller: &Controller, mut result: TurnResult) -> anyhow::Result<()> {
    loop {
        result.turns.iter().filter(|t| t.kind != StepKind::Final).for_each(print_turn);
        match &result.outcome {
            TurnOutcome::Answer(answer) => {
                println!("{answer}");
                return Ok(());
            }
            TurnOutcome::Clarification(question) => {
                println!("? {question}");
                return Ok(());
            }
            TurnOutcome::Interrupted { tool, query } => {
                println!("[{tool}] {query}");
                let Some(answer) = read_line("answer> ").await else {
                    println!("Session paused. Continue later with: hive resume {}", result.session_id);
                    return Ok(());
                };
                let (cancel, watcher) = cancel_on_ctrl_c();
                let next = controller
                    .resume_with_cancel(&result.session_id, &answer, result.version, &cancel)
                    .await;
                watcher.abort();
                match next {
                    Ok(r) => result = r,
                    Err(e) => {
                        println!("Error: {e}");
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn chat(controller: &Controller, session_id: String, exit_sentinel: &str) -> anyhow::Result<()> {
    let session = controller.session(&session_id).await?;
    println!("Session {session_id} (type '{exit_sentinel}' to close)");
    session.turns().iter().for_each(print_turn);
    if let Some(pending) = session.pending_interrupt() {
        println!("[{}] {}", pending.tool, pending.query);
        println!("This session is waiting for an answer. Use: hive resume {session_id}");
        return Ok(());
    }

    loop {
        let Some(line) = read_line("you> ").await else {
            println!("Session kept. Continue with: hive chat {session_id}");
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == exit_sentinel {
            controller.close(&session_id).await?;
            println!("Session closed.");
            break;
        }
        let (cancel, watcher) = cancel_on_ctrl_c();
        let result = controller.submit_with_cancel(&session_id, input, &cancel).await;
        watcher.abort();
        match result {
            Ok(r) => drive(controller, r).await?,
            Err(e @ (AgentError::SessionClosed(_) | AgentError::InterruptPending(_))) => {
                println!("Error: {e}");
                break;
            }
            Err(e) => println!("Error: {e}"),
        }
    }
    Ok(())
}

async fn resume(controller: &Controller, session_id: &str) -> anyhow::Result<()> {
    let checkpoint = controller.inspect(session_id).await?;
    checkpoint.session.turns().iter().for_each(print_turn);
    let Some(pending) = checkpoint.pending.clone() else {
        println!("Session {session_id} has no pending question.");
        return Ok(());
    };
    println!("[{}] {}", pending.tool, pending.query);
    let Some(answer) = read_line("answer> ").await else {
        return Ok(());
    };
    let (cancel, watcher) = cancel_on_ctrl_c();
    let result = controller
        .resume_with_cancel(session_id, &answer, checkpoint.version, &cancel)
        .await;
    watcher.abort();
    drive(controller, result?).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (cfg, controller) = create_controller(None)
        .await
        .context("Failed to create engine")?;

    match args.first().map(String::as_str) {
        Some("chat") | None => {
            let session_id = args
                .get(1)
                .cloned()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            chat(&controller, session_id, &cfg.app.exit_sentinel).await
        }
        Some("resume") => {
            let session_id = args.get(1).context(USAGE)?;
            resume(&controller, session_id).await
        }
        Some(_) => {
            eprintln!("{USAGE}");
            Ok(())
        }
    }
}
