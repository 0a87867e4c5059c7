//! 步骤协议控制器（主循环）
//!
//! submit 追加用户输入后驱动 Generating -> {Thinking | AwaitingClarification | InvokingTool |
//! Retrieving | Terminal} 状态机，直到最终回答、澄清问题或工具挂起。
//! 每个 Turn 先追加并写入检查点，再执行副作用（append-then-act）。

use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{Checkpoint, CheckpointController};
use crate::core::{AgentError, LoopState, RecoveryAction, RecoveryEngine, SessionStatus};
use crate::react::{ModelStep, Planner};
use crate::retrieval::{FusedResult, RetrievalEngine};
use crate::session::{payload, InvocationStatus, Payload, Role, Session, StepKind, ToolInvocation, Turn};
use crate::tools::{SafetyVerdict, ToolExecutor, ToolOutcome, ToolResult};

/// 一轮结束的方式
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// 模型给出最终回答
    Answer(String),
    /// 模型请求澄清，等待下一次 submit
    Clarification(String),
    /// 工具等待外部输入，等待 resume
    Interrupted { tool: String, query: String },
}

#[derive(Debug, Clone)]
pub struct TurnResult {
    pub session_id: String,
    pub outcome: TurnOutcome,
    /// 本次调用新追加的 Turn
    pub turns: Vec<Turn>,
    /// 写入后的检查点版本（resume 时作为 expected_version）
    pub version: u64,
}

pub struct Controller {
    planner: Planner,
    executor: Arc<ToolExecutor>,
    retrieval: Option<Arc<RetrievalEngine>>,
    checkpoints: CheckpointController,
    recovery: RecoveryEngine,
    max_steps: usize,
}

fn advance(state: &mut LoopState, next: LoopState) {
    if !state.can_transition_to(next) {
        tracing::error!(from = ?state, to = ?next, "unexpected loop transition");
    }
    tracing::debug!(from = ?state, to = ?next, "loop transition");
    *state = next;
}

impl Controller {
    pub fn new(
        planner: Planner,
        executor: Arc<ToolExecutor>,
        retrieval: Option<Arc<RetrievalEngine>>,
        checkpoints: CheckpointController,
        max_steps: usize,
    ) -> Self {
        Self {
            planner,
            executor,
            retrieval,
            checkpoints,
            recovery: RecoveryEngine::new(),
            max_steps,
        }
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    pub async fn inspect(&self, session_id: &str) -> Result<Checkpoint, AgentError> {
        self.checkpoints.inspect(session_id).await
    }

    /// 读取会话（不存在时为空会话，不写入）
    pub async fn session(&self, session_id: &str) -> Result<Session, AgentError> {
        self.checkpoints
            .load_or_create(session_id, self.executor.sandbox().root())
            .await
    }

    pub async fn submit(&self, session_id: &str, input: &str) -> Result<TurnResult, AgentError> {
        self.submit_with_cancel(session_id, input, &CancellationToken::new())
            .await
    }

    pub async fn submit_with_cancel(
        &self,
        session_id: &str,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnResult, AgentError> {
        let mut session = self.session(session_id).await?;
        match session.status() {
            SessionStatus::Terminal => return Err(AgentError::SessionClosed(session_id.to_string())),
            SessionStatus::PausedOnTool => return Err(AgentError::InterruptPending(session_id.to_string())),
            _ => {}
        }
        if session.pending_interrupt().is_some() {
            return Err(AgentError::InterruptPending(session_id.to_string()));
        }
        self.reconcile_dangling(&mut session);

        let start = session.turns().len();
        session.append(Role::User, StepKind::Input, payload([("content", json!(input))]));
        session.set_status(SessionStatus::Active);
        self.checkpoints.commit(&mut session).await?;
        tracing::info!(session = %session_id, "turn started");

        let mut state = LoopState::AwaitingUserInput;
        advance(&mut state, LoopState::Generating);
        self.run_loop(&mut session, start, state, cancel).await
    }

    /// 提供外部回答，继续被挂起的一轮；expected_version 必须等于当前检查点版本
    pub async fn resume(
        &self,
        session_id: &str,
        answer: &str,
        expected_version: u64,
    ) -> Result<TurnResult, AgentError> {
        self.resume_with_cancel(session_id, answer, expected_version, &CancellationToken::new())
            .await
    }

    pub async fn resume_with_cancel(
        &self,
        session_id: &str,
        answer: &str,
        expected_version: u64,
        cancel: &CancellationToken,
    ) -> Result<TurnResult, AgentError> {
        let mut session = self.checkpoints.load(session_id).await?;
        if session.version() != expected_version {
            return Err(AgentError::CheckpointConflict {
                expected: expected_version,
                actual: session.version(),
            });
        }
        let pending = session
            .pending_interrupt()
            .ok_or_else(|| AgentError::NoPendingInterrupt(session_id.to_string()))?;
        tracing::info!(session = %session_id, tool = %pending.tool, "resuming interrupted tool");

        let start = session.turns().len();
        let mut state = LoopState::Suspended;
        let result = self.executor.complete_external(&pending.tool, answer);
        session.set_status(SessionStatus::Active);
        self.record_observation(&mut session, &pending.tool, result);
        advance(&mut state, LoopState::AwaitingObservation);
        self.checkpoints.commit(&mut session).await?;

        advance(&mut state, LoopState::Generating);
        self.run_loop(&mut session, start, state, cancel).await
    }

    /// 用户退出：会话置为 Terminal，未完成的工具调用标记为放弃
    pub async fn close(&self, session_id: &str) -> Result<u64, AgentError> {
        let mut session = self.checkpoints.load(session_id).await?;
        if session.status() == SessionStatus::Terminal {
            return Ok(session.version());
        }
        if session.outstanding().is_some_and(|inv| !inv.is_resolved()) {
            Self::abandon(&mut session, "session closed by user");
        }
        session.set_status(SessionStatus::Terminal);
        self.checkpoints.commit(&mut session).await
    }

    /// 派发已追加但进程在得到结果前退出：补一条 abandoned 观察，不重跑副作用
    fn reconcile_dangling(&self, session: &mut Session) {
        let Some(turn) = session.dangling_dispatch() else {
            return;
        };
        tracing::warn!(session = %session.id, turn = turn.id, kind = turn.kind.as_str(), "abandoning dangling dispatch");
        Self::abandon(session, "process stopped before the result was recorded");
    }

    fn abandon(session: &mut Session, reason: &str) {
        let mut p = payload([
            ("content", json!(format!("ABANDONED: {reason}"))),
            ("status", json!("abandoned")),
        ]);
        if let Some(mut inv) = session.take_outstanding() {
            if !inv.is_resolved() {
                inv.status = InvocationStatus::Abandoned;
            }
            p.insert("tool".into(), json!(inv.tool));
            p.insert("invocation_id".into(), json!(inv.id));
            p.insert("invocation".into(), json!(inv));
        }
        session.append(Role::Tool, StepKind::Observe, p);
    }

    /// 出错时把会话交还给用户并尽力落盘，返回原错误
    async fn fail(&self, session: &mut Session, err: AgentError) -> AgentError {
        session.set_status(SessionStatus::AwaitingInput);
        if let Err(e) = self.checkpoints.commit(session).await {
            tracing::error!(session = %session.id, error = %e, "checkpoint after failure failed");
        }
        tracing::warn!(session = %session.id, error = %err, "turn failed");
        err
    }

    fn finish(session: &Session, start: usize, outcome: TurnOutcome) -> TurnResult {
        TurnResult {
            session_id: session.id.clone(),
            outcome,
            turns: session.turns()[start..].to_vec(),
            version: session.version(),
        }
    }

    async fn run_loop(
        &self,
        session: &mut Session,
        start: usize,
        mut state: LoopState,
        cancel: &CancellationToken,
    ) -> Result<TurnResult, AgentError> {
        let mut steps = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(self.fail(session, AgentError::Cancelled).await);
            }
            if steps >= self.max_steps {
                return Err(self.fail(session, AgentError::StepLimitExceeded(self.max_steps)).await);
            }
            steps += 1;

            let next = tokio::select! {
                _ = cancel.cancelled() => Err(AgentError::Cancelled),
                r = self.planner.next_step(session.turns()) => r,
            };
            let step = match next {
                Ok(step) => step,
                Err(e) => {
                    advance(&mut state, LoopState::AwaitingUserInput);
                    return Err(self.fail(session, e).await);
                }
            };
            tracing::info!(session = %session.id, step = step.kind().as_str(), "model step");
            let turn = session.append(Role::Model, step.kind(), step.to_payload());

            match step {
                ModelStep::Think { .. } | ModelStep::DecideTool { .. } => {
                    advance(&mut state, LoopState::Thinking);
                    self.checkpoints.commit(session).await?;
                    advance(&mut state, LoopState::Generating);
                }
                ModelStep::Ask { content } => {
                    advance(&mut state, LoopState::AwaitingClarification);
                    session.set_status(SessionStatus::AwaitingInput);
                    self.checkpoints.commit(session).await?;
                    advance(&mut state, LoopState::AwaitingUserInput);
                    return Ok(Self::finish(session, start, TurnOutcome::Clarification(content)));
                }
                ModelStep::Final { content } => {
                    advance(&mut state, LoopState::Terminal);
                    session.set_status(SessionStatus::AwaitingInput);
                    self.checkpoints.commit(session).await?;
                    advance(&mut state, LoopState::AwaitingUserInput);
                    tracing::info!(session = %session.id, steps, "turn finished");
                    return Ok(Self::finish(session, start, TurnOutcome::Answer(content)));
                }
                ModelStep::ToolCall { tool, args, .. } => {
                    advance(&mut state, LoopState::InvokingTool);
                    let verdict = self
                        .executor
                        .registry()
                        .get(&tool)
                        .map(|d| d.safety.initial_verdict())
                        .unwrap_or(SafetyVerdict::Rejected);
                    session.begin_invocation(ToolInvocation::new(&tool, args.clone(), verdict, turn.id))?;
                    self.checkpoints.commit(session).await?;

                    let dispatch = self.executor.invoke(&tool, args, session.cwd()).await;
                    session.set_cwd(dispatch.cwd);
                    match dispatch.outcome {
                        ToolOutcome::AwaitingExternalInput { query } => {
                            advance(&mut state, LoopState::Suspended);
                            session.suspend_invocation(query.clone());
                            self.checkpoints.commit(session).await?;
                            tracing::info!(session = %session.id, tool = %tool, "turn interrupted for external input");
                            return Ok(Self::finish(session, start, TurnOutcome::Interrupted { tool, query }));
                        }
                        ToolOutcome::Completed(result) => {
                            advance(&mut state, LoopState::AwaitingObservation);
                            self.record_observation(session, &tool, result);
                            self.checkpoints.commit(session).await?;
                            advance(&mut state, LoopState::Generating);
                        }
                    }
                }
                ModelStep::Retrieve { queries, .. } => {
                    advance(&mut state, LoopState::Retrieving);
                    self.checkpoints.commit(session).await?;

                    let original = session.last_user_input().unwrap_or_default().to_string();
                    let observed = match &self.retrieval {
                        Some(engine) => engine.retrieve(&original, &queries).await,
                        None => Err(AgentError::ToolNotFound("retrieve (no index configured)".into())),
                    };
                    let p = match observed {
                        Ok(fused) => retrieval_payload(&fused),
                        Err(e) => match self.recovery.handle(&e) {
                            RecoveryAction::Observe(msg) => error_payload(msg, &e),
                            _ => return Err(self.fail(session, e).await),
                        },
                    };
                    advance(&mut state, LoopState::AwaitingObservation);
                    session.append(Role::Tool, StepKind::Observe, p);
                    self.checkpoints.commit(session).await?;
                    advance(&mut state, LoopState::Generating);
                }
            }
        }
    }

    /// 结束当前工具调用并追加 observe Turn
    fn record_observation(&self, session: &mut Session, tool: &str, result: ToolResult) {
        let mut invocation_id = Value::Null;
        if let Some(mut inv) = session.take_outstanding() {
            inv.complete(result.clone());
            invocation_id = json!(inv.id);
        }
        let content = match result.to_error(tool) {
            None => result.stdout.clone(),
            Some(err) => match self.recovery.handle(&err) {
                RecoveryAction::Observe(msg) if result.stdout.is_empty() => msg,
                RecoveryAction::Observe(msg) => format!("{msg}\n\n{}", result.stdout),
                _ => format!("ERROR: {err}"),
            },
        };
        let mut p = payload([
            ("content", json!(content)),
            ("tool", json!(tool)),
            ("invocation_id", invocation_id),
            ("status", json!(result.status)),
            ("verdict", json!(result.verdict)),
            ("stdout", json!(result.stdout)),
            ("stderr", json!(result.stderr)),
            ("exit_code", json!(result.exit_code)),
        ]);
        if !result.commands.is_empty() {
            p.insert("commands".into(), json!(result.commands));
        }
        session.append(Role::Tool, StepKind::Observe, p);
    }
}

fn retrieval_payload(fused: &FusedResult) -> Payload {
    let mut text = fused
        .chunks
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[{}] ({}) {}", i + 1, c.locator, c.content))
        .collect::<Vec<_>>()
        .join("\n");
    if let Some(warning) = fused.partial_failure() {
        text.push_str(&format!("\nWARNING: {warning}; results are degraded"));
    }
    payload([
        ("content", json!(text)),
        ("chunks", json!(fused.chunks)),
        ("degraded", json!(fused.degraded)),
        ("failed_queries", json!(fused.failed_queries)),
    ])
}

fn error_payload(msg: String, err: &AgentError) -> Payload {
    let degraded = matches!(err, AgentError::RetrievalEmpty { degraded: true });
    payload([
        ("content", json!(msg)),
        ("error", json!(true)),
        ("degraded", json!(degraded)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::llm::ScriptedLlmClient;
    use crate::retrieval::{KeywordIndex, Document, RetrievalSettings};
    use crate::tools::{
        CommandOutput, CommandRunner, FixedConfirmer, HumanAssistanceTool, RunCommandsTool, Sandbox, SafetyPolicy,
        ToolRegistry,
    };
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        llm: Arc<ScriptedLlmClient>,
        controller: Controller,
    }

    fn harness(script: &[&str], max_steps: usize) -> Harness {
        let dir = TempDir::new().unwrap();
        let mut registry = ToolRegistry::new();
        registry.register(RunCommandsTool);
        registry.register(HumanAssistanceTool);
        let sandbox = Sandbox::new(dir.path().join("work")).unwrap();
        let executor = ToolExecutor::new(registry, sandbox, SafetyPolicy::default(), 5)
            .with_confirmer(Arc::new(FixedConfirmer::deny_all()));
        let mut index = KeywordIndex::new();
        index.add(Document::new("hold the reset button for ten seconds", "router.pdf", Some(4)));
        let retrieval = RetrievalEngine::new(Arc::new(index), RetrievalSettings::default());
        let llm = Arc::new(ScriptedLlmClient::new(script.iter().copied()));
        let controller = Controller::new(
            Planner::new(llm.clone(), "sys", 2),
            Arc::new(executor),
            Some(Arc::new(retrieval)),
            CheckpointController::new(Arc::new(MemoryCheckpointStore::new())),
            max_steps,
        );
        Harness {
            _dir: dir,
            llm,
            controller,
        }
    }

    fn kinds(turns: &[Turn]) -> Vec<StepKind> {
        turns.iter().map(|t| t.kind).collect()
    }

    #[tokio::test]
    async fn test_think_then_final() {
        let h = harness(
            &[
                r#"{"step": "think", "content": "easy"}"#,
                r#"{"step": "final", "content": "42"}"#,
            ],
            10,
        );
        let r = h.controller.submit("s1", "answer?").await.unwrap();
        assert_eq!(r.outcome, TurnOutcome::Answer("42".into()));
        assert_eq!(kinds(&r.turns), vec![StepKind::Input, StepKind::Think, StepKind::Final]);
        let s = h.controller.session("s1").await.unwrap();
        assert_eq!(s.status(), SessionStatus::AwaitingInput);
        assert_eq!(s.version(), r.version);
    }

    #[tokio::test]
    async fn test_ask_pauses_for_user() {
        let h = harness(&[r#"{"step": "ask", "message": "Which language?"}"#], 10);
        let r = h.controller.submit("s1", "write a calculator").await.unwrap();
        assert_eq!(r.outcome, TurnOutcome::Clarification("Which language?".into()));
        assert_eq!(h.llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_observation() {
        let h = harness(
            &[
                r#"{"step": "tool_call", "tool": "teleport", "args": {}}"#,
                r#"{"step": "final", "content": "cannot"}"#,
            ],
            10,
        );
        let r = h.controller.submit("s1", "go").await.unwrap();
        assert_eq!(
            kinds(&r.turns),
            vec![StepKind::Input, StepKind::ToolCall, StepKind::Observe, StepKind::Final]
        );
        let observe = &r.turns[2];
        assert!(observe.content().starts_with("ERROR: Tool not found"));
        assert_eq!(observe.field("status"), Some(&json!("not_found")));
    }

    #[tokio::test]
    async fn test_rejected_command_observed_and_loop_continues() {
        let h = harness(
            &[
                r#"{"step": "tool_call", "tool": "run_commands", "args": "rm -rf /"}"#,
                r#"{"step": "final", "content": "refused"}"#,
            ],
            10,
        );
        let r = h.controller.submit("s1", "wipe").await.unwrap();
        let observe = &r.turns[2];
        assert_eq!(observe.field("status"), Some(&json!("rejected")));
        assert_eq!(observe.field("verdict"), Some(&json!("rejected")));
        assert!(observe.content().contains("ERROR: Tool rejected"));
    }

    #[tokio::test]
    async fn test_retrieval_observation() {
        let h = harness(
            &[
                r#"{"step": "retrieve", "queries": ["reset button"]}"#,
                r#"{"step": "final", "content": "hold it"}"#,
            ],
            10,
        );
        let r = h.controller.submit("s1", "how to reset router").await.unwrap();
        let observe = &r.turns[2];
        assert_eq!(observe.kind, StepKind::Observe);
        assert!(observe.content().contains("(router.pdf#4)"));
        assert_eq!(observe.field("degraded"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn test_parse_failure_terminates_turn() {
        let h = harness(&["bad", "worse", "worst"], 10);
        let err = h.controller.submit("s1", "hi").await.unwrap_err();
        assert!(matches!(err, AgentError::ProtocolParse(_)));
        assert_eq!(h.llm.calls(), 3);
        let s = h.controller.session("s1").await.unwrap();
        assert_eq!(s.status(), SessionStatus::AwaitingInput);
        assert_eq!(kinds(s.turns()), vec![StepKind::Input]);
    }

    #[tokio::test]
    async fn test_step_limit() {
        let h = harness(
            &[
                r#"{"step": "think", "content": "a"}"#,
                r#"{"step": "think", "content": "b"}"#,
                r#"{"step": "think", "content": "c"}"#,
            ],
            2,
        );
        let err = h.controller.submit("s1", "loop").await.unwrap_err();
        assert!(matches!(err, AgentError::StepLimitExceeded(2)));
        assert_eq!(h.llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_interrupt_blocks_submit_and_resume_continues() {
        let h = harness(
            &[
                r#"{"step": "tool_call", "tool": "human_assistance", "args": {"query": "approve refund?"}}"#,
                r#"{"step": "final", "content": "refund approved"}"#,
            ],
            10,
        );
        let r = h.controller.submit("s1", "refund me").await.unwrap();
        assert_eq!(
            r.outcome,
            TurnOutcome::Interrupted {
                tool: "human_assistance".into(),
                query: "approve refund?".into()
            }
        );
        let cp = h.controller.inspect("s1").await.unwrap();
        assert_eq!(cp.pending.as_ref().map(|p| p.query.as_str()), Some("approve refund?"));
        assert!(matches!(
            h.controller.submit("s1", "hello?").await,
            Err(AgentError::InterruptPending(_))
        ));

        let resumed = h.controller.resume("s1", "yes", r.version).await.unwrap();
        assert_eq!(resumed.outcome, TurnOutcome::Answer("refund approved".into()));
        assert_eq!(resumed.turns[0].content(), "Human support replied: yes");
        assert!(matches!(
            h.controller.resume("s1", "yes", r.version).await,
            Err(AgentError::CheckpointConflict { .. })
        ));
        let v = h.controller.inspect("s1").await.unwrap().version;
        assert!(matches!(
            h.controller.resume("s1", "yes", v).await,
            Err(AgentError::NoPendingInterrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_close_rejects_further_input() {
        let h = harness(&[r#"{"step": "final", "content": "bye"}"#], 10);
        h.controller.submit("s1", "hi").await.unwrap();
        h.controller.close("s1").await.unwrap();
        assert!(matches!(
            h.controller.submit("s1", "again").await,
            Err(AgentError::SessionClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_model_call() {
        let h = harness(&[r#"{"step": "final", "content": "x"}"#], 10);
        let token = CancellationToken::new();
        token.cancel();
        let err = h.controller.submit_with_cancel("s1", "hi", &token).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(h.llm.calls(), 0);
    }

    /// 只计数、不真正执行的命令面
    #[derive(Default)]
    struct CountingRunner(AtomicUsize);

    #[async_trait::async_trait]
    impl CommandRunner for CountingRunner {
        async fn run(&self, _argv: &[String], _cwd: &Path) -> Result<CommandOutput, String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(CommandOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 0,
            })
        }
    }

    #[tokio::test]
    async fn test_dangling_tool_call_abandoned_not_rerun() {
        let dir = TempDir::new().unwrap();
        let mut registry = ToolRegistry::new();
        registry.register(RunCommandsTool);
        let sandbox = Sandbox::new(dir.path().join("work")).unwrap();
        let runner = Arc::new(CountingRunner::default());
        let executor = ToolExecutor::new(registry, sandbox, SafetyPolicy::default(), 5)
            .with_confirmer(Arc::new(FixedConfirmer::deny_all()))
            .with_runner(runner.clone());
        let checkpoints = CheckpointController::new(Arc::new(MemoryCheckpointStore::new()));

        // 上一个进程追加并提交了 tool_call，随后在派发前退出
        let mut crashed = Session::new("s1", executor.sandbox().root());
        crashed.append(Role::User, StepKind::Input, payload([("content", json!("make notes"))]));
        let args = json!("touch notes.txt");
        let call = crashed.append(
            Role::Model,
            StepKind::ToolCall,
            payload([("tool", json!("run_commands")), ("args", args.clone())]),
        );
        crashed
            .begin_invocation(ToolInvocation::new("run_commands", args, SafetyVerdict::Allowed, call.id))
            .unwrap();
        crashed.set_status(SessionStatus::Active);
        checkpoints.commit(&mut crashed).await.unwrap();

        let llm = Arc::new(ScriptedLlmClient::new([r#"{"step": "final", "content": "start over"}"#]));
        let controller = Controller::new(
            Planner::new(llm.clone(), "sys", 2),
            Arc::new(executor),
            None,
            checkpoints,
            10,
        );
        let r = controller.submit("s1", "continue").await.unwrap();
        assert_eq!(r.outcome, TurnOutcome::Answer("start over".into()));
        assert_eq!(kinds(&r.turns), vec![StepKind::Input, StepKind::Final]);

        let s = controller.session("s1").await.unwrap();
        assert_eq!(
            kinds(s.turns()),
            vec![
                StepKind::Input,
                StepKind::ToolCall,
                StepKind::Observe,
                StepKind::Input,
                StepKind::Final
            ]
        );
        let observe = &s.turns()[2];
        assert!(observe.content().starts_with("ABANDONED"));
        assert_eq!(observe.field("status"), Some(&json!("abandoned")));
        assert_eq!(observe.field("invocation").map(|v| &v["status"]), Some(&json!("abandoned")));
        assert!(s.outstanding().is_none());
        assert_eq!(runner.0.load(Ordering::SeqCst), 0);
        assert_eq!(llm.calls(), 1);
    }
}
