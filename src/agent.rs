//! 引擎装配
//!
//! 从 AppConfig 构建 LLM、工具执行器（沙箱 + 安全策略 + 确认）、检索引擎、检查点存储，
//! 最终组装为 Controller。CLI 与集成测试共用这里的构建函数。

use std::sync::Arc;

use crate::checkpoint::{CheckpointController, CheckpointStore, FileCheckpointStore};
use crate::config::{load_config, AppConfig};
use crate::core::AgentError;
use crate::llm::{
    resolve_api_key, EmbeddingProvider, LlmClient, MockLlmClient, OpenAiClient, OpenAiEmbedder, DEEPSEEK_CHAT,
};
use crate::react::{build_system_prompt, Controller, Planner};
use crate::retrieval::{load_jsonl, KeywordIndex, RetrievalEngine, RetrievalSettings, SimilarityIndex, VectorIndex};
use crate::tools::{
    Confirmer, FixedConfirmer, HumanAssistanceTool, RunCommandsTool, SafetyPolicy, Sandbox, StdinConfirmer,
    ToolExecutor, ToolRegistry,
};

/// 根据配置与环境变量选择 LLM 后端
///
/// - 有 DEEPSEEK_API_KEY，或 provider = deepseek 且有 OPENAI_API_KEY：DeepSeek
/// - 有 OPENAI_API_KEY 且 provider 不是 deepseek：OpenAI 兼容端点
/// - provider = mock 或没有任何 key：Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let deepseek_key = resolve_api_key(None, &["DEEPSEEK_API_KEY"]);
    let openai_key = resolve_api_key(None, &["OPENAI_API_KEY"]);
    let timeout = cfg.llm.timeouts.request;

    let client = match (provider.as_str(), deepseek_key, openai_key) {
        ("mock", _, _) => None,
        (_, Some(key), _) | ("deepseek", None, Some(key)) => {
            let model = cfg
                .llm
                .deepseek
                .model
                .clone()
                .or_else(|| Some(cfg.llm.model.clone()).filter(|m| !m.is_empty()))
                .unwrap_or_else(|| DEEPSEEK_CHAT.to_string());
            tracing::info!("Using DeepSeek LLM ({})", model);
            Some(OpenAiClient::deepseek(&model, &key))
        }
        (_, None, Some(key)) => {
            let model = cfg
                .llm
                .openai
                .model
                .clone()
                .unwrap_or_else(|| "gpt-4o-mini".to_string());
            tracing::info!("Using OpenAI LLM ({})", model);
            Some(OpenAiClient::new(cfg.llm.base_url.as_deref(), &model, &key))
        }
        (_, None, None) => None,
    };
    match client {
        Some(client) => Arc::new(client.with_request_timeout(timeout)),
        None => {
            tracing::warn!("No API key set or provider is mock, using Mock LLM");
            Arc::new(MockLlmClient)
        }
    }
}

/// 配置了 embedding_model 且有 OPENAI_API_KEY 时创建嵌入后端
pub fn create_embedder(cfg: &AppConfig) -> Option<Arc<dyn EmbeddingProvider>> {
    let model = cfg.retrieval.embedding_model.as_deref()?;
    let Some(key) = resolve_api_key(None, &["OPENAI_API_KEY"]) else {
        tracing::info!("embedding_model set but OPENAI_API_KEY missing; using keyword index");
        return None;
    };
    Some(Arc::new(OpenAiEmbedder::new(cfg.llm.base_url.as_deref(), model, &key)))
}

/// 注册内置工具：run_commands、human_assistance
pub fn default_registry() -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(RunCommandsTool);
    tools.register(HumanAssistanceTool);
    tools
}

/// 沙箱、安全策略与确认方式；confirm_unknown = false 时未知命令一律拒绝
pub fn create_executor(cfg: &AppConfig) -> Result<ToolExecutor, AgentError> {
    let sandbox = Sandbox::new(&cfg.app.sandbox_root)?;
    let policy = SafetyPolicy::new(cfg.tools.safe_prefixes.clone(), cfg.tools.dangerous_patterns.clone())?;
    let confirmer: Arc<dyn Confirmer> = if cfg.tools.confirm_unknown {
        Arc::new(StdinConfirmer)
    } else {
        Arc::new(FixedConfirmer::deny_all())
    };
    tracing::info!(root = %sandbox.root().display(), "sandbox ready");
    Ok(ToolExecutor::new(default_registry(), sandbox, policy, cfg.tools.tool_timeout_secs).with_confirmer(confirmer))
}

pub fn retrieval_settings(cfg: &AppConfig) -> RetrievalSettings {
    RetrievalSettings {
        per_query_limit: cfg.retrieval.per_query_limit,
        min_score: cfg.retrieval.min_score,
        policy: cfg.retrieval.fusion_policy(),
        max_chunks: cfg.retrieval.max_chunks,
    }
}

/// 加载语料并建索引；未配置 corpus_path 时不启用检索
///
/// 配置了 embedding_model 且有 API Key 时用向量索引，否则用关键词索引。
pub async fn create_retrieval(cfg: &AppConfig) -> Result<Option<Arc<RetrievalEngine>>, AgentError> {
    let Some(path) = cfg.retrieval.corpus_path.as_ref() else {
        tracing::info!("retrieval disabled: no corpus_path");
        return Ok(None);
    };
    let docs = load_jsonl(path).await?;
    let total = docs.len();

    let index: Arc<dyn SimilarityIndex> = match create_embedder(cfg) {
        Some(embedder) => {
            let index = VectorIndex::new(embedder);
            let added = index.extend(docs).await;
            tracing::info!(documents = total, embedded = added, "vector index built");
            Arc::new(index)
        }
        None => {
            let mut index = KeywordIndex::new();
            index.extend(docs);
            tracing::info!(documents = total, "keyword index built");
            Arc::new(index)
        }
    };
    Ok(Some(Arc::new(RetrievalEngine::new(index, retrieval_settings(cfg)))))
}

#[cfg(feature = "sqlite")]
async fn open_sqlite_store(cfg: &AppConfig) -> Result<Option<Arc<dyn CheckpointStore>>, AgentError> {
    let Some(db) = cfg.app.checkpoint_db.as_ref() else {
        return Ok(None);
    };
    let store = crate::checkpoint::SqliteCheckpointStore::open(db).await?;
    tracing::info!(db = %db.display(), "sqlite checkpoint store ready");
    Ok(Some(Arc::new(store)))
}

#[cfg(not(feature = "sqlite"))]
async fn open_sqlite_store(cfg: &AppConfig) -> Result<Option<Arc<dyn CheckpointStore>>, AgentError> {
    if cfg.app.checkpoint_db.is_some() {
        tracing::warn!("checkpoint_db set but built without the sqlite feature; using files");
    }
    Ok(None)
}

/// 检查点存储：配置了 checkpoint_db 且启用 sqlite feature 时用 SQLite，否则 JSONL 文件
pub async fn create_checkpoint_store(cfg: &AppConfig) -> Result<Arc<dyn CheckpointStore>, AgentError> {
    if let Some(store) = open_sqlite_store(cfg).await? {
        return Ok(store);
    }
    let store = FileCheckpointStore::new(&cfg.app.checkpoint_dir).await?;
    tracing::info!(dir = %cfg.app.checkpoint_dir.display(), "file checkpoint store ready");
    Ok(Arc::new(store))
}

/// 用给定 LLM 组装 Controller
pub async fn create_controller_with_llm(cfg: &AppConfig, llm: Arc<dyn LlmClient>) -> Result<Controller, AgentError> {
    let executor = create_executor(cfg)?;
    let system_prompt = build_system_prompt(executor.registry());
    let planner = Planner::new(llm, system_prompt, cfg.protocol.max_parse_retries);
    let retrieval = create_retrieval(cfg).await?;
    let checkpoints = CheckpointController::new(create_checkpoint_store(cfg).await?);
    Ok(Controller::new(
        planner,
        Arc::new(executor),
        retrieval,
        checkpoints,
        cfg.protocol.max_steps,
    ))
}

/// 加载配置并组装 Controller；配置加载失败时使用默认值
pub async fn create_controller(config_path: Option<std::path::PathBuf>) -> anyhow::Result<(AppConfig, Controller)> {
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    let llm = create_llm_from_config(&cfg);
    let controller = create_controller_with_llm(&cfg, llm).await?;
    Ok((cfg, controller))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FusionKind;
    use crate::retrieval::FusionPolicy;

    fn config_in(dir: &std::path::Path) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.app.sandbox_root = dir.join("ws");
        cfg.app.checkpoint_dir = dir.join("ckpt");
        cfg.tools.confirm_unknown = false;
        cfg
    }

    #[test]
    fn test_registry_has_builtin_tools() {
        let names = default_registry().tool_names();
        assert!(names.contains(&"run_commands".to_string()));
        assert!(names.contains(&"human_assistance".to_string()));
    }

    #[test]
    fn test_executor_creates_sandbox_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = config_in(dir.path());
        let exec = create_executor(&cfg).unwrap();
        assert!(exec.sandbox().root().is_dir());
    }

    #[test]
    fn test_retrieval_settings_follow_config() {
        let mut cfg = AppConfig::default();
        cfg.retrieval.fusion = FusionKind::Union;
        cfg.retrieval.max_chunks = Some(3);
        let s = retrieval_settings(&cfg);
        assert_eq!(s.policy, FusionPolicy::UnionDedup);
        assert_eq!(s.max_chunks, Some(3));
    }

    #[tokio::test]
    async fn test_keyword_retrieval_from_corpus() {
        let dir = tempfile::TempDir::new().unwrap();
        let corpus = dir.path().join("corpus.jsonl");
        std::fs::write(
            &corpus,
            "{\"content\": \"rust ownership rules\", \"source\": \"book.pdf\", \"page\": 4}\n",
        )
        .unwrap();
        let mut cfg = config_in(dir.path());
        cfg.retrieval.corpus_path = Some(corpus);
        let engine = create_retrieval(&cfg).await.unwrap().unwrap();
        let r = engine.retrieve("rust ownership", &[]).await.unwrap();
        assert_eq!(r.chunks[0].locator, "book.pdf#4");
    }

    #[tokio::test]
    async fn test_no_corpus_disables_retrieval() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(create_retrieval(&config_in(dir.path())).await.unwrap().is_none());
    }
}
