//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::retrieval::FusionPolicy;
use crate::tools::{default_dangerous_patterns, default_safe_prefixes};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub protocol: ProtocolSection,
    pub tools: ToolsSection,
    pub retrieval: RetrievalSection,
}

/// [app] 段：沙箱根目录、检查点目录、退出口令
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub sandbox_root: PathBuf,
    pub checkpoint_dir: PathBuf,
    /// 设置后使用 SQLite 存储（需 feature = "sqlite"）
    pub checkpoint_db: Option<PathBuf>,
    pub exit_sentinel: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            sandbox_root: PathBuf::from("./workspace"),
            checkpoint_dir: PathBuf::from("./.hive/checkpoints"),
            checkpoint_db: None,
            exit_sentinel: "exit".to_string(),
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock；最终选择还取决于是否有 API Key
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub deepseek: ModelOverride,
    pub openai: ModelOverride,
    pub timeouts: LlmTimeoutsSection,
}

/// [llm.deepseek] / [llm.openai]：按后端覆盖模型名
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ModelOverride {
    pub model: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
            base_url: None,
            deepseek: ModelOverride::default(),
            openai: ModelOverride::default(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [protocol] 段：解析重试次数与单轮最大步数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProtocolSection {
    pub max_parse_retries: usize,
    pub max_steps: usize,
}

impl Default for ProtocolSection {
    fn default() -> Self {
        Self {
            max_parse_retries: 3,
            max_steps: 20,
        }
    }
}

/// [tools] 段：工具超时、白名单前缀、危险关键字、未知命令是否交互确认
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    pub safe_prefixes: Vec<String>,
    pub dangerous_patterns: Vec<String>,
    /// false 时未知命令一律拒绝（非交互环境）
    pub confirm_unknown: bool,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            safe_prefixes: default_safe_prefixes(),
            dangerous_patterns: default_dangerous_patterns(),
            confirm_unknown: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FusionKind {
    Union,
    Rrf,
}

/// [retrieval] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalSection {
    pub per_query_limit: usize,
    pub min_score: f32,
    pub fusion: FusionKind,
    pub rrf_k: u32,
    pub max_chunks: Option<usize>,
    /// JSONL 语料；未设置时不启用检索
    pub corpus_path: Option<PathBuf>,
    /// 设置且有 API Key 时使用向量索引，否则用关键词索引
    pub embedding_model: Option<String>,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            per_query_limit: 10,
            min_score: 0.0,
            fusion: FusionKind::Rrf,
            rrf_k: 60,
            max_chunks: None,
            corpus_path: None,
            embedding_model: None,
        }
    }
}

impl RetrievalSection {
    pub fn fusion_policy(&self) -> FusionPolicy {
        match self.fusion {
            FusionKind::Union => FusionPolicy::UnionDedup,
            FusionKind::Rrf => FusionPolicy::ReciprocalRank { k: self.rrf_k },
        }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.protocol.max_parse_retries, 3);
        assert_eq!(cfg.protocol.max_steps, 20);
        assert_eq!(cfg.tools.tool_timeout_secs, 30);
        assert_eq!(cfg.app.exit_sentinel, "exit");
        assert_eq!(cfg.retrieval.fusion_policy(), FusionPolicy::ReciprocalRank { k: 60 });
        assert!(cfg.tools.dangerous_patterns.iter().any(|p| p == "rm"));
    }

    #[test]
    fn test_explicit_file_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("hive.toml");
        std::fs::write(
            &path,
            "[protocol]\nmax_steps = 5\n\n[retrieval]\nfusion = \"union\"\nmin_score = 0.25\n",
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.protocol.max_steps, 5);
        assert_eq!(cfg.protocol.max_parse_retries, 3);
        assert_eq!(cfg.retrieval.fusion_policy(), FusionPolicy::UnionDedup);
        assert!((cfg.retrieval.min_score - 0.25).abs() < 1e-6);
    }
}
