//! JSONL 语料：每行一个 {"content", "source", "page"} 记录

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub page: Option<u32>,
}

impl Document {
    pub fn new(content: impl Into<String>, source: impl Into<String>, page: Option<u32>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            page,
        }
    }

    /// "source#page"，无页码时只有 source
    pub fn locator(&self) -> String {
        match self.page {
            Some(p) => format!("{}#{}", self.source, p),
            None => self.source.clone(),
        }
    }
}

/// 读取 JSONL 语料；空行跳过，坏行报错并指出行号
pub async fn load_jsonl(path: impl AsRef<Path>) -> Result<Vec<Document>, AgentError> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AgentError::ConfigError(format!("Cannot read corpus {}: {}", path.display(), e)))?;
    parse_jsonl(&text).map_err(|(line, e)| {
        AgentError::ConfigError(format!("Bad corpus record {}:{}: {}", path.display(), line, e))
    })
}

fn parse_jsonl(text: &str) -> Result<Vec<Document>, (usize, serde_json::Error)> {
    text.lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| serde_json::from_str::<Document>(l).map_err(|e| (i + 1, e)))
        .collect()
}
