//! 相似度检索的外部协作者与结果类型

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 索引返回的一条结果；score 只按大小比较，不假设量纲
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub content: String,
    /// 来源定位（如 "manual.pdf#12"）
    pub locator: String,
    pub score: f32,
}

impl SearchHit {
    pub fn new(content: impl Into<String>, locator: impl Into<String>, score: f32) -> Self {
        Self {
            content: content.into(),
            locator: locator.into(),
            score,
        }
    }
}

#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// 返回至多 limit 条结果，按相关度降序
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, String>;
}

/// 融合后的唯一结果
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub locator: String,
    /// 融合得分（RRF 累加值，或 Union 时各查询中的最高原始分）
    pub score: f64,
    /// 内容同一性键，融合结果内唯一
    pub dedup_key: String,
}

impl Chunk {
    pub fn dedup_key_of(content: &str) -> String {
        content.to_string()
    }
}

/// 融合策略
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FusionPolicy {
    /// 按插入顺序合并，首次出现者保留
    UnionDedup,
    /// 每个查询中排名 r（从 0 开始）贡献 1/(k + r + 1)
    ReciprocalRank { k: u32 },
}

impl Default for FusionPolicy {
    fn default() -> Self {
        FusionPolicy::ReciprocalRank { k: 60 }
    }
}
