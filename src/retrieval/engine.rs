//! 检索融合引擎
//!
//! 原始查询与改写查询并发检索（每个查询一个任务），等待全部结束后再融合；
//! 单个查询失败不影响其他查询，结果标记为 degraded。

use std::sync::Arc;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::retrieval::{reciprocal_rank_fusion, union_dedup, Chunk, FusionPolicy, SearchHit, SimilarityIndex};

/// 单个查询的结局
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub query: String,
    /// 过阈值后的结果；失败时为空
    pub hits: Vec<SearchHit>,
    pub error: Option<String>,
}

/// 一次扇出：原始查询、改写查询、逐查询结果
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryFanOut {
    pub original: String,
    pub generated: Vec<String>,
    pub per_query: Vec<QueryOutcome>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub chunks: Vec<Chunk>,
    pub degraded: bool,
    pub failed_queries: Vec<String>,
    pub fan_out: QueryFanOut,
}

impl FusedResult {
    /// 部分失败时对应的错误，用于附注在 observe 内容中
    pub fn partial_failure(&self) -> Option<AgentError> {
        self.degraded.then(|| AgentError::RetrievalPartialFailure {
            failed: self.failed_queries.len(),
            total: self.fan_out.per_query.len(),
        })
    }
}

#[derive(Clone, Debug)]
pub struct RetrievalSettings {
    pub per_query_limit: usize,
    pub min_score: f32,
    pub policy: FusionPolicy,
    pub max_chunks: Option<usize>,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            per_query_limit: 10,
            min_score: 0.0,
            policy: FusionPolicy::default(),
            max_chunks: None,
        }
    }
}

pub struct RetrievalEngine {
    index: Arc<dyn SimilarityIndex>,
    settings: RetrievalSettings,
}

impl RetrievalEngine {
    pub fn new(index: Arc<dyn SimilarityIndex>, settings: RetrievalSettings) -> Self {
        Self { index, settings }
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    /// 原始查询在前，其后为改写查询；去掉空白与重复
    fn query_list(original: &str, generated: &[String]) -> Vec<String> {
        let mut queries: Vec<String> = Vec::with_capacity(generated.len() + 1);
        for q in std::iter::once(original).chain(generated.iter().map(String::as_str)) {
            let q = q.trim();
            if !q.is_empty() && !queries.iter().any(|e| e == q) {
                queries.push(q.to_string());
            }
        }
        queries
    }

    pub async fn retrieve(&self, original: &str, generated: &[String]) -> Result<FusedResult, AgentError> {
        let queries = Self::query_list(original, generated);
        if queries.is_empty() {
            return Err(AgentError::RetrievalEmpty { degraded: false });
        }

        let limit = self.settings.per_query_limit;
        let handles: Vec<_> = queries
            .iter()
            .cloned()
            .map(|q| {
                let index = self.index.clone();
                tokio::spawn(async move { index.search(&q, limit).await })
            })
            .collect();
        let settled = join_all(handles).await;

        let mut per_query = Vec::with_capacity(queries.len());
        let mut failed_queries = Vec::new();
        for (query, joined) in queries.into_iter().zip(settled) {
            let result = joined.unwrap_or_else(|e| Err(format!("search task failed: {e}")));
            match result {
                Ok(hits) => {
                    let kept: Vec<SearchHit> = hits
                        .into_iter()
                        .take(limit)
                        .filter(|h| h.score >= self.settings.min_score)
                        .collect();
                    tracing::debug!(query = %query, hits = kept.len(), "retrieval query done");
                    per_query.push(QueryOutcome {
                        query,
                        hits: kept,
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(query = %query, error = %e, "retrieval query failed");
                    failed_queries.push(query.clone());
                    per_query.push(QueryOutcome {
                        query,
                        hits: Vec::new(),
                        error: Some(e),
                    });
                }
            }
        }

        let degraded = !failed_queries.is_empty();
        if failed_queries.len() == per_query.len() {
            return Err(AgentError::RetrievalEmpty { degraded: true });
        }

        let lists: Vec<Vec<SearchHit>> = per_query
            .iter()
            .filter(|o| o.error.is_none())
            .map(|o| o.hits.clone())
            .collect();
        let mut chunks = match self.settings.policy {
            FusionPolicy::UnionDedup => union_dedup(&lists),
            FusionPolicy::ReciprocalRank { k } => reciprocal_rank_fusion(&lists, k),
        };
        if let Some(max) = self.settings.max_chunks {
            chunks.truncate(max);
        }
        if chunks.is_empty() {
            return Err(AgentError::RetrievalEmpty { degraded });
        }
        tracing::info!(
            queries = per_query.len(),
            failed = failed_queries.len(),
            chunks = chunks.len(),
            "retrieval fused"
        );

        Ok(FusedResult {
            chunks,
            degraded,
            failed_queries,
            fan_out: QueryFanOut {
                original: original.to_string(),
                generated: generated.to_vec(),
                per_query,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// 每个查询返回预置结果；未登记的查询返回错误
    struct MapIndex(HashMap<String, Vec<SearchHit>>);

    #[async_trait]
    impl SimilarityIndex for MapIndex {
        async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, String> {
            self.0
                .get(query)
                .map(|h| h.iter().take(limit).cloned().collect())
                .ok_or_else(|| format!("connection reset for {query}"))
        }
    }

    fn engine(entries: &[(&str, &[(&str, f32)])], settings: RetrievalSettings) -> RetrievalEngine {
        let map = entries
            .iter()
            .map(|(q, hits)| {
                let hits = hits
                    .iter()
                    .map(|(c, s)| SearchHit::new(*c, format!("{c}.txt"), *s))
                    .collect();
                (q.to_string(), hits)
            })
            .collect();
        RetrievalEngine::new(Arc::new(MapIndex(map)), settings)
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let e = engine(
            &[("q1", &[("A", 0.9)]), ("q3", &[("C", 0.8)])],
            RetrievalSettings::default(),
        );
        let r = e.retrieve("q1", &["q2".into(), "q3".into()]).await.unwrap();
        assert!(r.degraded);
        assert_eq!(r.failed_queries, vec!["q2"]);
        let contents: Vec<_> = r.chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["A", "C"]);
        assert!(matches!(
            r.partial_failure(),
            Some(AgentError::RetrievalPartialFailure { failed: 1, total: 3 })
        ));
    }

    #[tokio::test]
    async fn test_all_failed_is_degraded_empty() {
        let e = engine(&[], RetrievalSettings::default());
        let err = e.retrieve("q1", &["q2".into()]).await.unwrap_err();
        assert!(matches!(err, AgentError::RetrievalEmpty { degraded: true }));
    }

    #[tokio::test]
    async fn test_threshold_filters_before_fusion() {
        let settings = RetrievalSettings {
            min_score: 0.5,
            policy: FusionPolicy::UnionDedup,
            ..Default::default()
        };
        let e = engine(&[("q", &[("keep", 0.7), ("drop", 0.2)])], settings);
        let r = e.retrieve("q", &[]).await.unwrap();
        assert_eq!(r.chunks.len(), 1);
        assert_eq!(r.chunks[0].content, "keep");
        assert!(!r.degraded);

        let e = engine(&[("q", &[("drop", 0.2)])], RetrievalSettings { min_score: 0.5, ..Default::default() });
        assert!(matches!(
            e.retrieve("q", &[]).await,
            Err(AgentError::RetrievalEmpty { degraded: false })
        ));
    }

    #[tokio::test]
    async fn test_original_query_first_and_duplicates_skipped() {
        let e = engine(&[("q", &[("A", 0.5)])], RetrievalSettings::default());
        let r = e.retrieve("q", &["q".into(), " ".into()]).await.unwrap();
        assert_eq!(r.fan_out.per_query.len(), 1);
        assert_eq!(r.fan_out.per_query[0].query, "q");
    }

    #[tokio::test]
    async fn test_max_chunks_caps_output() {
        let settings = RetrievalSettings {
            max_chunks: Some(1),
            ..Default::default()
        };
        let e = engine(&[("q", &[("A", 0.9), ("B", 0.8)])], settings);
        let r = e.retrieve("q", &[]).await.unwrap();
        assert_eq!(r.chunks.len(), 1);
    }
}
