//! 向量索引：嵌入后按余弦相似度打分

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::llm::EmbeddingProvider;
use crate::retrieval::{Document, SearchHit, SimilarityIndex};

pub struct VectorIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    entries: RwLock<Vec<(Document, Vec<f32>)>>,
}

impl VectorIndex {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub async fn add(&self, doc: Document) -> Result<(), String> {
        let embedding = self.embedder.embed(&doc.content).await?;
        if embedding.is_empty() {
            return Err(format!("empty embedding for {}", doc.locator()));
        }
        self.entries.write().await.push((doc, embedding));
        Ok(())
    }

    /// 逐条嵌入；返回成功条数，失败的记录只记日志
    pub async fn extend(&self, docs: impl IntoIterator<Item = Document>) -> usize {
        let mut added = 0;
        for doc in docs {
            let locator = doc.locator();
            match self.add(doc).await {
                Ok(()) => added += 1,
                Err(e) => tracing::warn!(locator = %locator, error = %e, "embedding failed"),
            }
        }
        added
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[async_trait]
impl SimilarityIndex for VectorIndex {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, String> {
        let q = self.embedder.embed(query).await?;
        let entries = self.entries.read().await;
        let mut scored: Vec<SearchHit> = entries
            .iter()
            .map(|(d, emb)| SearchHit::new(d.content.clone(), d.locator(), cosine_similarity(&q, emb)))
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }
}
