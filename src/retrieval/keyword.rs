//! 关键词索引：分词后按 Jaccard 相似度打分

use std::collections::HashSet;

use async_trait::async_trait;

use crate::retrieval::tokenizer::{jaccard_similarity, tokenize_to_set};
use crate::retrieval::{Document, SearchHit, SimilarityIndex};

#[derive(Default)]
pub struct KeywordIndex {
    docs: Vec<(Document, HashSet<String>)>,
}

impl KeywordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, doc: Document) {
        let tokens = tokenize_to_set(&doc.content);
        self.docs.push((doc, tokens));
    }

    pub fn extend(&mut self, docs: impl IntoIterator<Item = Document>) {
        for d in docs {
            self.add(d);
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[async_trait]
impl SimilarityIndex for KeywordIndex {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, String> {
        let q = tokenize_to_set(query);
        let mut scored: Vec<SearchHit> = self
            .docs
            .iter()
            .map(|(d, tokens)| SearchHit::new(d.content.clone(), d.locator(), jaccard_similarity(&q, tokens)))
            .filter(|h| h.score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keyword_search_ranks_overlap() {
        let mut index = KeywordIndex::new();
        index.extend([
            Document::new("reset the router by holding the button", "manual", Some(1)),
            Document::new("router firmware update steps", "manual", Some(2)),
            Document::new("billing and refunds", "faq", None),
        ]);
        let hits = index.search("reset router", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].locator, "manual#1");
        assert!(hits[0].score > hits[1].score);

        let capped = index.search("reset router", 1).await.unwrap();
        assert_eq!(capped.len(), 1);
    }
}
