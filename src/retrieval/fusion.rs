//! 结果融合：Union+Dedup 与 Reciprocal Rank Fusion
//!
//! 输入为按查询顺序排列的各查询结果（已过阈值过滤）。

use std::collections::HashMap;

use crate::retrieval::{Chunk, SearchHit};

/// 按内容去重，首次出现者保留，顺序为插入顺序；得分取各次出现中的最高原始分
pub fn union_dedup(lists: &[Vec<SearchHit>]) -> Vec<Chunk> {
    let mut order: Vec<Chunk> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();
    for hit in lists.iter().flatten() {
        let key = Chunk::dedup_key_of(&hit.content);
        match seen.get(&key) {
            Some(&idx) => {
                let chunk = &mut order[idx];
                chunk.score = chunk.score.max(hit.score as f64);
            }
            None => {
                seen.insert(key.clone(), order.len());
                order.push(Chunk {
                    content: hit.content.clone(),
                    locator: hit.locator.clone(),
                    score: hit.score as f64,
                    dedup_key: key,
                });
            }
        }
    }
    order
}

/// RRF：按内容累加 1/(k + r + 1)，降序排列；同分按首次出现顺序
pub fn reciprocal_rank_fusion(lists: &[Vec<SearchHit>], k: u32) -> Vec<Chunk> {
    let mut order: Vec<Chunk> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();
    for list in lists {
        for (rank, hit) in list.iter().enumerate() {
            let contribution = 1.0 / (k as f64 + rank as f64 + 1.0);
            let key = Chunk::dedup_key_of(&hit.content);
            match seen.get(&key) {
                Some(&idx) => order[idx].score += contribution,
                None => {
                    seen.insert(key.clone(), order.len());
                    order.push(Chunk {
                        content: hit.content.clone(),
                        locator: hit.locator.clone(),
                        score: contribution,
                        dedup_key: key,
                    });
                }
            }
        }
    }
    // sort_by 稳定，同分保持首次出现顺序
    order.sort_by(|a, b| b.score.total_cmp(&a.score));
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hits(items: &[&str]) -> Vec<SearchHit> {
        items
            .iter()
            .enumerate()
            .map(|(i, c)| SearchHit::new(*c, format!("doc#{i}"), 1.0 - i as f32 * 0.1))
            .collect()
    }

    #[test]
    fn test_rrf_ranks_shared_chunk_first() {
        let lists = vec![hits(&["A", "B"]), hits(&["B", "C"])];
        let fused = reciprocal_rank_fusion(&lists, 60);
        let order: Vec<&str> = fused.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(order, vec!["B", "A", "C"]);
        assert!((fused[0].score - (1.0 / 61.0 + 1.0 / 62.0)).abs() < 1e-12);
        assert!((fused[1].score - 1.0 / 61.0).abs() < 1e-12);
        assert!((fused[2].score - 1.0 / 62.0).abs() < 1e-12);
    }

    #[test]
    fn test_rrf_ties_keep_first_seen() {
        let lists = vec![hits(&["X"]), hits(&["Y"]), hits(&["Z"])];
        let fused = reciprocal_rank_fusion(&lists, 60);
        let order: Vec<&str> = fused.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(order, vec!["X", "Y", "Z"]);
    }

    #[test]
    fn test_union_dedup_insertion_order() {
        let lists = vec![hits(&["A", "B"]), hits(&["B", "C"])];
        let fused = union_dedup(&lists);
        let order: Vec<&str> = fused.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "C"]);
        assert_eq!(fused[1].locator, "doc#1");
        // B 在第二个查询中排第一（1.0），高于第一次出现时的 0.9
        assert!((fused[1].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dedup_keys_unique() {
        let lists = vec![hits(&["A", "A", "B"]), hits(&["A"])];
        for fused in [union_dedup(&lists), reciprocal_rank_fusion(&lists, 60)] {
            let mut keys: Vec<_> = fused.iter().map(|c| c.dedup_key.clone()).collect();
            keys.sort();
            keys.dedup();
            assert_eq!(keys.len(), fused.len());
        }
    }
}
