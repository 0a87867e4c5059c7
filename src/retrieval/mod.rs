//! 检索层：相似度索引协作者、多查询扇出与结果融合

pub mod corpus;
pub mod engine;
pub mod fusion;
pub mod index;
pub mod keyword;
pub mod tokenizer;
pub mod vector;

pub use corpus::{load_jsonl, Document};
pub use engine::{FusedResult, QueryFanOut, QueryOutcome, RetrievalEngine, RetrievalSettings};
pub use fusion::{reciprocal_rank_fusion, union_dedup};
pub use index::{Chunk, FusionPolicy, SearchHit, SimilarityIndex};
pub use keyword::KeywordIndex;
pub use vector::VectorIndex;
