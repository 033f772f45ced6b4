//! 知识检索

pub mod chunker;
pub mod store;

pub use chunker::{split_markdown, Chunk};
pub use store::KnowledgeStore;

/// 检索接口：query 进，最相关的 k 个片段出
pub trait KnowledgeRetriever: Send + Sync {
    fn retrieve(&self, query: &str, k: usize) -> Vec<String>;
}
