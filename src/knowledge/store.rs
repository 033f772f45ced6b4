//! 知识索引：由 knowledge 原语构建，按关键词重叠检索

use std::collections::HashSet;
use std::path::Path;

use walkdir::WalkDir;

use crate::knowledge::chunker::{split_markdown, Chunk};
use crate::knowledge::KnowledgeRetriever;
use crate::primitives::{PrimitiveKind, PrimitiveRegistry};

/// 将文本切分为小写词集合，用于简单相似度（词重叠数）
fn tokenize_lower(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric() && c != '_')
        .map(|w| w.to_lowercase())
        .filter(|w| w.chars().count() > 1)
        .collect()
}

#[derive(Debug, Default)]
pub struct KnowledgeStore {
    chunks: Vec<(Chunk, HashSet<String>)>,
}

impl KnowledgeStore {
    pub fn from_chunks(chunks: Vec<Chunk>) -> Self {
        Self {
            chunks: chunks
                .into_iter()
                .map(|c| {
                    let mut tokens = tokenize_lower(&c.text);
                    for h in &c.headers {
                        tokens.extend(tokenize_lower(h));
                    }
                    (c, tokens)
                })
                .collect(),
        }
    }

    /// 每个 knowledge 原语贡献 `<base_path>/chunks/**/*.md`；没有 chunks 目录时用 entrypoint 文件
    pub fn build(registry: &PrimitiveRegistry) -> Self {
        let mut all = Vec::new();
        for primitive in registry.get_all(PrimitiveKind::Knowledge) {
            let chunks_dir = primitive.base_path.join("chunks");
            if chunks_dir.is_dir() {
                for entry in WalkDir::new(&chunks_dir)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == "md"))
                {
                    all.extend(read_chunks(entry.path()));
                }
            } else {
                all.extend(read_chunks(&primitive.entrypoint_path()));
            }
        }
        tracing::info!(chunks = all.len(), "knowledge store built");
        Self::from_chunks(all)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

fn read_chunks(path: &Path) -> Vec<Chunk> {
    match std::fs::read_to_string(path) {
        Ok(content) => split_markdown(&content, path),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "skipping unreadable knowledge file");
            Vec::new()
        }
    }
}

impl KnowledgeRetriever for KnowledgeStore {
    fn retrieve(&self, query: &str, k: usize) -> Vec<String> {
        let query_tokens = tokenize_lower(query);
        if query_tokens.is_empty() || k == 0 {
            return Vec::new();
        }
        let mut scored: Vec<(usize, &Chunk)> = self
            .chunks
            .iter()
            .map(|(chunk, tokens)| (query_tokens.intersection(tokens).count(), chunk))
            .filter(|(s, _)| *s > 0)
            .collect();
        // 稳定排序：同分保持建索引时的顺序
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(k).map(|(_, c)| c.text.clone()).collect()
    }
}
