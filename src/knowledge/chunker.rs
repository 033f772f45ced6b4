//! Markdown 按标题分块（#、##、###），代码块内的 # 不算标题

use std::path::{Path, PathBuf};

/// 知识片段
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub source: PathBuf,
    /// 所在的标题路径，如 ["Guide", "Setup"]
    pub headers: Vec<String>,
}

/// 若该行是 1~3 级标题，返回 (级别, 标题文本)
fn header_level(line: &str) -> Option<(usize, &str)> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if !(1..=3).contains(&hashes) {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with(' ') {
        return None;
    }
    Some((hashes, rest.trim()))
}

fn flush(buf: &mut Vec<&str>, headers: &[String], source: &Path, chunks: &mut Vec<Chunk>) {
    let text = buf.join("\n").trim().to_string();
    buf.clear();
    // 只有标题、没有正文的段落不单独成块
    if text.lines().all(|l| l.trim().is_empty() || header_level(l).is_some()) {
        return;
    }
    chunks.push(Chunk {
        text,
        source: source.to_path_buf(),
        headers: headers.to_vec(),
    });
}

pub fn split_markdown(content: &str, source: &Path) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut headers: Vec<String> = Vec::new();
    let mut buf: Vec<&str> = Vec::new();
    let mut in_fence = false;

    for line in content.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        if !in_fence {
            if let Some((level, title)) = header_level(line) {
                flush(&mut buf, &headers, source, &mut chunks);
                headers.truncate(level - 1);
                headers.push(title.to_string());
            }
        }
        buf.push(line);
    }
    flush(&mut buf, &headers, source, &mut chunks);
    chunks
}
