//! Token 估算（确定性的字符计数近似，不依赖具体模型的分词器）

/// Token 估算器
pub struct TokenEstimator;

impl TokenEstimator {
    /// 估算文本的 token 数量
    /// 英文约 4 字符/token，中文约 1.5 字符/token；空文本为 0
    pub fn estimate(text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let (ascii, non_ascii) = text.chars().fold((0usize, 0usize), |(a, n), c| {
            if c.is_ascii() {
                (a + 1, n)
            } else {
                (a, n + 1)
            }
        });
        let tokens = ascii.div_ceil(4) + (non_ascii as f64 / 1.5).ceil() as usize;
        tokens.max(1)
    }
}

/// 按比例截断到约 max_tokens，保留开头部分
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    let estimated = TokenEstimator::estimate(text);
    if estimated <= max_tokens {
        return text.to_string();
    }
    if max_tokens == 0 {
        return String::new();
    }

    let ratio = max_tokens as f64 / estimated as f64;
    // 留 10% 余量给截断标记
    let target_chars = (text.chars().count() as f64 * ratio * 0.9) as usize;
    let truncated: String = text.chars().take(target_chars).collect();
    format!("{}...[truncated]", truncated.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_ascii_and_cjk() {
        assert_eq!(TokenEstimator::estimate(""), 0);
        assert_eq!(TokenEstimator::estimate("abcd"), 1);
        assert_eq!(TokenEstimator::estimate("abcde"), 2);
        assert_eq!(TokenEstimator::estimate("你好吗"), 2);
    }

    #[test]
    fn test_estimate_is_deterministic() {
        let s = "Thought: look at the repo layout first";
        assert_eq!(TokenEstimator::estimate(s), TokenEstimator::estimate(s));
    }

    #[test]
    fn test_truncate_shrinks() {
        let text = "word ".repeat(400);
        let out = truncate_to_tokens(&text, 50);
        assert!(TokenEstimator::estimate(&out) <= 50);
        assert!(out.ends_with("[truncated]"));
        assert_eq!(truncate_to_tokens("short", 50), "short");
    }
}
