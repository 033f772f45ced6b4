//! web_search 动作：DuckDuckGo HTML 端点
//!
//! GET 带超时与 User-Agent；用正则取出结果链接（class="result__a"），标题去标签后经 html2text 解码实体。

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::{Map, Value};

use crate::core::ActionError;
use crate::tools::registry::{required_str, Tool};

const SEARCH_URL: &str = "https://duckduckgo.com/html/";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

static RESULT_RE: OnceLock<Regex> = OnceLock::new();
static TAG_RE: OnceLock<Regex> = OnceLock::new();

/// 从结果页 HTML 中提取最多 max 条 "标题 - 链接"
pub fn parse_results(html: &str, max: usize) -> Vec<String> {
    let result_re = RESULT_RE.get_or_init(|| {
        Regex::new(r#"(?s)class="result__a"[^>]*href="(?P<href>[^"]+)"[^>]*>(?P<title>.*?)</a>"#).unwrap()
    });
    let tag_re = TAG_RE.get_or_init(|| Regex::new(r"<[^>]+>").unwrap());
    result_re
        .captures_iter(html)
        .take(max)
        .map(|caps| {
            let stripped = tag_re.replace_all(&caps["title"], "");
            // html2text 负责实体解码（&amp; 等）
            let title = html2text::from_read(stripped.as_bytes(), 500)
                .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
                .unwrap_or_else(|_| stripped.to_string());
            format!("{} - {}", title, caps["href"].replace("&amp;", "&"))
        })
        .collect()
}

pub struct WebSearchTool {
    client: Client,
    default_max_results: usize,
}

impl WebSearchTool {
    pub fn new(timeout_secs: u64, default_max_results: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            default_max_results,
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web. Args: {\"query\": \"...\", \"max_results\": 5}"
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<String, ActionError> {
        let query = required_str(args, "query")?;
        let max = args
            .get("max_results")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(self.default_max_results)
            .max(1);
        tracing::info!(query = %query, max, "web_search");

        let resp = self
            .client
            .get(SEARCH_URL)
            .query(&[("q", query), ("t", "h_"), ("ia", "web")])
            .send()
            .await
            .map_err(|e| ActionError::Failed(format!("Failed to fetch search results: {e}")))?;
        if !resp.status().is_success() {
            return Err(ActionError::Failed(format!("HTTP {}", resp.status())));
        }
        let html = resp
            .text()
            .await
            .map_err(|e| ActionError::Failed(format!("Read body: {e}")))?;

        let results = parse_results(&html, max);
        if results.is_empty() {
            return Ok(format!("No results found for '{query}'."));
        }
        Ok(results.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_results() {
        let html = r#"
<div><a rel="nofollow" class="result__a" href="https://docs.rs/tokio">Tokio &amp; <b>async</b> runtime</a></div>
<div><a class="result__a" href="https://tokio.rs/?a=1&amp;b=2">Tokio site</a></div>
<div><a class="result__a" href="https://example.com">Third</a></div>
"#;
        let results = parse_results(html, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], "Tokio & async runtime - https://docs.rs/tokio");
        assert_eq!(results[1], "Tokio site - https://tokio.rs/?a=1&b=2");
    }

    #[test]
    fn test_parse_no_results() {
        assert!(parse_results("<html><body>nothing</body></html>", 5).is_empty());
    }
}
