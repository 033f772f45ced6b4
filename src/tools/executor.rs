//! 动作执行器
//!
//! execute(action) 永远返回观察字符串：retrieve_knowledge 直连知识检索，其余动作按名查 ToolRegistry，
//! 在超时内执行；失败经 ActionError::to_observation 转为 [ERROR] / [DISALLOWED]。
//! 成功结果按 {tool_name, arguments} 的哈希写入 ResultCache；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::time::timeout;

use crate::cache::{hash_key, ResultCache};
use crate::core::ActionError;
use crate::knowledge::KnowledgeRetriever;
use crate::react::{Action, RETRIEVE_KNOWLEDGE_ACTION};
use crate::tools::ToolRegistry;

pub struct ActionExecutor {
    tools: ToolRegistry,
    knowledge: Arc<dyn KnowledgeRetriever>,
    cache: Option<Arc<ResultCache>>,
    max_age_hours: u64,
    top_k: usize,
    timeout: Duration,
}

impl ActionExecutor {
    pub fn new(tools: ToolRegistry, knowledge: Arc<dyn KnowledgeRetriever>, timeout_secs: u64) -> Self {
        Self {
            tools,
            knowledge,
            cache: None,
            max_age_hours: 0,
            top_k: 5,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn with_cache(mut self, cache: Arc<ResultCache>, max_age_hours: u64) -> Self {
        self.cache = Some(cache);
        self.max_age_hours = max_age_hours;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.tool_names()
    }

    /// 执行动作并返回观察结果；不会返回错误
    pub async fn execute(&self, action: &Action) -> String {
        let start = Instant::now();
        let key = hash_key(&json!({
            "tool_name": action.tool_name,
            "arguments": action.arguments,
        }));

        if let Some(hit) = self.cached(&key) {
            audit(action, "cache_hit", true, start);
            return hit;
        }

        let result = self.dispatch(action).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(ActionError::Disallowed(_)) => "disallowed",
            Err(ActionError::Timeout(_)) => "timeout",
            Err(_) => "error",
        };
        audit(action, outcome, false, start);

        match result {
            Ok(observation) => {
                if let Some(cache) = &self.cache {
                    if let Err(e) = cache.set(&key, &observation) {
                        tracing::warn!(tool = %action.tool_name, error = %e, "failed to cache observation");
                    }
                }
                observation
            }
            Err(e) => e.to_observation(&action.tool_name),
        }
    }

    fn cached(&self, key: &str) -> Option<String> {
        let cache = self.cache.as_ref()?;
        match cache.get_as::<String>(key, self.max_age_hours) {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(error = %e, "action cache lookup failed");
                None
            }
        }
    }

    async fn dispatch(&self, action: &Action) -> Result<String, ActionError> {
        if action.tool_name == RETRIEVE_KNOWLEDGE_ACTION {
            return self.retrieve_knowledge(action);
        }
        let tool = self
            .tools
            .get(&action.tool_name)
            .ok_or_else(|| ActionError::NotRegistered(action.tool_name.clone()))?;
        timeout(self.timeout, tool.execute(&action.arguments))
            .await
            .map_err(|_| ActionError::Timeout(self.timeout.as_secs()))?
    }

    fn retrieve_knowledge(&self, action: &Action) -> Result<String, ActionError> {
        let query = action
            .str_arg("query")
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ActionError::InvalidArguments("missing string argument 'query'".to_string()))?;
        let chunks = self.knowledge.retrieve(query, self.top_k);
        if chunks.is_empty() {
            return Ok(format!("No relevant knowledge found for query '{query}'."));
        }
        Ok(chunks.join("\n"))
    }
}

fn audit(action: &Action, outcome: &str, cache_hit: bool, start: Instant) {
    let audit = json!({
        "event": "tool_audit",
        "tool": action.tool_name,
        "ok": outcome == "ok" || cache_hit,
        "outcome": outcome,
        "cache_hit": cache_hit,
        "duration_ms": start.elapsed().as_millis() as u64,
        "args_preview": args_preview(&Value::Object(action.arguments.clone())),
    });
    tracing::info!(audit = %audit, "tool");
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
