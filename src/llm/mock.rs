//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 两种模式：
//! - 脚本模式：按顺序返回预置的 Generation / 错误，记录每次 prompt 与调用次数；
//! - 默认模式（脚本为空）：有函数可选时调用 finish（或首个函数），否则回显 "{}"，便于离线跑通流程。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::llm::{Generation, LlmClient, LlmError, ToolSpec};

#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<Generation, LlmError>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按顺序返回给定结果；脚本耗尽后回到默认模式
    pub fn scripted(responses: Vec<Result<Generation, LlmError>>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    /// 追加一条脚本结果
    pub fn push(&self, response: Result<Generation, LlmError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(response);
        }
    }

    /// generate 被调用的次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 所有收到的 prompt（按调用顺序）
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn default_generation(tools: Option<&[ToolSpec]>) -> Generation {
        let Some(tools) = tools.filter(|t| !t.is_empty()) else {
            return Generation::text("{}");
        };
        let spec = tools
            .iter()
            .find(|t| t.name == "finish")
            .unwrap_or(&tools[0]);
        let mut args = Map::new();
        if let Some(props) = spec.parameters.get("properties").and_then(Value::as_object) {
            for (key, prop) in props {
                let value = if let Some(first) = prop
                    .get("enum")
                    .and_then(Value::as_array)
                    .and_then(|e| e.first())
                {
                    first.clone()
                } else if prop.get("type").and_then(Value::as_str) == Some("array") {
                    Value::Array(Vec::new())
                } else {
                    Value::String(format!("mock {key}"))
                };
                args.insert(key.clone(), value);
            }
        }
        Generation::call(spec.name.clone(), Value::Object(args))
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, prompt: &str, tools: Option<&[ToolSpec]>) -> Result<Generation, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(result) => result,
            None => Ok(Self::default_generation(tools)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_in_order() {
        let mock = MockLlmClient::scripted(vec![
            Ok(Generation::text("first")),
            Err(LlmError::EmptyResponse),
        ]);
        assert_eq!(mock.generate("a", None).await.unwrap().text, "first");
        assert!(mock.generate("b", None).await.is_err());
        assert_eq!(mock.calls(), 2);
        assert_eq!(mock.prompts(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_default_mode_prefers_finish() {
        let mock = MockLlmClient::new();
        let tools = vec![
            ToolSpec::new("read_file", "", serde_json::json!({"type": "object"})),
            ToolSpec::new(
                "finish",
                "",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "schema_choice": {"type": "string", "enum": ["prp_base"]},
                        "pattern_references": {"type": "array", "items": {"type": "string"}}
                    }
                }),
            ),
        ];
        let gen = mock.generate("plan", Some(&tools)).await.unwrap();
        let call = gen.structured_call.unwrap();
        assert_eq!(call.name, "finish");
        assert_eq!(call.arguments["schema_choice"], "prp_base");
        assert_eq!(call.arguments["pattern_references"], serde_json::json!([]));
    }
}
