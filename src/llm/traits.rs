//! 生成步骤抽象
//!
//! 核心只依赖 generate(prompt, tools?) -> { text, structured_call? } 这一形状；
//! 「必须从 N 个函数中选一个并给出参数对象」的约束由具体后端负责落实。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// 暴露给 LLM 的可调用函数描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON-Schema 风格的参数对象
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// LLM 选择的结构化调用：函数名 + 参数对象
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// 一次生成的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generation {
    pub text: String,
    pub structured_call: Option<StructuredCall>,
}

impl Generation {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            structured_call: None,
        }
    }

    pub fn call(name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            text: String::new(),
            structured_call: Some(StructuredCall {
                name: name.into(),
                arguments,
            }),
        }
    }
}

/// 生成步骤失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("empty response")]
    EmptyResponse,
}

/// LLM 客户端 trait：prompt 进，文本或结构化调用出
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// tools 为 Some 时，后端必须让模型从中恰好选择一个函数
    async fn generate(&self, prompt: &str, tools: Option<&[ToolSpec]>) -> Result<Generation, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
