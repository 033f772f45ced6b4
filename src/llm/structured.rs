//! 文本后端上的结构化调用约束
//!
//! 对只返回文本的 Chat API：把可选函数列表与调用格式的 JSON Schema（schemars 生成）拼进 system prompt，
//! 再从回复中提取 JSON（```json ... ``` 或首尾花括号）并解析为 StructuredCall；函数名不在列表中视为无调用。

use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::llm::{StructuredCall, ToolSpec};

/// 结构化调用格式：与解析的 `{"name": "...", "arguments": {...}}` 一致（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema, Deserialize)]
struct CallFormat {
    /// 函数名，必须是可选函数之一
    name: String,
    /// 函数参数对象，遵循该函数的 parameters schema
    #[serde(default)]
    arguments: Map<String, Value>,
}

/// 返回结构化调用的 JSON Schema 字符串，可拼入 system prompt
pub fn call_format_schema_json() -> String {
    let schema = schema_for!(CallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// 生成约束模型「只输出一个函数调用」的 system prompt
pub fn tool_instructions(tools: &[ToolSpec]) -> String {
    let listing: Vec<Value> = tools
        .iter()
        .map(|t| {
            serde_json::json!({
                "name": t.name,
                "description": t.description,
                "parameters": t.parameters,
            })
        })
        .collect();
    let listing = serde_json::to_string_pretty(&listing).unwrap_or_else(|_| "[]".to_string());
    format!(
        "You must respond by calling exactly ONE of the functions below. \
         Output only a single JSON object and nothing else.\n\n\
         ## Available functions\n```json\n{listing}\n```\n\n\
         ## Call format (JSON Schema)\n```json\n{}\n```",
        call_format_schema_json()
    )
}

/// 从文本中截取 JSON 对象：优先 ```json 代码块，其次首个 '{' 到最后一个 '}'
pub fn extract_json_block(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&trimmed[start..=end])
}

/// 解析模型回复为结构化调用；无 JSON、格式不符或函数名不在 tools 中时返回 None
pub fn parse_structured_call(output: &str, tools: &[ToolSpec]) -> Option<StructuredCall> {
    let json_str = extract_json_block(output)?;
    let parsed: CallFormat = match serde_json::from_str(json_str) {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!(error = %e, "reply is not a structured call");
            return None;
        }
    };
    if !tools.iter().any(|t| t.name == parsed.name) {
        tracing::debug!(name = %parsed.name, "reply names an unknown function");
        return None;
    }
    Some(StructuredCall {
        name: parsed.name,
        arguments: parsed.arguments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tools() -> Vec<ToolSpec> {
        vec![
            ToolSpec::new("retrieve_knowledge", "search", serde_json::json!({"type": "object"})),
            ToolSpec::new("finish", "done", serde_json::json!({"type": "object"})),
        ]
    }

    #[test]
    fn test_parse_fenced_call() {
        let out = "Sure.\n```json\n{\"name\": \"finish\", \"arguments\": {\"schema_choice\": \"prp\"}}\n```";
        let call = parse_structured_call(out, &tools()).unwrap();
        assert_eq!(call.name, "finish");
        assert_eq!(call.arguments["schema_choice"], "prp");
    }

    #[test]
    fn test_parse_bare_call_with_prose() {
        let out = "I'll search. {\"name\": \"retrieve_knowledge\", \"arguments\": {\"query\": \"x\"}} ok";
        let call = parse_structured_call(out, &tools()).unwrap();
        assert_eq!(call.name, "retrieve_knowledge");
    }

    #[test]
    fn test_unknown_function_is_no_call() {
        let out = r#"{"name": "delete_everything", "arguments": {}}"#;
        assert!(parse_structured_call(out, &tools()).is_none());
    }

    #[test]
    fn test_plain_text_is_no_call() {
        assert!(parse_structured_call("I think we are done.", &tools()).is_none());
    }

    #[test]
    fn test_instructions_list_functions() {
        let s = tool_instructions(&tools());
        assert!(s.contains("retrieve_knowledge"));
        assert!(s.contains("arguments"));
    }
}
