//! 规划用函数 Schema 构造
//!
//! 所有变换都返回新的 Value，不修改传入的基础 schema：
//! 每个可调用函数都要求额外的 reasoning / criticism 字段，由 Planner 取出填入 Thought。

use serde_json::{json, Map, Value};

use crate::llm::ToolSpec;
use crate::primitives::Primitive;
use crate::react::types::{FINISH_ACTION, RETRIEVE_KNOWLEDGE_ACTION};

pub const REASONING_FIELD: &str = "reasoning";
pub const CRITICISM_FIELD: &str = "criticism";
pub const SELECT_STRATEGY_TOOL: &str = "select_strategy";

/// 在基础参数 schema 上增加必填的 reasoning / criticism；非对象 schema 视为空对象
pub fn with_thought_fields(base: &Value) -> Value {
    let mut schema = match base {
        Value::Object(map) if map.get("type").and_then(Value::as_str).unwrap_or("object") == "object" => map.clone(),
        _ => Map::new(),
    };
    schema.insert("type".to_string(), json!("object"));

    let mut properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    properties.insert(
        REASONING_FIELD.to_string(),
        json!({"type": "string", "description": "Why this action is the right next step."}),
    );
    properties.insert(
        CRITICISM_FIELD.to_string(),
        json!({"type": "string", "description": "Self-critique: weaknesses or risks of this step."}),
    );
    schema.insert("properties".to_string(), Value::Object(properties));

    let mut required: Vec<Value> = schema
        .get("required")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for field in [REASONING_FIELD, CRITICISM_FIELD] {
        if !required.iter().any(|r| r.as_str() == Some(field)) {
            required.push(json!(field));
        }
    }
    schema.insert("required".to_string(), Value::Array(required));
    Value::Object(schema)
}

/// 动作原语 -> 函数描述（inputs_schema 缺省为无参数对象）
pub fn action_tool(primitive: &Primitive) -> ToolSpec {
    let base = primitive
        .manifest
        .inputs_schema
        .clone()
        .unwrap_or_else(|| json!({"type": "object", "properties": {}}));
    ToolSpec::new(primitive.name(), primitive.description(), with_thought_fields(&base))
}

pub fn retrieve_knowledge_tool() -> ToolSpec {
    ToolSpec::new(
        RETRIEVE_KNOWLEDGE_ACTION,
        "Search the project knowledge base and return the most relevant text chunks.",
        with_thought_fields(&json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "What to look up."}
            },
            "required": ["query"]
        })),
    )
}

/// finish：schema_choice 限定为已注册的 schema 名，pattern_references 限定为已注册的 pattern 名
pub fn finish_tool(schema_names: &[String], pattern_names: &[String]) -> ToolSpec {
    ToolSpec::new(
        FINISH_ACTION,
        "Stop gathering context and choose the output schema plus the reference patterns to include.",
        with_thought_fields(&json!({
            "type": "object",
            "properties": {
                "schema_choice": {
                    "type": "string",
                    "enum": schema_names,
                    "description": "Name of the schema the final PRP must follow."
                },
                "pattern_references": {
                    "type": "array",
                    "items": {"type": "string", "enum": pattern_names},
                    "description": "Names of patterns whose content should be included."
                }
            },
            "required": ["schema_choice", "pattern_references"]
        })),
    )
}

pub fn select_strategy_tool(strategy_names: &[String]) -> ToolSpec {
    ToolSpec::new(
        SELECT_STRATEGY_TOOL,
        "Choose the planning strategy best suited to the user's goal.",
        json!({
            "type": "object",
            "properties": {
                "strategy_name": {"type": "string", "enum": strategy_names}
            },
            "required": ["strategy_name"]
        }),
    )
}
