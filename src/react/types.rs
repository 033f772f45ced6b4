//! ReAct 数据模型：Thought / Action / ReActStep / FinishArgs

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 终止规划循环的哨兵动作
pub const FINISH_ACTION: &str = "finish";
/// 内置知识检索动作，不经过原语解析
pub const RETRIEVE_KNOWLEDGE_ACTION: &str = "retrieve_knowledge";
/// 历史压缩生成的合成步骤所用的动作名
pub const SUMMARY_ACTION: &str = "summary";

/// 一次具名能力调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl Action {
    pub fn new(tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
        }
    }

    pub fn is_finish(&self) -> bool {
        self.tool_name == FINISH_ACTION
    }

    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = serde_json::to_string(&self.arguments).unwrap_or_else(|_| "{}".to_string());
        write!(f, "{}({})", self.tool_name, args)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    pub reasoning: String,
    pub criticism: String,
    /// 仅内部终态为 None
    pub next_action: Option<Action>,
}

/// 思考 + 观察结果（执行前为 None）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReActStep {
    pub thought: Thought,
    pub observation: Option<String>,
}

impl ReActStep {
    pub fn new(thought: Thought) -> Self {
        Self {
            thought,
            observation: None,
        }
    }

    pub fn action(&self) -> Option<&Action> {
        self.thought.next_action.as_ref()
    }

    /// 渲染为文本记录：Thought / Critique / Action / Observation
    pub fn render(&self) -> String {
        let mut lines = vec![format!("Thought: {}", self.thought.reasoning)];
        if !self.thought.criticism.is_empty() {
            lines.push(format!("Critique: {}", self.thought.criticism));
        }
        if let Some(action) = &self.thought.next_action {
            lines.push(format!("Action: {action}"));
        }
        if let Some(obs) = &self.observation {
            lines.push(format!("Observation: {obs}"));
        }
        lines.join("\n")
    }
}

/// finish 动作携带的最终路由参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishArgs {
    pub schema_choice: String,
    #[serde(default)]
    pub pattern_references: Vec<String>,
}

impl FinishArgs {
    pub fn from_action(action: &Action) -> Result<Self, String> {
        serde_json::from_value(Value::Object(action.arguments.clone()))
            .map_err(|e| format!("invalid finish arguments: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_render_step() {
        let mut step = ReActStep::new(Thought {
            reasoning: "need context".into(),
            criticism: "might be broad".into(),
            next_action: Some(Action::new("retrieve_knowledge", args(json!({"query": "x"})))),
        });
        step.observation = Some("chunk".into());
        assert_eq!(
            step.render(),
            "Thought: need context\nCritique: might be broad\nAction: retrieve_knowledge({\"query\":\"x\"})\nObservation: chunk"
        );
    }

    #[test]
    fn test_finish_args() {
        let action = Action::new(
            FINISH_ACTION,
            args(json!({"schema_choice": "prp", "pattern_references": ["a", "b"]})),
        );
        assert!(action.is_finish());
        let f = FinishArgs::from_action(&action).unwrap();
        assert_eq!(f.schema_choice, "prp");
        assert_eq!(f.pattern_references, vec!["a", "b"]);

        let no_patterns = Action::new(FINISH_ACTION, args(json!({"schema_choice": "prp"})));
        assert!(FinishArgs::from_action(&no_patterns).unwrap().pattern_references.is_empty());

        let bad = Action::new(FINISH_ACTION, args(json!({"pattern_references": []})));
        assert!(FinishArgs::from_action(&bad).is_err());
    }
}
