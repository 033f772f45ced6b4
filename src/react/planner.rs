//! Planner：策略选择与单步决策
//!
//! select_strategy 让模型从已注册策略中选一个；plan_step 让模型从 {动作原语} ∪ {retrieve_knowledge, finish}
//! 中恰好选一个函数调用，reasoning / criticism 从参数中取出放进 Thought。
//! PlanningSession 把多步规划做成显式状态机：next(history) 产出一步，feed(observation) 才能进入下一步。

use std::sync::Arc;

use serde_json::Value;

use crate::context::HistoryManager;
use crate::core::{CompilerError, PlannerPhase};
use crate::llm::{Generation, LlmClient, LlmError, StructuredCall, ToolSpec};
use crate::primitives::{PrimitiveKind, PrimitiveRegistry};
use crate::react::schema::{
    action_tool, finish_tool, retrieve_knowledge_tool, select_strategy_tool, CRITICISM_FIELD,
    REASONING_FIELD, SELECT_STRATEGY_TOOL,
};
use crate::react::types::{Action, FinishArgs, ReActStep, Thought, FINISH_ACTION, RETRIEVE_KNOWLEDGE_ACTION};

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    registry: Arc<PrimitiveRegistry>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, registry: Arc<PrimitiveRegistry>) -> Self {
        Self { llm, registry }
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 从已注册策略中选择一个；回复不是合法选项时为协议错误
    pub async fn select_strategy(&self, goal: &str, constitution: &str) -> Result<String, CompilerError> {
        let strategies = self.registry.get_all(PrimitiveKind::Strategies);
        let names: Vec<String> = strategies.iter().map(|p| p.name().to_string()).collect();
        if names.is_empty() {
            return Err(CompilerError::PlannerProtocol("no strategies are registered".to_string()));
        }
        let listing = strategies
            .iter()
            .map(|p| format!("- {}: {}", p.name(), p.description()))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "You are an expert AI engineering architect preparing to compile a Product Requirement Prompt (PRP).\n\n\
             {}## User goal\n{goal}\n\n## Available strategies\n{listing}\n\n\
             Select the single strategy that best fits the goal.",
            constitution_block(constitution)
        );

        let tools = [select_strategy_tool(&names)];
        let gen = self.generate(&prompt, &tools).await?;
        let choice = gen
            .structured_call
            .filter(|c| c.name == SELECT_STRATEGY_TOOL)
            .and_then(|c| c.arguments.get("strategy_name").and_then(Value::as_str).map(str::to_string))
            .ok_or_else(|| {
                CompilerError::PlannerProtocol(format!(
                    "strategy selection returned no valid choice: {}",
                    preview(&gen.text)
                ))
            })?;
        if !names.contains(&choice) {
            return Err(CompilerError::PlannerProtocol(format!(
                "strategy '{choice}' is not one of {names:?}"
            )));
        }
        tracing::info!(strategy = %choice, "strategy selected");
        Ok(choice)
    }

    /// 本轮可调用的函数：全部动作原语 + retrieve_knowledge + finish
    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .registry
            .get_all(PrimitiveKind::Actions)
            .into_iter()
            .filter(|p| {
                let reserved = p.name() == FINISH_ACTION || p.name() == RETRIEVE_KNOWLEDGE_ACTION;
                if reserved {
                    tracing::warn!(action = %p.name(), "action primitive shadows a built-in; ignored");
                }
                !reserved
            })
            .map(action_tool)
            .collect();
        specs.push(retrieve_knowledge_tool());
        specs.push(finish_tool(
            &self.registry.names(PrimitiveKind::Schemas),
            &self.registry.names(PrimitiveKind::Patterns),
        ));
        specs
    }

    /// 一次生成调用，产出一个带动作的步骤（尚无观察结果）
    pub async fn plan_step(
        &self,
        goal: &str,
        constitution: &str,
        strategy_content: &str,
        history: &HistoryManager,
    ) -> Result<ReActStep, CompilerError> {
        let tools = self.tool_specs();
        let prompt = self.step_prompt(goal, constitution, strategy_content, history);
        let gen = self.generate(&prompt, &tools).await?;

        let call = gen.structured_call.ok_or_else(|| {
            CompilerError::PlannerProtocol(format!(
                "response contained no structured call: {}",
                preview(&gen.text)
            ))
        })?;
        if !tools.iter().any(|t| t.name == call.name) {
            return Err(CompilerError::PlannerProtocol(format!(
                "unknown function '{}'",
                call.name
            )));
        }
        Ok(ReActStep::new(split_thought(call)))
    }

    /// 空回复与缺少调用同属协议错误；请求失败原样上抛
    async fn generate(&self, prompt: &str, tools: &[ToolSpec]) -> Result<Generation, CompilerError> {
        match self.llm.generate(prompt, Some(tools)).await {
            Err(LlmError::EmptyResponse) => Err(CompilerError::PlannerProtocol(
                "response was empty".to_string(),
            )),
            other => Ok(other?),
        }
    }

    fn step_prompt(&self, goal: &str, constitution: &str, strategy_content: &str, history: &HistoryManager) -> String {
        let schemas = describe(&self.registry, PrimitiveKind::Schemas);
        let patterns = describe(&self.registry, PrimitiveKind::Patterns);
        let history_text = if history.is_empty() {
            "(no steps yet)".to_string()
        } else {
            history.serialize()
        };
        let strategy = if strategy_content.trim().is_empty() {
            String::new()
        } else {
            format!("## Strategy\n{}\n\n", strategy_content.trim())
        };
        format!(
            "You are an expert AI engineering architect compiling a Product Requirement Prompt (PRP) \
             by gathering context step by step.\n\n\
             {}{strategy}## User goal\n{goal}\n\n\
             ## Available schemas\n{schemas}\n\n## Available patterns\n{patterns}\n\n\
             ## History\n{history_text}\n\n\
             Decide the single next action. Use `{RETRIEVE_KNOWLEDGE_ACTION}` or another action to gather \
             missing context; call `{FINISH_ACTION}` once the context is sufficient, choosing the schema and \
             the patterns to include. Always fill `{REASONING_FIELD}` and `{CRITICISM_FIELD}`.",
            constitution_block(constitution)
        )
    }

    pub fn session(&self, goal: impl Into<String>, constitution: impl Into<String>, max_steps: usize) -> PlanningSession<'_> {
        PlanningSession {
            planner: self,
            goal: goal.into(),
            constitution: constitution.into(),
            strategy_content: String::new(),
            max_steps,
            phase: PlannerPhase::SelectingStrategy,
            calls: 0,
        }
    }
}

/// 取出 reasoning / criticism，其余参数留给 Action
fn split_thought(call: StructuredCall) -> Thought {
    let StructuredCall { name, mut arguments } = call;
    let mut take = |field: &str| match arguments.remove(field) {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => {
            tracing::warn!(action = %name, field, "structured call is missing a thought field");
            String::new()
        }
    };
    let reasoning = take(REASONING_FIELD);
    let criticism = take(CRITICISM_FIELD);
    Thought {
        reasoning,
        criticism,
        next_action: Some(Action::new(name, arguments)),
    }
}

fn constitution_block(constitution: &str) -> String {
    if constitution.trim().is_empty() {
        String::new()
    } else {
        format!("## Constitution\n{}\n\n", constitution.trim())
    }
}

fn describe(registry: &PrimitiveRegistry, kind: PrimitiveKind) -> String {
    let items: Vec<String> = registry
        .get_all(kind)
        .iter()
        .map(|p| format!("- {}: {}", p.name(), p.description()))
        .collect();
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join("\n")
    }
}

fn preview(text: &str) -> String {
    let t = text.trim();
    if t.chars().count() > 200 {
        format!("{}...", t.chars().take(200).collect::<String>())
    } else {
        t.to_string()
    }
}

/// 规划会话的单次产出
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerTurn {
    /// 需要执行的动作；执行后必须 feed 观察结果
    Act(ReActStep),
    /// 模型调用了 finish
    Finish(ReActStep, FinishArgs),
    /// 步数用尽仍未 finish
    Exhausted,
}

/// 显式状态机：SelectingStrategy -> Stepping(n) <-> AwaitingObservation(n) -> Finished | Exhausted
pub struct PlanningSession<'a> {
    planner: &'a Planner,
    goal: String,
    constitution: String,
    strategy_content: String,
    max_steps: usize,
    phase: PlannerPhase,
    calls: usize,
}

impl<'a> PlanningSession<'a> {
    pub fn phase(&self) -> &PlannerPhase {
        &self.phase
    }

    /// 已发出的 plan_step 调用次数
    pub fn calls(&self) -> usize {
        self.calls
    }

    /// 确定策略内容（可为空），进入 Stepping(1)
    pub fn begin(&mut self, strategy_content: impl Into<String>) -> Result<(), CompilerError> {
        if self.phase != PlannerPhase::SelectingStrategy {
            return Err(CompilerError::PlannerProtocol(format!(
                "session already started ({:?})",
                self.phase
            )));
        }
        self.strategy_content = strategy_content.into();
        self.phase = PlannerPhase::Stepping(1);
        Ok(())
    }

    pub async fn next(&mut self, history: &HistoryManager) -> Result<PlannerTurn, CompilerError> {
        let n = match self.phase {
            PlannerPhase::Stepping(n) => n,
            PlannerPhase::Exhausted => return Ok(PlannerTurn::Exhausted),
            ref other => {
                return Err(CompilerError::PlannerProtocol(format!(
                    "next() called in phase {other:?}"
                )))
            }
        };
        if n > self.max_steps {
            self.phase = PlannerPhase::Exhausted;
            return Ok(PlannerTurn::Exhausted);
        }

        self.calls += 1;
        let step = self
            .planner
            .plan_step(&self.goal, &self.constitution, &self.strategy_content, history)
            .await?;
        let Some(action) = step.action() else {
            return Err(CompilerError::PlannerProtocol("step has no action".to_string()));
        };
        tracing::debug!(step = n, thought = %step.thought.reasoning, critique = %step.thought.criticism, action = %action, "planner step");

        if action.is_finish() {
            let args = FinishArgs::from_action(action).map_err(CompilerError::PlannerProtocol)?;
            self.phase = PlannerPhase::Finished;
            return Ok(PlannerTurn::Finish(step, args));
        }
        self.phase = PlannerPhase::AwaitingObservation(n);
        Ok(PlannerTurn::Act(step))
    }

    /// 交回上一步动作的观察结果，进入下一步
    pub fn feed(&mut self, observation: &str) -> Result<(), CompilerError> {
        let PlannerPhase::AwaitingObservation(n) = self.phase else {
            return Err(CompilerError::PlannerProtocol(format!(
                "feed() called in phase {:?}",
                self.phase
            )));
        };
        tracing::debug!(step = n, observation = %preview(observation), "observation");
        self.phase = if n >= self.max_steps {
            PlannerPhase::Exhausted
        } else {
            PlannerPhase::Stepping(n + 1)
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use serde_json::json;
    use std::fs;
    use std::path::Path;

    fn primitive(base: &Path, kind: &str, name: &str, entry: &str, content: &str, extra: &str) {
        let dir = base.join(kind).join(name).join("1.0.0");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("manifest.yml"),
            format!("name: {name}\ndescription: {name} primitive\nentrypoint: {entry}\n{extra}"),
        )
        .unwrap();
        fs::write(dir.join(entry.split(':').next().unwrap()), content).unwrap();
    }

    fn registry() -> (tempfile::TempDir, Arc<PrimitiveRegistry>) {
        let tmp = tempfile::tempdir().unwrap();
        primitive(tmp.path(), "schemas", "prp_base", "schema.json", "{}", "");
        primitive(tmp.path(), "strategies", "tdd", "strategy.md", "write tests first", "");
        primitive(tmp.path(), "strategies", "explore", "strategy.md", "look around", "");
        primitive(
            tmp.path(),
            "actions",
            "read_file",
            "read_file.py:run",
            "",
            "inputs_schema:\n  type: object\n  properties:\n    file_path: {type: string}\n  required: [file_path]\n",
        );
        let reg = Arc::new(PrimitiveRegistry::load(tmp.path()).unwrap());
        (tmp, reg)
    }

    #[tokio::test]
    async fn test_select_strategy_valid_choice() {
        let (_tmp, reg) = registry();
        let mock = Arc::new(MockLlmClient::scripted(vec![Ok(Generation::call(
            "select_strategy",
            json!({"strategy_name": "tdd"}),
        ))]));
        let planner = Planner::new(mock.clone(), reg);
        assert_eq!(planner.select_strategy("build a cli", "").await.unwrap(), "tdd");
        assert!(mock.prompts()[0].contains("explore"));
    }

    #[tokio::test]
    async fn test_select_strategy_invalid_choice_is_protocol_error() {
        let (_tmp, reg) = registry();
        let mock = Arc::new(MockLlmClient::scripted(vec![Ok(Generation::call(
            "select_strategy",
            json!({"strategy_name": "yolo"}),
        ))]));
        let planner = Planner::new(mock, reg);
        assert!(matches!(
            planner.select_strategy("goal", "").await,
            Err(CompilerError::PlannerProtocol(_))
        ));
    }

    #[tokio::test]
    async fn test_plan_step_extracts_thought_fields() {
        let (_tmp, reg) = registry();
        let mock = Arc::new(MockLlmClient::scripted(vec![Ok(Generation::call(
            "read_file",
            json!({"file_path": "README.md", "reasoning": "need overview", "criticism": "may be stale"}),
        ))]));
        let planner = Planner::new(mock, reg);
        let history = HistoryManager::new(1000, 5);
        let step = planner.plan_step("goal", "", "", &history).await.unwrap();
        assert_eq!(step.thought.reasoning, "need overview");
        assert_eq!(step.thought.criticism, "may be stale");
        let action = step.action().unwrap();
        assert_eq!(action.tool_name, "read_file");
        assert_eq!(action.arguments.len(), 1);
        assert_eq!(action.str_arg("file_path"), Some("README.md"));
        assert!(step.observation.is_none());
    }

    #[tokio::test]
    async fn test_plan_step_without_call_is_protocol_error() {
        let (_tmp, reg) = registry();
        let mock = Arc::new(MockLlmClient::scripted(vec![Ok(Generation::text("I am done"))]));
        let planner = Planner::new(mock, reg);
        let history = HistoryManager::new(1000, 5);
        assert!(matches!(
            planner.plan_step("goal", "", "", &history).await,
            Err(CompilerError::PlannerProtocol(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_reply_is_protocol_error() {
        let (_tmp, reg) = registry();
        let mock = Arc::new(MockLlmClient::scripted(vec![
            Err(LlmError::EmptyResponse),
            Err(LlmError::EmptyResponse),
            Err(LlmError::Request("connection reset".into())),
        ]));
        let planner = Planner::new(mock, reg);
        let history = HistoryManager::new(1000, 5);
        assert!(matches!(
            planner.plan_step("goal", "", "", &history).await,
            Err(CompilerError::PlannerProtocol(_))
        ));
        assert!(matches!(
            planner.select_strategy("goal", "").await,
            Err(CompilerError::PlannerProtocol(_))
        ));
        assert!(matches!(
            planner.plan_step("goal", "", "", &history).await,
            Err(CompilerError::Llm(_))
        ));
    }

    #[tokio::test]
    async fn test_tool_specs_cover_actions_and_builtins() {
        let (_tmp, reg) = registry();
        let planner = Planner::new(Arc::new(MockLlmClient::new()), reg);
        let names: Vec<String> = planner.tool_specs().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["read_file", "retrieve_knowledge", "finish"]);
    }

    #[tokio::test]
    async fn test_session_state_machine() {
        let (_tmp, reg) = registry();
        let mock = Arc::new(MockLlmClient::scripted(vec![
            Ok(Generation::call("retrieve_knowledge", json!({"query": "x", "reasoning": "r", "criticism": "c"}))),
            Ok(Generation::call(
                "finish",
                json!({"schema_choice": "prp_base", "pattern_references": [], "reasoning": "r", "criticism": "c"}),
            )),
        ]));
        let planner = Planner::new(mock, reg);
        let history = HistoryManager::new(1000, 5);
        let mut session = planner.session("goal", "", 5);

        assert!(session.next(&history).await.is_err());
        session.begin("").unwrap();

        let PlannerTurn::Act(step) = session.next(&history).await.unwrap() else {
            panic!("expected an action");
        };
        assert_eq!(step.action().unwrap().tool_name, "retrieve_knowledge");
        assert_eq!(session.phase(), &PlannerPhase::AwaitingObservation(1));
        assert!(session.next(&history).await.is_err());

        session.feed("chunk").unwrap();
        let PlannerTurn::Finish(_, args) = session.next(&history).await.unwrap() else {
            panic!("expected finish");
        };
        assert_eq!(args.schema_choice, "prp_base");
        assert_eq!(session.phase(), &PlannerPhase::Finished);
        assert_eq!(session.calls(), 2);
    }

    #[tokio::test]
    async fn test_session_exhausts_after_max_steps() {
        let (_tmp, reg) = registry();
        let planner = Planner::new(Arc::new(MockLlmClient::new()), reg);
        let history = HistoryManager::new(1000, 5);
        let mut session = planner.session("goal", "", 0);
        session.begin("").unwrap();
        assert_eq!(session.next(&history).await.unwrap(), PlannerTurn::Exhausted);
        assert_eq!(session.calls(), 0);
    }
}
