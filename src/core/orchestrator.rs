//! 编排器：驱动 Planner ⇄ ActionExecutor 的有界循环并组装最终上下文
//!
//! 运行级缓存键为 (goal, 原语指纹, 显式策略)；命中时直接返回，不调用 Planner。
//! 循环内部的错误（协议错误、原语缺失、步数用尽）在此边界转为带 [ERROR] 标记的失败结果，不向外抛出。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::Instrument;
use uuid::Uuid;

use crate::cache::{hash_key, ResultCache};
use crate::context::HistoryManager;
use crate::core::CompilerError;
use crate::llm::LlmClient;
use crate::primitives::{PrimitiveKind, PrimitiveRegistry};
use crate::react::{FinishArgs, Planner, PlannerTurn, ReActStep};
use crate::tools::{ActionExecutor, DynamicResolver};

/// 一次编排的产物；schema_choice 为空表示失败，error 中为诊断信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub schema_choice: String,
    #[serde(default)]
    pub pattern_references: Vec<String>,
    #[serde(default)]
    pub strategy: Option<String>,
    pub context: String,
    #[serde(default)]
    pub steps: Vec<ReActStep>,
    #[serde(default)]
    pub error: Option<String>,
}

impl AssembledContext {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.schema_choice.is_empty()
    }

    fn failure(err: &CompilerError, history: &HistoryManager, strategy: Option<String>) -> Self {
        let message = err.to_string();
        Self {
            schema_choice: String::new(),
            pattern_references: Vec::new(),
            strategy,
            context: format!("[ERROR] {message}\n\n{}", history.serialize()),
            steps: history.steps().to_vec(),
            error: Some(message),
        }
    }
}

/// 历史预算相关参数
#[derive(Debug, Clone, Copy)]
pub struct LoopLimits {
    pub max_steps: usize,
    pub token_limit: usize,
    pub keep_last_n: usize,
}

pub struct Orchestrator {
    planner: Planner,
    registry: Arc<PrimitiveRegistry>,
    executor: ActionExecutor,
    resolver: DynamicResolver,
    limits: LoopLimits,
    summarizer: Option<Arc<dyn LlmClient>>,
    cache: Option<Arc<ResultCache>>,
    max_age_hours: u64,
}

impl Orchestrator {
    pub fn new(
        planner: Planner,
        registry: Arc<PrimitiveRegistry>,
        executor: ActionExecutor,
        resolver: DynamicResolver,
        limits: LoopLimits,
    ) -> Self {
        Self {
            planner,
            registry,
            executor,
            resolver,
            limits,
            summarizer: None,
            cache: None,
            max_age_hours: 0,
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn LlmClient>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_cache(mut self, cache: Arc<ResultCache>, max_age_hours: u64) -> Self {
        self.cache = Some(cache);
        self.max_age_hours = max_age_hours;
        self
    }

    pub fn registry(&self) -> &PrimitiveRegistry {
        &self.registry
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.planner.token_usage()
    }

    /// 运行一次完整的上下文收集；失败以 AssembledContext::error 报告
    pub async fn run(&self, goal: &str, constitution: &str, strategy: Option<&str>) -> AssembledContext {
        let key = hash_key(&json!({
            "goal": goal,
            "fingerprint": self.registry.fingerprint(),
            "strategy": strategy,
        }));
        if let Some(hit) = self.cached(&key) {
            tracing::info!(schema = %hit.schema_choice, "run cache hit; planner not invoked");
            return hit;
        }

        let mut history = HistoryManager::new(self.limits.token_limit, self.limits.keep_last_n);
        if let Some(summarizer) = &self.summarizer {
            history = history.with_summarizer(summarizer.clone());
        }
        let mut strategy_name = strategy.map(str::to_string);

        let run_id = Uuid::new_v4();
        tracing::info!(%run_id, goal, "run started");
        let outcome = self
            .drive(goal, constitution, &mut strategy_name, &mut history)
            .instrument(tracing::info_span!("run", %run_id))
            .await;
        let result = match outcome {
            Ok(assembled) => assembled,
            Err(e) => {
                tracing::warn!(error = %e, "run failed");
                return AssembledContext::failure(&e, &history, strategy_name);
            }
        };

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set(&key, &result) {
                tracing::warn!(error = %e, "failed to cache run result");
            }
        }
        result
    }

    fn cached(&self, key: &str) -> Option<AssembledContext> {
        let cache = self.cache.as_ref()?;
        cache
            .get_as::<AssembledContext>(key, self.max_age_hours)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "run cache lookup failed");
                None
            })
            .filter(AssembledContext::is_success)
    }

    async fn drive(
        &self,
        goal: &str,
        constitution: &str,
        strategy_name: &mut Option<String>,
        history: &mut HistoryManager,
    ) -> Result<AssembledContext, CompilerError> {
        let mut session = self.planner.session(goal, constitution, self.limits.max_steps);

        if strategy_name.is_none() && self.registry.count(PrimitiveKind::Strategies) > 0 {
            *strategy_name = Some(self.planner.select_strategy(goal, constitution).await?);
        }
        let strategy_content = match strategy_name.as_deref() {
            Some(name) => {
                let raw = self.registry.get_content(PrimitiveKind::Strategies, name)?;
                self.resolver.resolve(&raw).await
            }
            None => String::new(),
        };
        tracing::info!(strategy = ?strategy_name, "strategy selected");
        session.begin(strategy_content)?;

        loop {
            match session.next(history).await? {
                PlannerTurn::Act(step) => {
                    let Some(action) = step.action().cloned() else {
                        return Err(CompilerError::PlannerProtocol("step has no action".to_string()));
                    };
                    history.append(step).await;
                    let observation = self.executor.execute(&action).await;
                    history.record_observation(observation.clone()).await;
                    session.feed(&observation)?;
                }
                PlannerTurn::Finish(step, args) => {
                    history.append(step).await;
                    tracing::info!(calls = session.calls(), schema = %args.schema_choice, "planner finished");
                    return self.assemble(args, history, strategy_name.clone()).await;
                }
                PlannerTurn::Exhausted => {
                    return Err(CompilerError::PlannerExhausted(self.limits.max_steps));
                }
            }
        }
    }

    async fn assemble(
        &self,
        args: FinishArgs,
        history: &HistoryManager,
        strategy: Option<String>,
    ) -> Result<AssembledContext, CompilerError> {
        let schema = self
            .registry
            .get_content(PrimitiveKind::Schemas, &args.schema_choice)?;
        let mut context = history.serialize();
        context.push_str(&format!("\n\nSchema: {}\n{}", args.schema_choice, schema.trim()));

        for name in &args.pattern_references {
            let raw = self.registry.get_content(PrimitiveKind::Patterns, name)?;
            let resolved = self.resolver.resolve(&raw).await;
            context.push_str(&format!("\n\nPattern: {}\n{}", name, resolved.trim()));
        }

        Ok(AssembledContext {
            schema_choice: args.schema_choice,
            pattern_references: args.pattern_references,
            strategy,
            context,
            steps: history.steps().to_vec(),
            error: None,
        })
    }

    /// 按名字读取 schema 原语并解析为 JSON
    pub fn schema(&self, name: &str) -> Result<Value, CompilerError> {
        let content = self.registry.get_content(PrimitiveKind::Schemas, name)?;
        Ok(serde_json::from_str(&content)?)
    }
}
