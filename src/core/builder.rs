//! 编译器构建器：从 AppConfig 组装注册表、缓存、知识库、动作、Planner、编排器与 Synthesizer
//!
//! 配置类错误（原语目录不存在、非 mock 后端缺少 API Key）在这里直接失败，循环开始前暴露。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::cache::ResultCache;
use crate::config::AppConfig;
use crate::core::orchestrator::{AssembledContext, LoopLimits, Orchestrator};
use crate::core::CompilerError;
use crate::knowledge::KnowledgeStore;
use crate::llm::{create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient};
use crate::primitives::PrimitiveRegistry;
use crate::react::Planner;
use crate::synthesizer::Synthesizer;
use crate::tools::{bind_actions, ActionExecutor, DynamicResolver, SafeFs, ShellSandbox, ToolContext};

const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// 根据 provider 创建生成后端；model 为 None 时用各后端默认模型
pub fn create_llm(cfg: &AppConfig, model: Option<&str>) -> Result<Arc<dyn LlmClient>, CompilerError> {
    let provider = cfg.llm.provider.to_lowercase();
    let model = model.or(cfg.llm.model.as_deref());
    match provider.as_str() {
        "mock" => {
            tracing::warn!("using mock LLM");
            Ok(Arc::new(MockLlmClient::new()))
        }
        "deepseek" => {
            let key = api_key("DEEPSEEK_API_KEY")?;
            tracing::info!(model = ?model, "using DeepSeek LLM");
            Ok(Arc::new(create_deepseek_client(model, &key)))
        }
        "openai" => {
            let key = api_key("OPENAI_API_KEY")?;
            let model = model.unwrap_or(DEFAULT_OPENAI_MODEL);
            tracing::info!(model, "using OpenAI-compatible LLM");
            Ok(Arc::new(OpenAiClient::new(cfg.llm.base_url.as_deref(), model, &key)))
        }
        other => Err(CompilerError::ConfigError(format!(
            "unknown llm provider '{other}' (expected openai, deepseek or mock)"
        ))),
    }
}

fn api_key(var: &str) -> Result<String, CompilerError> {
    std::env::var(var)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| CompilerError::ConfigError(format!("{var} is not set")))
}

/// 读取项目宪章；文件不存在时为空
pub fn load_constitution(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            tracing::info!(path = %path.display(), "constitution loaded");
            text
        }
        Err(_) => {
            tracing::debug!(path = %path.display(), "no constitution file");
            String::new()
        }
    }
}

pub struct CompilerBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    summarizer: Option<Arc<dyn LlmClient>>,
    primitives_path: Option<PathBuf>,
    constitution: Option<String>,
}

impl CompilerBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            summarizer: None,
            primitives_path: None,
            constitution: None,
        }
    }

    /// 指定生成后端（测试中注入 MockLlmClient）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// 历史压缩与 summarize_text 使用的后端；缺省与主后端相同
    pub fn with_summarizer(mut self, summarizer: Arc<dyn LlmClient>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// 覆盖配置中的原语目录（命令行 --primitives-path）
    pub fn with_primitives_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.primitives_path = Some(path.into());
        self
    }

    pub fn with_constitution(mut self, constitution: impl Into<String>) -> Self {
        self.constitution = Some(constitution.into());
        self
    }

    pub fn build(self) -> Result<Compiler, CompilerError> {
        let cfg = self.config;
        let workspace = cfg.workspace_root();
        let primitives_path = self
            .primitives_path
            .unwrap_or_else(|| cfg.app.primitives_path.clone());
        let registry = Arc::new(PrimitiveRegistry::load(&primitives_path)?);

        let llm = match self.llm {
            Some(llm) => llm,
            None => create_llm(&cfg, None)?,
        };
        let summarizer = match (self.summarizer, cfg.llm.summary_model.as_deref()) {
            (Some(s), _) => s,
            (None, Some(model)) => create_llm(&cfg, Some(model))?,
            (None, None) => llm.clone(),
        };
        let constitution = self
            .constitution
            .unwrap_or_else(|| load_constitution(&cfg.app.constitution_path));

        let cache = if cfg.cache.enabled {
            Some(Arc::new(ResultCache::open(&cfg.cache.path)?))
        } else {
            None
        };

        let shell = Arc::new(ShellSandbox::new(
            cfg.tools.shell.allowed_commands.clone(),
            cfg.tools.tool_timeout_secs,
            &workspace,
        ));
        let tool_ctx = ToolContext {
            workspace_root: workspace.clone(),
            shell: shell.clone(),
            timeout_secs: cfg.tools.tool_timeout_secs,
            search_timeout_secs: cfg.tools.search.timeout_secs,
            search_max_results: cfg.tools.search.max_results,
            summarizer: Some(summarizer.clone()),
        };
        let tools = bind_actions(&registry, &tool_ctx);
        let knowledge = Arc::new(KnowledgeStore::build(&registry));

        let mut executor = ActionExecutor::new(tools, knowledge, cfg.tools.tool_timeout_secs)
            .with_top_k(cfg.knowledge.top_k);
        if let Some(cache) = &cache {
            executor = executor.with_cache(cache.clone(), cfg.cache.max_age_hours);
        }

        let limits = LoopLimits {
            max_steps: cfg.planner.max_steps,
            token_limit: cfg.planner.token_limit,
            keep_last_n: cfg.keep_last_n(),
        };
        let mut orchestrator = Orchestrator::new(
            Planner::new(llm.clone(), registry.clone()),
            registry,
            executor,
            DynamicResolver::new(shell, SafeFs::new(&workspace)),
            limits,
        )
        .with_summarizer(summarizer);
        if let Some(cache) = cache {
            orchestrator = orchestrator.with_cache(cache, cfg.cache.max_age_hours);
        }

        Ok(Compiler {
            orchestrator,
            synthesizer: Synthesizer::new(llm),
            constitution,
            max_retries: cfg.synthesizer.max_retries,
        })
    }
}

/// 完整流水线：上下文收集 + 合成
pub struct Compiler {
    orchestrator: Orchestrator,
    synthesizer: Synthesizer,
    constitution: String,
    max_retries: u32,
}

/// compile 的产物
#[derive(Debug, Clone)]
pub struct Compilation {
    pub plan: AssembledContext,
    pub prp: Value,
}

impl Compiler {
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn constitution(&self) -> &str {
        &self.constitution
    }

    pub async fn plan(&self, goal: &str, strategy: Option<&str>) -> AssembledContext {
        self.orchestrator.run(goal, &self.constitution, strategy).await
    }

    /// 对成功的编排结果按所选 schema 合成最终 JSON
    pub async fn synthesize(&self, plan: &AssembledContext) -> Result<Value, CompilerError> {
        if let Some(error) = &plan.error {
            return Err(CompilerError::RunFailed(error.clone()));
        }
        let schema = self.orchestrator.schema(&plan.schema_choice)?;
        self.synthesizer
            .synthesize(&schema, &plan.context, &self.constitution, self.max_retries)
            .await
    }

    pub async fn compile(&self, goal: &str, strategy: Option<&str>) -> Result<Compilation, CompilerError> {
        let plan = self.plan(goal, strategy).await;
        let prp = self.synthesize(&plan).await?;
        Ok(Compilation { plan, prp })
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.orchestrator.token_usage()
    }
}
