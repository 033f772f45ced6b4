//! 编译器配置：从 config/default.toml、--config 文件与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `PRP__*` 覆盖（双下划线表示嵌套，如 `PRP__PLANNER__MAX_STEPS=8`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub planner: PlannerSection,
    pub synthesizer: SynthesizerSection,
    pub cache: CacheSection,
    pub knowledge: KnowledgeSection,
    pub tools: ToolsSection,
}

/// [app] 段：原语目录、工作区根、项目宪章
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_primitives_path")]
    pub primitives_path: PathBuf,
    /// 文件类工具与 @{...} 引用的沙箱根，未设置时用当前目录
    pub workspace_root: Option<PathBuf>,
    #[serde(default = "default_constitution_path")]
    pub constitution_path: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            primitives_path: default_primitives_path(),
            workspace_root: None,
            constitution_path: default_constitution_path(),
        }
    }
}

fn default_primitives_path() -> PathBuf {
    PathBuf::from("agent_primitives")
}

fn default_constitution_path() -> PathBuf {
    PathBuf::from("CLAUDE.md")
}

/// [llm] 段：后端选择
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// openai / deepseek / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// 历史摘要与 summarize_text 使用的模型，未设置时与 model 相同
    pub summary_model: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            summary_model: None,
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

/// [planner] 段：步数上限与历史预算
#[derive(Debug, Clone, Deserialize)]
pub struct PlannerSection {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_token_limit")]
    pub token_limit: usize,
    #[serde(default = "default_keep_last_n")]
    pub keep_last_n: usize,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            token_limit: default_token_limit(),
            keep_last_n: default_keep_last_n(),
        }
    }
}

fn default_max_steps() -> usize {
    10
}

fn default_token_limit() -> usize {
    80_000
}

fn default_keep_last_n() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct SynthesizerSection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for SynthesizerSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

/// [cache] 段：SQLite 结果缓存
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_cache_path(),
            max_age_hours: default_max_age_hours(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(".prp_cache.sqlite")
}

fn default_max_age_hours() -> u64 {
    24
}

#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgeSection {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for KnowledgeSection {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

/// [tools] 段：工具超时、Shell 白名单、Search 参数
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub shell: ShellSection,
    #[serde(default)]
    pub search: SearchSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            shell: ShellSection::default(),
            search: SearchSection::default(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// [tools.shell] 段：允许执行的命令名（仅程序名，如 ls、grep、git）
#[derive(Debug, Clone, Deserialize)]
pub struct ShellSection {
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            allowed_commands: default_allowed_commands(),
        }
    }
}

fn default_allowed_commands() -> Vec<String> {
    ["ls", "cat", "head", "tail", "wc", "grep", "find", "git", "echo", "tree"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// [tools.search] 段：web_search 超时与默认结果数
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_search_timeout_secs(),
            max_results: default_max_results(),
        }
    }
}

fn default_search_timeout_secs() -> u64 {
    15
}

fn default_max_results() -> usize {
    5
}

impl AppConfig {
    pub fn workspace_root(&self) -> PathBuf {
        self.app
            .workspace_root
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// keep_last_n 至少为 1
    pub fn keep_last_n(&self) -> usize {
        self.planner.keep_last_n.max(1)
    }
}

/// 从 config 目录加载配置，环境变量 PRP__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path，则追加该文件（显式指定的文件必须存在）
/// 3. 最后叠加环境变量 PRP__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("PRP")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
