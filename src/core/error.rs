//! 错误类型
//!
//! CompilerError：流水线级错误（原语查找、Planner 协议、合成失败、配置等）；
//! ActionError：单个 Action 执行失败，由 ActionExecutor 转为 Observation 字符串，永不中断循环。

use std::path::PathBuf;

use thiserror::Error;

use crate::llm::LlmError;

/// 编译流水线中可能出现的错误
#[derive(Error, Debug)]
pub enum CompilerError {
    #[error("Primitive '{name}' of type '{kind}' not found")]
    NotFound { kind: String, name: String },

    #[error("Entrypoint file not found for primitive '{name}': {}", path.display())]
    MissingFile { name: String, path: PathBuf },

    #[error("Manifest error: {0}")]
    Manifest(String),

    /// LLM 没有给出合法的结构化调用，或选择了未注册的策略/工具
    #[error("Planner protocol error: {0}")]
    PlannerProtocol(String),

    #[error("Planner did not finish within {0} steps")]
    PlannerExhausted(usize),

    /// 编排阶段以失败结果结束（带诊断信息）
    #[error("Context assembly failed: {0}")]
    RunFailed(String),

    #[error("Synthesizer failed to produce a valid PRP JSON after {attempts} attempts: {last_error}")]
    SynthesisFailed { attempts: u32, last_error: String },

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Cache error: {0}")]
    Cache(#[from] rusqlite::Error),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CompilerError {
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

/// 单个 Action 执行失败的原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("action '{0}' is not registered")]
    NotRegistered(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// 命令不在白名单内；渲染为 [DISALLOWED] 观察结果，从不执行
    #[error("{0}")]
    Disallowed(String),

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("{0}")]
    Failed(String),
}

impl ActionError {
    /// 转为喂回 Planner 的观察字符串
    pub fn to_observation(&self, action_name: &str) -> String {
        match self {
            ActionError::Disallowed(msg) => format!("[DISALLOWED] {msg}"),
            other => format!("[ERROR] Failed to execute action '{action_name}': {other}"),
        }
    }
}
