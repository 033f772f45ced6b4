//! 启动时把动作原语绑定为处理器
//!
//! 按 entrypoint 的模块名匹配内置实现（read_file、list_directory、web_search、summarize_text、run_shell）；
//! 不匹配时若 entrypoint 文件存在则作为程序型动作（PluginTool）；都不满足的动作跳过并告警，
//! 之后调用它会得到 NotRegistered 观察结果。

use std::path::PathBuf;
use std::sync::Arc;

use crate::llm::LlmClient;
use crate::primitives::{Primitive, PrimitiveKind, PrimitiveRegistry};
use crate::react::{FINISH_ACTION, RETRIEVE_KNOWLEDGE_ACTION};
use crate::tools::{
    ListDirectoryTool, PluginTool, ReadFileTool, ShellSandbox, ShellTool, SummarizeTool, Tool, ToolRegistry,
    WebSearchTool,
};

/// 绑定内置工具所需的运行环境
pub struct ToolContext {
    pub workspace_root: PathBuf,
    pub shell: Arc<ShellSandbox>,
    pub timeout_secs: u64,
    pub search_timeout_secs: u64,
    pub search_max_results: usize,
    pub summarizer: Option<Arc<dyn LlmClient>>,
}

pub fn bind_actions(registry: &PrimitiveRegistry, ctx: &ToolContext) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    for primitive in registry.get_all(PrimitiveKind::Actions) {
        let name = primitive.name();
        if name == FINISH_ACTION || name == RETRIEVE_KNOWLEDGE_ACTION {
            continue;
        }
        match bind(primitive, ctx) {
            Some(tool) => {
                tracing::debug!(action = %name, handler = %tool.name(), description = %tool.description(), "action bound");
                tools.register_as(name, tool);
            }
            None => {
                tracing::warn!(action = %name, entrypoint = %primitive.manifest.entrypoint, "no handler for action; skipping");
            }
        }
    }
    tracing::info!(count = tools.len(), "actions bound");
    tools
}

fn bind(primitive: &Primitive, ctx: &ToolContext) -> Option<Arc<dyn Tool>> {
    let tool: Arc<dyn Tool> = match primitive.entrypoint_module() {
        "read_file" => Arc::new(ReadFileTool::new(&ctx.workspace_root)),
        "list_directory" | "list_dir" => Arc::new(ListDirectoryTool::new(&ctx.workspace_root)),
        "web_search" | "search" => Arc::new(WebSearchTool::new(ctx.search_timeout_secs, ctx.search_max_results)),
        "summarize_text" | "summarize" => Arc::new(SummarizeTool::new(ctx.summarizer.clone()?)),
        "run_shell" | "shell" | "execute_shell" => {
            let allowed = &primitive.manifest.allowed_shell_commands;
            let sandbox = if allowed.is_empty() {
                ctx.shell.clone()
            } else {
                Arc::new(ctx.shell.with_allowed(allowed.clone()))
            };
            Arc::new(ShellTool::new(sandbox))
        }
        _ => {
            let program = primitive.entrypoint_path();
            if !program.is_file() {
                return None;
            }
            Arc::new(PluginTool::new(
                primitive.name(),
                primitive.description(),
                program,
                primitive.manifest.args.clone(),
                &ctx.workspace_root,
                ctx.timeout_secs,
            ))
        }
    };
    Some(tool)
}
