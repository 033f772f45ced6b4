//! 动作层：工具注册表、执行器、内置动作与占位符展开

pub mod dynamic;
pub mod executor;
pub mod filesystem;
pub mod loader;
pub mod plugin;
pub mod registry;
pub mod search;
pub mod shell;
pub mod summarize;

pub use dynamic::DynamicResolver;
pub use executor::ActionExecutor;
pub use filesystem::{ListDirectoryTool, ReadFileTool, SafeFs};
pub use loader::{bind_actions, ToolContext};
pub use plugin::PluginTool;
pub use registry::{required_str, Tool, ToolRegistry};
pub use search::WebSearchTool;
pub use shell::{ShellSandbox, ShellTool};
pub use summarize::SummarizeTool;
