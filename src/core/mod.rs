//! 核心编排层：错误类型、Planner 状态机、编排循环与构建器

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod state;

pub use builder::{create_llm, load_constitution, Compilation, Compiler, CompilerBuilder};
pub use error::{ActionError, CompilerError};
pub use orchestrator::{AssembledContext, LoopLimits, Orchestrator};
pub use state::PlannerPhase;
