//! 认知层：ReAct 数据模型、规划函数 Schema、Planner 与规划会话

pub mod planner;
pub mod schema;
pub mod types;

pub use planner::{Planner, PlannerTurn, PlanningSession};
pub use schema::with_thought_fields;
pub use types::{
    Action, FinishArgs, ReActStep, Thought, FINISH_ACTION, RETRIEVE_KNOWLEDGE_ACTION, SUMMARY_ACTION,
};
