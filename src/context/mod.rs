//! 上下文管理：token 估算与 ReAct 历史

pub mod history;
pub mod tokens;

pub use history::{serialize_steps, HistoryManager};
pub use tokens::{truncate_to_tokens, TokenEstimator};
