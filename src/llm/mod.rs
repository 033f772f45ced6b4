//! LLM 层：生成步骤抽象与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod deepseek;
pub mod message;
pub mod mock;
pub mod openai;
pub mod structured;
pub mod traits;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT};
pub use message::{Message, Role};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use structured::{extract_json_block, parse_structured_call};
pub use traits::{Generation, LlmClient, LlmError, StructuredCall, ToolSpec};
