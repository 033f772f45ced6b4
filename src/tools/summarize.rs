//! summarize_text 动作：调用生成模型把长文本压成一段

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::ActionError;
use crate::llm::LlmClient;
use crate::tools::registry::{required_str, Tool};

pub struct SummarizeTool {
    llm: Arc<dyn LlmClient>,
}

impl SummarizeTool {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Tool for SummarizeTool {
    fn name(&self) -> &str {
        "summarize_text"
    }

    fn description(&self) -> &str {
        "Summarize text into a concise paragraph. Args: {\"text\": \"...\"}"
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<String, ActionError> {
        let text = required_str(args, "text")?;
        let prompt = format!("Summarize the following text in a concise paragraph:\n\n{text}");
        let gen = self
            .llm
            .generate(&prompt, None)
            .await
            .map_err(|e| ActionError::Failed(format!("summarization failed: {e}")))?;
        Ok(gen.text.trim().to_string())
    }
}
