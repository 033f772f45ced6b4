//! Synthesizer：按 schema 生成最终 PRP JSON，校验失败时带着错误重试
//!
//! 每次尝试：生成 -> 抽取 JSON 块 -> 解析 -> jsonschema 校验。失败则把错误与原始输出追加到提示中，
//! 最多 max_retries 次；全部失败返回 SynthesisFailed。

use std::sync::Arc;

use serde_json::Value;

use crate::core::CompilerError;
use crate::llm::{extract_json_block, LlmClient, LlmError};

pub struct Synthesizer {
    llm: Arc<dyn LlmClient>,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn synthesize(
        &self,
        schema: &Value,
        context: &str,
        constitution: &str,
        max_retries: u32,
    ) -> Result<Value, CompilerError> {
        let validator = jsonschema::validator_for(schema)
            .map_err(|e| CompilerError::Manifest(format!("invalid schema: {e}")))?;
        let schema_text = serde_json::to_string_pretty(schema)?;
        let base_prompt = build_prompt(&schema_text, context, constitution);

        let mut prompt = base_prompt.clone();
        let mut last_error = String::from("no attempts were made");
        for attempt in 1..=max_retries {
            // 空回复算一次失败的尝试
            let raw = match self.llm.generate(&prompt, None).await {
                Ok(generation) => generation.text,
                Err(LlmError::EmptyResponse) => String::new(),
                Err(e) => return Err(e.into()),
            };
            match parse_and_validate(&raw, &validator) {
                Ok(value) => {
                    tracing::info!(attempt, "synthesis succeeded");
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!(attempt, max_retries, error = %e, "synthesis attempt failed");
                    prompt = format!(
                        "{base_prompt}\n\nPREVIOUS ATTEMPT FAILED\nError: {e}\nYour previous output was:\n---\n{raw}\n---\n\
                         Fix the error and output only the corrected JSON object."
                    );
                    last_error = e;
                }
            }
        }
        Err(CompilerError::SynthesisFailed {
            attempts: max_retries,
            last_error,
        })
    }
}

fn build_prompt(schema_text: &str, context: &str, constitution: &str) -> String {
    let constitution = if constitution.trim().is_empty() {
        String::new()
    } else {
        format!("**Constitution:**\n---\n{}\n---\n\n", constitution.trim())
    };
    format!(
        "You are an expert prompt engineer. Produce a complete and detailed Product Requirement Prompt (PRP).\n\n\
         Output a single JSON object that conforms exactly to the JSON Schema below. \
         Fill every field with specific details derived from the context and the user's goal. \
         Do not output anything except the JSON object.\n\n\
         {constitution}**JSON Schema:**\n---\n{schema_text}\n---\n\n\
         **Assembled Context:**\n---\n{context}\n---"
    )
}

fn parse_and_validate(raw: &str, validator: &jsonschema::Validator) -> Result<Value, String> {
    let block = extract_json_block(raw).ok_or_else(|| "no JSON object found in output".to_string())?;
    let value: Value = serde_json::from_str(block).map_err(|e| format!("invalid JSON: {e}"))?;
    let errors: Vec<String> = validator
        .iter_errors(&value)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{path}: {e}")
            }
        })
        .collect();
    if errors.is_empty() {
        Ok(value)
    } else {
        Err(errors.join("; "))
    }
}
