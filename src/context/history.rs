//! ReAct 历史：有 token 预算的追加日志
//!
//! 每次追加（或补充观察结果）后检查预算：超出且条目多于 keep_last_n 时，
//! 把较早的条目交给摘要模型压缩成一条合成步骤，保留最近 keep_last_n 条原文。
//! 摘要失败时用占位文本代替，压缩后仍超预算则截断摘要，再不行就丢弃摘要。

use std::sync::Arc;

use serde_json::Map;

use crate::context::tokens::{truncate_to_tokens, TokenEstimator};
use crate::llm::LlmClient;
use crate::react::{Action, ReActStep, Thought, SUMMARY_ACTION};

const SUMMARY_PREFIX: &str = "Summary of previous steps: ";
const SUMMARY_PLACEHOLDER: &str = "[Summary unavailable: summarization failed]";

pub struct HistoryManager {
    steps: Vec<ReActStep>,
    token_limit: usize,
    keep_last_n: usize,
    summarizer: Option<Arc<dyn LlmClient>>,
}

impl HistoryManager {
    pub fn new(token_limit: usize, keep_last_n: usize) -> Self {
        Self {
            steps: Vec::new(),
            token_limit,
            keep_last_n: keep_last_n.max(1),
            summarizer: None,
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn LlmClient>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn steps(&self) -> &[ReActStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn token_limit(&self) -> usize {
        self.token_limit
    }

    pub fn keep_last_n(&self) -> usize {
        self.keep_last_n
    }

    /// 追加一步并立即检查预算
    pub async fn append(&mut self, step: ReActStep) {
        self.steps.push(step);
        self.compact_if_needed().await;
    }

    /// 给最后一步补上观察结果并检查预算
    pub async fn record_observation(&mut self, observation: impl Into<String>) {
        match self.steps.last_mut() {
            Some(last) => last.observation = Some(observation.into()),
            None => {
                tracing::warn!("observation recorded on empty history; ignored");
                return;
            }
        }
        self.compact_if_needed().await;
    }

    pub fn serialize(&self) -> String {
        serialize_steps(&self.steps)
    }

    pub fn token_count(&self) -> usize {
        TokenEstimator::estimate(&self.serialize())
    }

    async fn compact_if_needed(&mut self) {
        let tokens = self.token_count();
        if tokens <= self.token_limit || self.steps.len() <= self.keep_last_n {
            return;
        }
        tracing::info!(
            tokens,
            limit = self.token_limit,
            steps = self.steps.len(),
            "history over budget, summarizing"
        );

        let split = self.steps.len() - self.keep_last_n;
        let recent = self.steps.split_off(split);
        let old = std::mem::take(&mut self.steps);

        let recent_tokens = TokenEstimator::estimate(&serialize_steps(&recent));
        let overhead = TokenEstimator::estimate(&summary_step("").render()) + 1;
        let room = self.token_limit.saturating_sub(recent_tokens + overhead);
        if room == 0 {
            tracing::warn!(dropped = old.len(), "recent steps alone exceed the budget; dropping older steps");
            self.steps = recent;
            return;
        }

        let summary = self.summarize(&old).await;
        self.steps = std::iter::once(summary_step(&summary)).chain(recent).collect();

        if self.token_count() > self.token_limit {
            self.steps[0] = summary_step(&truncate_to_tokens(&summary, room));
            if self.token_count() > self.token_limit {
                tracing::warn!("summary does not fit the budget; dropping it");
                self.steps.remove(0);
            }
        }
        tracing::info!(tokens = self.token_count(), steps = self.steps.len(), "history compacted");
    }

    async fn summarize(&self, old: &[ReActStep]) -> String {
        let Some(summarizer) = &self.summarizer else {
            return SUMMARY_PLACEHOLDER.to_string();
        };
        let prompt = format!(
            "Summarize the following conversation history into a concise paragraph:\n\n{}",
            serialize_steps(old)
        );
        match summarizer.generate(&prompt, None).await {
            Ok(gen) if !gen.text.trim().is_empty() => gen.text.trim().to_string(),
            Ok(_) => SUMMARY_PLACEHOLDER.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "history summarization failed; using placeholder");
                SUMMARY_PLACEHOLDER.to_string()
            }
        }
    }
}

/// 有序渲染一组步骤，步骤之间空一行
pub fn serialize_steps(steps: &[ReActStep]) -> String {
    steps
        .iter()
        .map(ReActStep::render)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn summary_step(summary: &str) -> ReActStep {
    ReActStep {
        thought: Thought {
            reasoning: SUMMARY_ACTION.to_string(),
            criticism: String::new(),
            next_action: Some(Action::new(SUMMARY_ACTION, Map::new())),
        },
        observation: Some(format!("{SUMMARY_PREFIX}{summary}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Generation, LlmError, MockLlmClient};

    fn step(i: usize, obs_len: usize) -> ReActStep {
        let mut s = ReActStep::new(Thought {
            reasoning: format!("step {i}"),
            criticism: String::new(),
            next_action: Some(Action::new("read_file", Map::new())),
        });
        s.observation = Some("x".repeat(obs_len));
        s
    }

    fn invariant(h: &HistoryManager) -> bool {
        h.token_count() <= h.token_limit() || h.len() <= h.keep_last_n()
    }

    #[tokio::test]
    async fn test_under_budget_keeps_everything() {
        let mut h = HistoryManager::new(10_000, 2);
        for i in 0..5 {
            h.append(step(i, 10)).await;
        }
        assert_eq!(h.len(), 5);
        assert!(h.serialize().starts_with("Thought: step 0"));
    }

    #[tokio::test]
    async fn test_compaction_summarizes_old_steps() {
        let mock = Arc::new(MockLlmClient::scripted(vec![Ok(Generation::text("they read files"))]));
        let mut h = HistoryManager::new(200, 2).with_summarizer(mock.clone());
        for i in 0..4 {
            h.append(step(i, 200)).await;
            assert!(invariant(&h));
        }
        assert_eq!(mock.calls(), 1);
        assert_eq!(h.len(), 3);
        let first = &h.steps()[0];
        assert_eq!(first.action().unwrap().tool_name, SUMMARY_ACTION);
        assert_eq!(
            first.observation.as_deref(),
            Some("Summary of previous steps: they read files")
        );
        assert!(h.serialize().contains("Thought: step 3"));
        assert!(mock.prompts()[0].contains("Thought: step 0"));
    }

    #[tokio::test]
    async fn test_summarizer_failure_uses_placeholder() {
        let mock = Arc::new(MockLlmClient::scripted(vec![Err(LlmError::Request("boom".into()))]));
        let mut h = HistoryManager::new(150, 1).with_summarizer(mock);
        h.append(step(0, 400)).await;
        h.append(step(1, 100)).await;
        assert!(invariant(&h));
        assert!(h.serialize().contains("Summary unavailable") || h.len() == 1);
    }

    #[tokio::test]
    async fn test_invariant_holds_when_recent_steps_are_huge() {
        let mock = Arc::new(MockLlmClient::new());
        let mut h = HistoryManager::new(50, 2).with_summarizer(mock.clone());
        for i in 0..6 {
            h.append(step(i, 1_000)).await;
            assert!(invariant(&h), "violated after step {i}");
        }
        assert_eq!(h.len(), 2);
        assert!(h.serialize().starts_with("Thought: step 4"));
        // 摘要放不下时不调用生成
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_record_observation_triggers_compaction() {
        let mut h = HistoryManager::new(120, 1);
        h.append(step(0, 100)).await;
        h.append(ReActStep::new(Thought {
            reasoning: "next".into(),
            criticism: String::new(),
            next_action: Some(Action::new("read_file", Map::new())),
        }))
        .await;
        h.record_observation("y".repeat(300)).await;
        assert!(invariant(&h));
        assert_eq!(h.steps().last().unwrap().observation.as_deref().map(str::len), Some(300));
    }
}
