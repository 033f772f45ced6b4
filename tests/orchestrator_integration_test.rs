//! 编排与合成集成测试（Mock LLM + 临时原语目录）

use std::fs;
use std::path::Path;
use std::sync::Arc;

use prp_compiler::config::AppConfig;
use prp_compiler::core::{Compiler, CompilerBuilder, CompilerError};
use prp_compiler::llm::{Generation, LlmError, MockLlmClient};
use serde_json::json;
use tempfile::TempDir;

const TEST_SCHEMA: &str = r#"{"type":"object","properties":{"goal":{"type":"string"}},"required":["goal"]}"#;

fn primitive(base: &Path, kind: &str, name: &str, entry: &str, content: &str) {
    let dir = base.join(kind).join(name).join("1.0.0");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("manifest.yml"),
        format!("name: {name}\ndescription: {name} primitive\nentrypoint: {entry}\n"),
    )
    .unwrap();
    if !content.is_empty() {
        fs::write(dir.join(entry.split(':').next().unwrap()), content).unwrap();
    }
}

/// 工作区 = 临时目录；原语位于 <tmp>/agent_primitives
fn workspace() -> TempDir {
    let tmp = tempfile::tempdir().unwrap();
    let base = tmp.path().join("agent_primitives");
    primitive(&base, "schemas", "test_schema", "schema.json", TEST_SCHEMA);
    primitive(
        &base,
        "knowledge",
        "caching",
        "caching.md",
        "# Caching\nSQLite caching keeps results for a configurable freshness window.\n",
    );
    primitive(&base, "actions", "read_file", "read_file.py:run", "");
    primitive(&base, "patterns", "cleanup", "pattern.md", "Before starting: !`rm -rf scratch`");
    tmp
}

fn config(tmp: &TempDir, max_steps: usize) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.llm.provider = "mock".to_string();
    cfg.app.workspace_root = Some(tmp.path().to_path_buf());
    cfg.app.primitives_path = tmp.path().join("agent_primitives");
    cfg.cache.path = tmp.path().join("cache.sqlite");
    cfg.planner.max_steps = max_steps;
    cfg
}

fn compiler(tmp: &TempDir, max_steps: usize, mock: &Arc<MockLlmClient>) -> Compiler {
    CompilerBuilder::new(config(tmp, max_steps))
        .with_llm(mock.clone())
        .with_constitution("")
        .build()
        .unwrap()
}

fn call(name: &str, mut args: serde_json::Value) -> Result<Generation, LlmError> {
    args["reasoning"] = json!(format!("calling {name}"));
    args["criticism"] = json!("none");
    Ok(Generation::call(name, args))
}

fn finish(patterns: &[&str]) -> Result<Generation, LlmError> {
    call(
        "finish",
        json!({"schema_choice": "test_schema", "pattern_references": patterns}),
    )
}

#[tokio::test]
async fn test_retrieve_then_finish() {
    let tmp = workspace();
    let mock = Arc::new(MockLlmClient::scripted(vec![
        call("retrieve_knowledge", json!({"query": "sqlite caching"})),
        finish(&[]),
    ]));
    let compiler = compiler(&tmp, 10, &mock);

    let plan = compiler.plan("add a cache", None).await;
    assert!(plan.is_success(), "{:?}", plan.error);
    assert_eq!(plan.schema_choice, "test_schema");
    assert!(plan.context.contains("Observation:"));
    assert!(plan.context.contains("freshness window"));
    assert!(plan.context.contains("Schema: test_schema"));
    assert_eq!(plan.steps.len(), 2);
    assert_eq!(plan.steps[0].thought.reasoning, "calling retrieve_knowledge");
    assert_eq!(mock.calls(), 2);
}

#[tokio::test]
async fn test_second_run_is_served_from_cache() {
    let tmp = workspace();
    let mock = Arc::new(MockLlmClient::scripted(vec![
        call("retrieve_knowledge", json!({"query": "sqlite caching"})),
        finish(&[]),
    ]));
    let compiler = compiler(&tmp, 10, &mock);

    let first = compiler.plan("add a cache", None).await;
    let second = compiler.plan("add a cache", None).await;
    assert_eq!(first, second);
    assert_eq!(mock.calls(), 2);
}

#[tokio::test]
async fn test_exhaustion_reports_error_context() {
    let tmp = workspace();
    let script = (0..5)
        .map(|i| call("retrieve_knowledge", json!({"query": format!("caching {i}")})))
        .collect();
    let mock = Arc::new(MockLlmClient::scripted(script));
    let compiler = compiler(&tmp, 3, &mock);

    let plan = compiler.plan("never finishes", None).await;
    assert!(!plan.is_success());
    assert_eq!(plan.schema_choice, "");
    assert!(plan.context.starts_with("[ERROR]"));
    assert!(plan.error.as_deref().unwrap_or_default().contains("3 steps"));
    assert!(mock.calls() <= 3);

    let err = compiler.synthesize(&plan).await.unwrap_err();
    assert!(matches!(err, CompilerError::RunFailed(_)));
}

#[tokio::test]
async fn test_failed_action_becomes_observation() {
    let tmp = workspace();
    let mock = Arc::new(MockLlmClient::scripted(vec![
        call("read_file", json!({"file_path": "does/not/exist.rs"})),
        finish(&[]),
    ]));
    let compiler = compiler(&tmp, 10, &mock);

    let plan = compiler.plan("read a missing file", None).await;
    assert!(plan.is_success(), "{:?}", plan.error);
    let observation = plan.steps[0].observation.as_deref().unwrap();
    assert!(observation.starts_with("[ERROR] Failed to execute action 'read_file'"));
}

#[tokio::test]
async fn test_disallowed_placeholder_in_pattern() {
    let tmp = workspace();
    fs::create_dir(tmp.path().join("scratch")).unwrap();
    let mock = Arc::new(MockLlmClient::scripted(vec![finish(&["cleanup"])]));
    let compiler = compiler(&tmp, 10, &mock);

    let plan = compiler.plan("clean up", None).await;
    assert!(plan.is_success(), "{:?}", plan.error);
    assert!(plan.context.contains("Pattern: cleanup"));
    assert!(plan.context.contains("[DISALLOWED]"));
    assert!(tmp.path().join("scratch").is_dir());
}

#[tokio::test]
async fn test_unknown_schema_choice_is_error_context() {
    let tmp = workspace();
    let mock = Arc::new(MockLlmClient::scripted(vec![call(
        "finish",
        json!({"schema_choice": "missing", "pattern_references": []}),
    )]));
    let compiler = compiler(&tmp, 10, &mock);

    let plan = compiler.plan("pick a bad schema", None).await;
    assert!(plan.context.starts_with("[ERROR]"));
    assert!(plan.error.unwrap().contains("missing"));
}

#[tokio::test]
async fn test_strategy_selection_then_compile() {
    let tmp = workspace();
    let base = tmp.path().join("agent_primitives");
    primitive(&base, "strategies", "quick", "strategy.md", "Finish right away.");
    primitive(&base, "strategies", "deep", "strategy.md", "Explore everything.");

    let mock = Arc::new(MockLlmClient::scripted(vec![
        call("select_strategy", json!({"strategy_name": "quick"})),
        finish(&[]),
        Ok(Generation::text("```json\n{\"goal\": \"ship it\"}\n```")),
    ]));
    let compiler = compiler(&tmp, 10, &mock);

    let out = compiler.compile("ship it", None).await.unwrap();
    assert_eq!(out.plan.strategy.as_deref(), Some("quick"));
    assert_eq!(out.prp, json!({"goal": "ship it"}));
    assert!(mock.prompts()[1].contains("Finish right away."));
    assert_eq!(mock.calls(), 3);
}

#[tokio::test]
async fn test_invalid_strategy_choice_is_reported() {
    let tmp = workspace();
    let base = tmp.path().join("agent_primitives");
    primitive(&base, "strategies", "quick", "strategy.md", "Finish right away.");

    let mock = Arc::new(MockLlmClient::scripted(vec![call(
        "select_strategy",
        json!({"strategy_name": "imaginary"}),
    )]));
    let compiler = compiler(&tmp, 10, &mock);

    let plan = compiler.plan("anything", None).await;
    assert!(!plan.is_success());
    assert!(plan.error.unwrap().contains("Planner protocol error"));
    assert_eq!(mock.calls(), 1);
}
