//! PRP Compiler - 把自然语言目标编译为结构化的 Product Requirement Prompt
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、Planner 状态机、编排循环与构建器
//! - **llm**: 生成后端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **primitives**: 版本化原语的发现与解析
//! - **cache**: SQLite 结果缓存
//! - **knowledge**: 知识原语索引与检索
//! - **context**: token 估算与有界历史
//! - **react**: Thought / Action 模型、函数 Schema、Planner
//! - **tools**: 动作执行器、内置动作与占位符展开
//! - **synthesizer**: 校验与重试的最终合成

pub mod cache;
pub mod config;
pub mod context;
pub mod core;
pub mod knowledge;
pub mod llm;
pub mod observability;
pub mod primitives;
pub mod react;
pub mod synthesizer;
pub mod tools;
