//! 工具注册表
//!
//! 每个动作原语在启动时绑定到一个实现 Tool trait 的处理器，按动作名注册与查找；
//! ActionExecutor 在调用时加超时、缓存与审计。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::ActionError;

/// 工具 trait：名称、描述、异步执行（参数为 JSON 对象）
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn execute(&self, args: &Map<String, Value>) -> Result<String, ActionError>;
}

/// 取必填字符串参数
pub fn required_str<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, ActionError> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ActionError::InvalidArguments(format!("missing string argument '{key}'")))
}

/// 按动作名存储 Arc<dyn Tool>
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以工具自身名称注册
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// 以动作原语名注册（名称可与工具自身名称不同）
    pub fn register_as(&mut self, action_name: impl Into<String>, tool: Arc<dyn Tool>) {
        self.tools.insert(action_name.into(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
