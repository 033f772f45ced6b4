//! 动态内容占位符
//!
//! 策略与模式文本进入上下文前展开两类占位符：
//! - `` !`command` ``：经 ShellSandbox 执行白名单命令，替换为输出
//! - `@{relative/path}`：替换为工作区内文件内容
//!
//! 失败不报错，替换为 [ERROR] / [DISALLOWED] 观察字符串。

use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::tools::{SafeFs, ShellSandbox};

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

enum Placeholder<'a> {
    Command(&'a str),
    Include(&'a str),
}

pub struct DynamicResolver {
    shell: Arc<ShellSandbox>,
    fs: SafeFs,
}

impl DynamicResolver {
    pub fn new(shell: Arc<ShellSandbox>, fs: SafeFs) -> Self {
        Self { shell, fs }
    }

    /// 只展开原文中的占位符，替换结果不再二次展开
    pub async fn resolve(&self, text: &str) -> String {
        let re = PLACEHOLDER_RE.get_or_init(|| Regex::new(r"!`([^`]+)`|@\{([^}]+)\}").unwrap());

        // 命令需要 await：先收集位置，不跨 await 持有匹配迭代器
        let found: Vec<(usize, usize, Placeholder)> = re
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let placeholder = match (caps.get(1), caps.get(2)) {
                    (Some(cmd), _) => Placeholder::Command(cmd.as_str().trim()),
                    (None, Some(path)) => Placeholder::Include(path.as_str().trim()),
                    (None, None) => return None,
                };
                Some((whole.start(), whole.end(), placeholder))
            })
            .collect();

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for (start, end, placeholder) in found {
            out.push_str(&text[last..start]);
            let rendered = match placeholder {
                Placeholder::Command(command) => {
                    tracing::debug!(command = %command, "resolving command placeholder");
                    self.shell
                        .run(command)
                        .await
                        .unwrap_or_else(|e| e.to_observation("shell"))
                }
                Placeholder::Include(path) => self
                    .fs
                    .read_file(path)
                    .unwrap_or_else(|e| e.to_observation("read_file")),
            };
            out.push_str(&rendered);
            last = end;
        }
        out.push_str(&text[last..]);
        out
    }
}
