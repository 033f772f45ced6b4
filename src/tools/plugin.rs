//! 程序型动作：清单 entrypoint 指向原语目录下的可执行文件，按 args 模板调用
//!
//! 参数模板中 {{workspace}} 替换为沙箱根路径，{{key}} 从动作参数中取 key；
//! 执行时无 shell，直接 exec program + substituted args，带超时；非零退出码视为失败。

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::process::Command;

use crate::core::ActionError;
use crate::tools::registry::Tool;

pub struct PluginTool {
    name: String,
    description: String,
    program: PathBuf,
    args_template: Vec<String>,
    workspace: PathBuf,
    timeout_secs: u64,
}

impl PluginTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        program: impl Into<PathBuf>,
        args_template: Vec<String>,
        workspace: &Path,
        timeout_secs: u64,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            program: program.into(),
            args_template,
            workspace: workspace.to_path_buf(),
            timeout_secs,
        }
    }

    /// 替换模板中的 {{workspace}} 和 {{key}}
    fn substitute(&self, args: &Map<String, Value>) -> Vec<String> {
        let workspace = self.workspace.to_string_lossy();
        self.args_template
            .iter()
            .map(|tpl| {
                let mut s = tpl.replace("{{workspace}}", &workspace);
                for (k, v) in args {
                    let val = match v {
                        Value::String(x) => x.clone(),
                        other => other.to_string(),
                    };
                    s = s.replace(&format!("{{{{{k}}}}}"), &val);
                }
                s
            })
            .collect()
    }
}

#[async_trait]
impl Tool for PluginTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<String, ActionError> {
        let argv = self.substitute(args);
        tracing::info!(tool = %self.name, program = %self.program.display(), "plugin invoke");
        let child = Command::new(&self.program)
            .args(&argv)
            .current_dir(&self.workspace)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ActionError::Failed(format!("plugin spawn failed: {e}")))?;
        let output = tokio::time::timeout(Duration::from_secs(self.timeout_secs), child.wait_with_output())
            .await
            .map_err(|_| ActionError::Timeout(self.timeout_secs))?
            .map_err(|e| ActionError::Failed(format!("plugin wait failed: {e}")))?;
        if !output.status.success() {
            return Err(ActionError::Failed(format!(
                "exit {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
