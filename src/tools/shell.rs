//! Shell 沙箱：白名单命令，禁止危险操作
//!
//! 命令先做危险子串检查，再用 shell-words 拆分，程序名（去掉路径）必须在白名单内，git / find 另有参数规则；
//! 通过检查后不经 sh，直接 exec 程序 + 参数，带硬超时，超时即 kill。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::process::Command;

use crate::core::ActionError;
use crate::tools::registry::{required_str, Tool};

/// 禁止的子串（即使程序名在白名单中也拒绝）
const FORBIDDEN_SUBSTR: &[&str] = &[
    "rm -rf",
    "rm -fr",
    "rm -r",
    "wget ",
    "curl | sh",
    "chmod 777",
    "chmod +s",
    "mkfs",
    "dd if=",
    "> /dev/sd",
    ":(){ :|:& };:",
];

/// git 只允许只读子命令
const GIT_READ_ONLY: &[&str] = &[
    "log", "show", "diff", "status", "blame", "rev-parse", "ls-files", "shortlog", "describe",
];

/// git 中会写文件的参数
const GIT_FORBIDDEN_ARGS: &[&str] = &["--output"];

/// find 中会删除、执行或写文件的谓词
const FIND_FORBIDDEN_ARGS: &[&str] = &[
    "-delete", "-exec", "-execdir", "-ok", "-okdir", "-fprint", "-fprint0", "-fprintf", "-fls",
];

#[derive(Debug)]
pub struct ShellSandbox {
    allowed_commands: HashSet<String>,
    timeout_secs: u64,
    workdir: PathBuf,
    spawned: AtomicUsize,
}

impl ShellSandbox {
    pub fn new(allowed_commands: Vec<String>, timeout_secs: u64, workdir: impl AsRef<Path>) -> Self {
        Self {
            allowed_commands: allowed_commands.into_iter().map(|s| s.to_lowercase()).collect(),
            timeout_secs,
            workdir: workdir.as_ref().to_path_buf(),
            spawned: AtomicUsize::new(0),
        }
    }

    /// 同样的超时与工作目录，换一组白名单（清单里的 allowed_shell_commands）
    pub fn with_allowed(&self, allowed_commands: Vec<String>) -> Self {
        Self::new(allowed_commands, self.timeout_secs, &self.workdir)
    }

    /// 已启动的子进程数
    pub fn spawn_count(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    /// 校验命令，返回拆分后的 argv
    pub fn check(&self, raw: &str) -> Result<Vec<String>, ActionError> {
        let lower = raw.to_lowercase();
        if let Some(forbidden) = FORBIDDEN_SUBSTR.iter().find(|f| lower.contains(*f)) {
            return Err(ActionError::Disallowed(format!(
                "Forbidden pattern '{forbidden}' in command: {raw}"
            )));
        }
        let argv = shell_words::split(raw)
            .map_err(|e| ActionError::InvalidArguments(format!("cannot parse command: {e}")))?;
        let Some(program) = argv.first() else {
            return Err(ActionError::InvalidArguments("empty command".to_string()));
        };
        let name = Path::new(program)
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !self.allowed_commands.contains(&name) {
            return Err(ActionError::Disallowed(format!(
                "Command '{name}' is not in the allow-list"
            )));
        }
        check_arguments(&name, &argv[1..])?;
        Ok(argv)
    }

    pub async fn run(&self, raw: &str) -> Result<String, ActionError> {
        let argv = self.check(raw.trim())?;
        tracing::info!(command = %raw, "shell execute");

        self.spawned.fetch_add(1, Ordering::SeqCst);
        let child = Command::new(&argv[0])
            .args(&argv[1..])
            .current_dir(&self.workdir)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ActionError::Failed(format!("spawn failed: {e}")))?;

        let output = tokio::time::timeout(Duration::from_secs(self.timeout_secs), child.wait_with_output())
            .await
            .map_err(|_| ActionError::Timeout(self.timeout_secs))?
            .map_err(|e| ActionError::Failed(format!("wait failed: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(ActionError::Failed(format!(
                "exit {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }
        Ok(if stderr.trim().is_empty() {
            stdout.trim_end().to_string()
        } else {
            format!("{}\nstderr: {}", stdout.trim_end(), stderr.trim())
        })
    }
}

/// 白名单内程序的参数规则
fn check_arguments(program: &str, args: &[String]) -> Result<(), ActionError> {
    match program {
        "git" => {
            let subcommand = args.first().map(String::as_str).unwrap_or_default();
            if !GIT_READ_ONLY.contains(&subcommand) {
                return Err(ActionError::Disallowed(format!(
                    "git subcommand '{subcommand}' is not read-only"
                )));
            }
            if let Some(arg) = args.iter().find(|a| {
                GIT_FORBIDDEN_ARGS
                    .iter()
                    .any(|f| a.as_str() == *f || a.starts_with(&format!("{f}=")))
            }) {
                return Err(ActionError::Disallowed(format!("git argument '{arg}' writes files")));
            }
        }
        "find" => {
            if let Some(arg) = args.iter().find(|a| FIND_FORBIDDEN_ARGS.contains(&a.as_str())) {
                return Err(ActionError::Disallowed(format!("find predicate '{arg}' is not allowed")));
            }
        }
        _ => {}
    }
    Ok(())
}

/// run_shell 动作：{"command": "..."}
pub struct ShellTool {
    sandbox: Arc<ShellSandbox>,
}

impl ShellTool {
    pub fn new(sandbox: Arc<ShellSandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "run_shell"
    }

    fn description(&self) -> &str {
        "Run an allow-listed command (no shell features). Args: {\"command\": \"git log -5\"}"
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<String, ActionError> {
        let command = required_str(args, "command")?;
        self.sandbox.run(command).await
    }
}
