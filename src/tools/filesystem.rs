//! 沙箱文件系统
//!
//! SafeFs 绑定 root_dir，所有路径经 resolve 校验必须在 root 下（禁止 ../ 逃逸）；
//! ReadFileTool / ListDirectoryTool 基于 SafeFs 提供 read_file / list_directory 动作。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::ActionError;
use crate::tools::registry::{required_str, Tool};

#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
}

impl SafeFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self { root_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// 解析相对路径并检查仍在沙箱内
    pub fn resolve(&self, path: &str) -> Result<PathBuf, ActionError> {
        let path = path.trim().trim_start_matches("./");
        let full = self.root_dir.join(path);
        let canonical = full
            .canonicalize()
            .map_err(|_| ActionError::Failed(format!("Path not found: {path}")))?;
        if canonical.starts_with(&self.root_dir) {
            Ok(canonical)
        } else {
            Err(ActionError::Disallowed(format!("Path escapes the workspace: {path}")))
        }
    }

    pub fn read_file(&self, path: &str) -> Result<String, ActionError> {
        let resolved = self.resolve(path)?;
        std::fs::read_to_string(&resolved).map_err(|e| ActionError::Failed(format!("Read failed: {e}")))
    }

    pub fn list_dir(&self, path: &str) -> Result<Vec<String>, ActionError> {
        let base = if path.trim().is_empty() || path.trim() == "." {
            self.root_dir.clone()
        } else {
            self.resolve(path)?
        };
        let mut entries = Vec::new();
        for e in std::fs::read_dir(&base).map_err(|e| ActionError::Failed(format!("List failed: {e}")))? {
            let e = e.map_err(|e| ActionError::Failed(e.to_string()))?;
            let name = e.file_name().to_string_lossy().to_string();
            if !name.starts_with('.') {
                let suffix = if e.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    "/"
                } else {
                    ""
                };
                entries.push(format!("{name}{suffix}"));
            }
        }
        entries.sort();
        Ok(entries)
    }
}

/// read_file 动作：{"file_path": "..."}（也接受 "path"）
pub struct ReadFileTool {
    fs: SafeFs,
}

impl ReadFileTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
        }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file inside the workspace. Args: {\"file_path\": \"relative/path\"}"
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<String, ActionError> {
        let path = required_str(args, "file_path").or_else(|_| required_str(args, "path"))?;
        tracing::info!(path = %path, "read_file");
        self.fs.read_file(path)
    }
}

/// list_directory 动作：{"directory_path": "."}
pub struct ListDirectoryTool {
    fs: SafeFs,
}

impl ListDirectoryTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
        }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List a directory inside the workspace. Args: {\"directory_path\": \".\"}"
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<String, ActionError> {
        let path = args
            .get("directory_path")
            .or_else(|| args.get("path"))
            .and_then(Value::as_str)
            .unwrap_or(".");
        tracing::info!(path = %path, "list_directory");
        Ok(self.fs.list_dir(path)?.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_read_and_list() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("src")).unwrap();
        std::fs::write(tmp.path().join("src/lib.rs"), "pub fn x() {}").unwrap();
        std::fs::write(tmp.path().join(".hidden"), "").unwrap();

        let read = ReadFileTool::new(tmp.path());
        assert_eq!(
            read.execute(&args(json!({"file_path": "./src/lib.rs"}))).await.unwrap(),
            "pub fn x() {}"
        );
        let list = ListDirectoryTool::new(tmp.path());
        assert_eq!(list.execute(&Map::new()).await.unwrap(), "src/");
        assert_eq!(
            list.execute(&args(json!({"directory_path": "src"}))).await.unwrap(),
            "lib.rs"
        );
    }

    #[tokio::test]
    async fn test_escape_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let inner = tmp.path().join("ws");
        std::fs::create_dir(&inner).unwrap();
        std::fs::write(tmp.path().join("secret.txt"), "s").unwrap();

        let fs = SafeFs::new(&inner);
        assert!(matches!(fs.read_file("../secret.txt"), Err(ActionError::Disallowed(_))));
        assert!(matches!(fs.read_file("missing.txt"), Err(ActionError::Failed(_))));
    }
}
