//! 原语清单（manifest.yml）
//!
//! 目录布局：`<base>/<kind>/<name>/<semver>/manifest.{yml,yaml}`，entrypoint 相对于版本目录解析。

use std::fmt;
use std::path::{Path, PathBuf};

use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::CompilerError;

/// 原语类型，对应 base 下的一级目录名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    Actions,
    Schemas,
    Patterns,
    Strategies,
    Knowledge,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 5] = [
        PrimitiveKind::Actions,
        PrimitiveKind::Schemas,
        PrimitiveKind::Patterns,
        PrimitiveKind::Strategies,
        PrimitiveKind::Knowledge,
    ];

    pub fn dir_name(&self) -> &'static str {
        match self {
            PrimitiveKind::Actions => "actions",
            PrimitiveKind::Schemas => "schemas",
            PrimitiveKind::Patterns => "patterns",
            PrimitiveKind::Strategies => "strategies",
            PrimitiveKind::Knowledge => "knowledge",
        }
    }

    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.dir_name() == name)
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// manifest.yml 的声明字段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// 缺省时取目录名
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// `module:function`（动作）或模板文件名（schema / pattern / strategy / knowledge）
    pub entrypoint: String,
    #[serde(default)]
    pub inputs_schema: Option<Value>,
    /// 非空时覆盖全局 Shell 白名单
    #[serde(default)]
    pub allowed_shell_commands: Vec<String>,
    /// 程序型动作的参数模板，`{{key}}` 由动作参数填充
    #[serde(default)]
    pub args: Vec<String>,
}

impl Manifest {
    pub fn from_yaml(text: &str) -> Result<Self, CompilerError> {
        serde_yaml::from_str(text).map_err(|e| CompilerError::Manifest(e.to_string()))
    }
}

/// 解析后的原语：清单 + 版本 + 所在目录
#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    pub kind: PrimitiveKind,
    pub manifest: Manifest,
    pub version: Version,
    pub base_path: PathBuf,
}

impl Primitive {
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn description(&self) -> &str {
        &self.manifest.description
    }

    /// entrypoint 中的文件部分（去掉 `:function`）
    pub fn entrypoint_file(&self) -> &str {
        match self.manifest.entrypoint.split_once(':') {
            Some((file, _)) => file,
            None => &self.manifest.entrypoint,
        }
    }

    /// entrypoint 的模块名，如 `read_file.py:run` -> `read_file`
    pub fn entrypoint_module(&self) -> &str {
        let file = self.entrypoint_file();
        Path::new(file)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file)
    }

    pub fn entrypoint_path(&self) -> PathBuf {
        self.base_path.join(self.entrypoint_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action_manifest() {
        let yaml = r#"
name: run_shell
description: Run an allow-listed command
entrypoint: "run_shell.py:run"
inputs_schema:
  type: object
  properties:
    command: { type: string }
  required: [command]
allowed_shell_commands: [ls, git]
"#;
        let m = Manifest::from_yaml(yaml).unwrap();
        assert_eq!(m.name, "run_shell");
        assert_eq!(m.allowed_shell_commands, vec!["ls", "git"]);
        let schema = m.inputs_schema.unwrap();
        assert_eq!(schema["required"][0], "command");
    }

    #[test]
    fn test_missing_entrypoint_is_error() {
        assert!(matches!(
            Manifest::from_yaml("name: broken\n"),
            Err(CompilerError::Manifest(_))
        ));
    }

    #[test]
    fn test_entrypoint_module() {
        let p = Primitive {
            kind: PrimitiveKind::Actions,
            manifest: Manifest {
                name: "read_file".into(),
                entrypoint: "read_file.py:run".into(),
                ..Manifest::default()
            },
            version: Version::new(1, 0, 0),
            base_path: PathBuf::from("/tmp/x"),
        };
        assert_eq!(p.entrypoint_file(), "read_file.py");
        assert_eq!(p.entrypoint_module(), "read_file");
        assert_eq!(p.entrypoint_path(), PathBuf::from("/tmp/x/read_file.py"));
    }

    #[test]
    fn test_kind_dir_names() {
        assert_eq!(PrimitiveKind::from_dir_name("schemas"), Some(PrimitiveKind::Schemas));
        assert_eq!(PrimitiveKind::from_dir_name("widgets"), None);
        assert_eq!(PrimitiveKind::Strategies.to_string(), "strategies");
    }
}
