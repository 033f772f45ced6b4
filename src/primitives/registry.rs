//! 原语注册表
//!
//! 构造时扫描一次目录树，每个名字只保留可解析清单中语义版本最高的那一个；之后只读。

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use semver::Version;
use sha2::{Digest, Sha256};

use crate::core::CompilerError;
use crate::primitives::manifest::{Manifest, Primitive, PrimitiveKind};

const MANIFEST_NAMES: [&str; 2] = ["manifest.yml", "manifest.yaml"];

#[derive(Debug, Default)]
pub struct PrimitiveRegistry {
    base_path: PathBuf,
    primitives: HashMap<PrimitiveKind, BTreeMap<String, Primitive>>,
    fingerprint: String,
}

impl PrimitiveRegistry {
    /// 扫描 base 目录；base 不是目录时立即失败
    pub fn load(base_path: impl AsRef<Path>) -> Result<Self, CompilerError> {
        let base_path = base_path.as_ref();
        if !base_path.is_dir() {
            return Err(CompilerError::ConfigError(format!(
                "Primitives base path does not exist: {}",
                base_path.display()
            )));
        }

        let mut primitives: HashMap<PrimitiveKind, BTreeMap<String, Primitive>> = HashMap::new();
        for entry in std::fs::read_dir(base_path)?.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let dir_name = entry.file_name().to_string_lossy().to_string();
            let Some(kind) = PrimitiveKind::from_dir_name(&dir_name) else {
                tracing::debug!(dir = %dir_name, "skipping unknown primitive type directory");
                continue;
            };
            let resolved = primitives.entry(kind).or_default();
            for name_entry in std::fs::read_dir(&path)?.flatten() {
                let name_path = name_entry.path();
                if !name_path.is_dir() {
                    continue;
                }
                let name = name_entry.file_name().to_string_lossy().to_string();
                if let Some(primitive) = latest_version(kind, &name, &name_path) {
                    resolved.insert(name, primitive);
                }
            }
        }

        let fingerprint = compute_fingerprint(&primitives);
        let registry = Self {
            base_path: base_path.to_path_buf(),
            primitives,
            fingerprint,
        };
        tracing::info!(
            base = %registry.base_path.display(),
            actions = registry.count(PrimitiveKind::Actions),
            schemas = registry.count(PrimitiveKind::Schemas),
            patterns = registry.count(PrimitiveKind::Patterns),
            strategies = registry.count(PrimitiveKind::Strategies),
            knowledge = registry.count(PrimitiveKind::Knowledge),
            "primitive registry loaded"
        );
        Ok(registry)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn count(&self, kind: PrimitiveKind) -> usize {
        self.primitives.get(&kind).map_or(0, |m| m.len())
    }

    /// 某类型的全部原语（按名字排序）
    pub fn get_all(&self, kind: PrimitiveKind) -> Vec<&Primitive> {
        self.primitives
            .get(&kind)
            .map(|m| m.values().collect())
            .unwrap_or_default()
    }

    pub fn names(&self, kind: PrimitiveKind) -> Vec<String> {
        self.primitives
            .get(&kind)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, kind: PrimitiveKind, name: &str) -> Result<&Primitive, CompilerError> {
        self.primitives
            .get(&kind)
            .and_then(|m| m.get(name))
            .ok_or_else(|| CompilerError::not_found(kind.to_string(), name))
    }

    /// 读取原语的 entrypoint 文件内容
    pub fn get_content(&self, kind: PrimitiveKind, name: &str) -> Result<String, CompilerError> {
        let primitive = self.get(kind, name)?;
        let path = primitive.entrypoint_path();
        if !path.is_file() {
            return Err(CompilerError::MissingFile {
                name: name.to_string(),
                path,
            });
        }
        Ok(std::fs::read_to_string(path)?)
    }

    /// 全部已解析原语的确定性摘要（类型、名字、版本、清单与 entrypoint 内容）
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// 在 `<name>/` 下挑选最高的合法语义版本；版本名非法或清单不可解析的目录跳过
fn latest_version(kind: PrimitiveKind, name: &str, name_path: &Path) -> Option<Primitive> {
    let mut candidates: Vec<(Version, PathBuf)> = std::fs::read_dir(name_path)
        .ok()?
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| {
            let dir = e.file_name().to_string_lossy().to_string();
            Version::parse(&dir)
                .ok()
                .map(|v| (v, e.path()))
        })
        .collect();
    candidates.sort_by(|a, b| b.0.cmp(&a.0));

    for (version, version_path) in candidates {
        let Some(manifest_path) = MANIFEST_NAMES
            .iter()
            .map(|f| version_path.join(f))
            .find(|p| p.is_file())
        else {
            continue;
        };
        let text = match std::fs::read_to_string(&manifest_path) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(path = %manifest_path.display(), error = %e, "unreadable manifest");
                continue;
            }
        };
        match Manifest::from_yaml(&text) {
            Ok(mut manifest) => {
                if manifest.name.is_empty() {
                    manifest.name = name.to_string();
                } else if manifest.name != name {
                    tracing::warn!(dir = %name, manifest = %manifest.name, "manifest name differs from directory; using directory name");
                    manifest.name = name.to_string();
                }
                let base_path = version_path.canonicalize().unwrap_or(version_path);
                return Some(Primitive {
                    kind,
                    manifest,
                    version,
                    base_path,
                });
            }
            Err(e) => {
                tracing::warn!(path = %manifest_path.display(), error = %e, "skipping malformed manifest");
            }
        }
    }
    None
}

fn compute_fingerprint(primitives: &HashMap<PrimitiveKind, BTreeMap<String, Primitive>>) -> String {
    let mut hasher = Sha256::new();
    for kind in PrimitiveKind::ALL {
        let Some(by_name) = primitives.get(&kind) else {
            continue;
        };
        for (name, p) in by_name {
            hasher.update(kind.dir_name().as_bytes());
            hasher.update(b"/");
            hasher.update(name.as_bytes());
            hasher.update(b"@");
            hasher.update(p.version.to_string().as_bytes());
            if let Ok(manifest) = serde_json::to_vec(&p.manifest) {
                hasher.update(&manifest);
            }
            if let Ok(content) = std::fs::read(p.entrypoint_path()) {
                hasher.update(&content);
            }
            hasher.update(b"\n");
        }
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_primitive(base: &Path, kind: &str, name: &str, version: &str, entry: &str, content: &str) {
        let dir = base.join(kind).join(name).join(version);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("manifest.yml"),
            format!("name: {name}\ndescription: {name} v{version}\nentrypoint: {entry}\n"),
        )
        .unwrap();
        fs::write(dir.join(entry), content).unwrap();
    }

    #[test]
    fn test_latest_version_wins() {
        let tmp = tempfile::tempdir().unwrap();
        write_primitive(tmp.path(), "schemas", "prp", "1.0.0", "schema.json", "{\"v\":1}");
        write_primitive(tmp.path(), "schemas", "prp", "1.10.0", "schema.json", "{\"v\":10}");
        write_primitive(tmp.path(), "schemas", "prp", "1.2.0", "schema.json", "{\"v\":2}");

        let reg = PrimitiveRegistry::load(tmp.path()).unwrap();
        let p = reg.get(PrimitiveKind::Schemas, "prp").unwrap();
        assert_eq!(p.version, Version::new(1, 10, 0));
        assert_eq!(reg.get_content(PrimitiveKind::Schemas, "prp").unwrap(), "{\"v\":10}");
    }

    #[test]
    fn test_malformed_version_dirs_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        write_primitive(tmp.path(), "patterns", "p", "1.0.0", "p.md", "one");
        write_primitive(tmp.path(), "patterns", "p", "latest", "p.md", "bad");
        write_primitive(tmp.path(), "patterns", "p", "2.x", "p.md", "bad");
        write_primitive(tmp.path(), "patterns", "p", "v9.0.0", "p.md", "prefixed");

        let reg = PrimitiveRegistry::load(tmp.path()).unwrap();
        assert_eq!(reg.get_content(PrimitiveKind::Patterns, "p").unwrap(), "one");
    }

    #[test]
    fn test_falls_back_when_newest_manifest_broken() {
        let tmp = tempfile::tempdir().unwrap();
        write_primitive(tmp.path(), "patterns", "p", "1.0.0", "p.md", "one");
        let broken = tmp.path().join("patterns/p/2.0.0");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join("manifest.yml"), "description: [unterminated").unwrap();

        let reg = PrimitiveRegistry::load(tmp.path()).unwrap();
        assert_eq!(reg.get(PrimitiveKind::Patterns, "p").unwrap().version, Version::new(1, 0, 0));
    }

    #[test]
    fn test_not_found_and_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        write_primitive(tmp.path(), "schemas", "s", "1.0.0", "schema.json", "{}");
        fs::remove_file(tmp.path().join("schemas/s/1.0.0/schema.json")).unwrap();

        let reg = PrimitiveRegistry::load(tmp.path()).unwrap();
        assert!(matches!(
            reg.get_content(PrimitiveKind::Schemas, "nope"),
            Err(CompilerError::NotFound { .. })
        ));
        assert!(matches!(
            reg.get_content(PrimitiveKind::Schemas, "s"),
            Err(CompilerError::MissingFile { .. })
        ));
    }

    #[test]
    fn test_missing_base_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            PrimitiveRegistry::load(tmp.path().join("absent")),
            Err(CompilerError::ConfigError(_))
        ));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let tmp = tempfile::tempdir().unwrap();
        write_primitive(tmp.path(), "schemas", "s", "1.0.0", "schema.json", "{}");
        let a = PrimitiveRegistry::load(tmp.path()).unwrap().fingerprint().to_string();
        let b = PrimitiveRegistry::load(tmp.path()).unwrap().fingerprint().to_string();
        assert_eq!(a, b);

        fs::write(tmp.path().join("schemas/s/1.0.0/schema.json"), "{\"type\":\"object\"}").unwrap();
        let c = PrimitiveRegistry::load(tmp.path()).unwrap().fingerprint().to_string();
        assert_ne!(a, c);
    }

    #[test]
    fn test_get_all_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        write_primitive(tmp.path(), "strategies", "zeta", "1.0.0", "s.md", "z");
        write_primitive(tmp.path(), "strategies", "alpha", "1.0.0", "s.md", "a");
        let reg = PrimitiveRegistry::load(tmp.path()).unwrap();
        let names: Vec<_> = reg.get_all(PrimitiveKind::Strategies).iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert!(reg.get_all(PrimitiveKind::Actions).is_empty());
    }
}
