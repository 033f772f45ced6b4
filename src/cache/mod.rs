//! 结果缓存（SQLite）
//!
//! 单表 `cache(cache_key, result_json, timestamp)`；写入用 REPLACE INTO，按 key 原子覆盖。
//! 超过 max_age_hours 的条目视为不存在；max_age_hours = 0 时永远未命中。

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::core::CompilerError;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS cache (
    cache_key TEXT PRIMARY KEY,
    result_json TEXT NOT NULL,
    timestamp TEXT NOT NULL
)";

/// 约 100 年；更大的值按此截断
const MAX_AGE_CAP_HOURS: u64 = 876_000;

/// rusqlite::Connection 不是 Sync，用 Mutex 包一层以便在多个组件间共享
pub struct ResultCache {
    conn: Mutex<Connection>,
}

impl ResultCache {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CompilerError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, CompilerError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CompilerError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CompilerError> {
        self.conn
            .lock()
            .map_err(|_| CompilerError::ConfigError("cache connection poisoned".to_string()))
    }

    /// 读取未过期的条目
    pub fn get(&self, key: &str, max_age_hours: u64) -> Result<Option<Value>, CompilerError> {
        if max_age_hours == 0 {
            return Ok(None);
        }
        let row: Option<(String, String)> = self
            .lock()?
            .query_row(
                "SELECT result_json, timestamp FROM cache WHERE cache_key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((json, ts)) = row else {
            return Ok(None);
        };

        let stored = match DateTime::parse_from_rfc3339(&ts) {
            Ok(t) => t.with_timezone(&Utc),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache entry has an invalid timestamp");
                return Ok(None);
            }
        };
        let max_age = Duration::hours(max_age_hours.min(MAX_AGE_CAP_HOURS) as i64);
        if Utc::now() - stored > max_age {
            tracing::debug!(key = %key, "cache entry expired");
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&json)?))
    }

    /// 读取并反序列化为具体类型；类型不符视为未命中
    pub fn get_as<T: DeserializeOwned>(&self, key: &str, max_age_hours: u64) -> Result<Option<T>, CompilerError> {
        Ok(self
            .get(key, max_age_hours)?
            .and_then(|v| serde_json::from_value(v).ok()))
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), CompilerError> {
        self.set_at(key, value, Utc::now())
    }

    fn set_at<T: Serialize + ?Sized>(&self, key: &str, value: &T, at: DateTime<Utc>) -> Result<(), CompilerError> {
        let json = serde_json::to_string(value)?;
        self.lock()?.execute(
            "REPLACE INTO cache (cache_key, result_json, timestamp) VALUES (?1, ?2, ?3)",
            params![key, json, at.to_rfc3339()],
        )?;
        Ok(())
    }
}

/// 对任意可序列化值求 sha256；对象键先排序，与 serde_json 是否保序无关
pub fn hash_key<T: Serialize + ?Sized>(value: &T) -> String {
    let canonical = serde_json::to_value(value).map(canonicalize).unwrap_or(Value::Null);
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    format!("{:x}", hasher.finalize())
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, canonicalize(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
