// ==========================================
// 输送带胶料批次台账 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::ledger_config::LedgerConfig;
use crate::db::open_sqlite_connection;
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 获取所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }

    /// 读取数值配置，缺失或格式错误时回退默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> Result<T, Box<dyn Error>>
    where
        T: FromStr + Copy + std::fmt::Display,
    {
        let Some(raw) = self.get_config_value(key)? else {
            return Ok(default);
        };
        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                tracing::warn!(config_key = key, raw_value = %raw, default = %default, "配置值格式错误，使用默认值");
                Ok(default)
            }
        }
    }

    // ===== 台账配置 =====

    /// 读取节假日表
    ///
    /// 配置格式为 JSON: ["2025-03-14", "2025-08-15"]
    pub fn get_holidays(&self) -> Result<Vec<NaiveDate>, Box<dyn Error>> {
        let defaults = LedgerConfig::default().holidays;
        let Some(raw) = self.get_config_value(config_keys::HOLIDAYS)? else {
            return Ok(defaults);
        };

        let parsed: Result<Vec<String>, _> = serde_json::from_str(&raw);
        let dates = parsed.ok().and_then(|items| {
            items
                .iter()
                .map(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
                .collect::<Option<Vec<_>>>()
        });

        match dates {
            Some(d) => Ok(d),
            None => {
                tracing::warn!(
                    config_key = config_keys::HOLIDAYS,
                    raw_value = %raw,
                    "节假日配置格式错误，使用默认节假日表"
                );
                Ok(defaults)
            }
        }
    }

    /// 加载台账参数快照
    pub fn load_ledger_config(&self) -> Result<LedgerConfig, Box<dyn Error>> {
        let d = LedgerConfig::default();

        let mut cfg = LedgerConfig {
            batch_count_min: self.get_parsed_or_default(config_keys::BATCH_COUNT_MIN, d.batch_count_min)?,
            batch_count_max: self.get_parsed_or_default(config_keys::BATCH_COUNT_MAX, d.batch_count_max)?,
            max_day_search: self.get_parsed_or_default(config_keys::MAX_DAY_SEARCH, d.max_day_search)?,
            max_conflict_retries: self
                .get_parsed_or_default(config_keys::MAX_CONFLICT_RETRIES, d.max_conflict_retries)?,
            retry_backoff_ms: self.get_parsed_or_default(config_keys::RETRY_BACKOFF_MS, d.retry_backoff_ms)?,
            max_generated_batches: self
                .get_parsed_or_default(config_keys::MAX_GENERATED_BATCHES, d.max_generated_batches)?,
            max_create_attempts: self
                .get_parsed_or_default(config_keys::MAX_CREATE_ATTEMPTS, d.max_create_attempts)?,
            holidays: self.get_holidays()?,
        };

        if !cfg.batch_range_is_valid() {
            tracing::warn!(
                min = cfg.batch_count_min,
                max = cfg.batch_count_max,
                "批数区间非法，使用默认区间"
            );
            cfg.batch_count_min = d.batch_count_min;
            cfg.batch_count_max = d.batch_count_max;
        }
        if cfg.max_day_search == 0 {
            cfg.max_day_search = d.max_day_search;
        }
        if cfg.max_create_attempts == 0 {
            cfg.max_create_attempts = d.max_create_attempts;
        }

        Ok(cfg)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 自动建批
    pub const BATCH_COUNT_MIN: &str = "ledger/batch_count_min";
    pub const BATCH_COUNT_MAX: &str = "ledger/batch_count_max";
    pub const MAX_GENERATED_BATCHES: &str = "ledger/max_generated_batches";
    pub const MAX_CREATE_ATTEMPTS: &str = "ledger/max_create_attempts";

    // 搜索与重试上限
    pub const MAX_DAY_SEARCH: &str = "ledger/max_day_search";
    pub const MAX_CONFLICT_RETRIES: &str = "ledger/max_conflict_retries";
    pub const RETRY_BACKOFF_MS: &str = "ledger/retry_backoff_ms";

    // 工作日历
    pub const HOLIDAYS: &str = "calendar/holidays";
}
