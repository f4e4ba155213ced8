// ==========================================
// 输送带胶料批次台账 - SQLite 连接与事务
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少多连接并发写入时的 busy 错误
// - 提供台账 schema 初始化（幂等）
// - 提供整段级联重算所需的事务守卫与单写者闸门
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 台账 schema
///
/// 约束:
/// - compound_batch.batch_date 全局唯一（全系统每天最多一个批次）
/// - 库存恒等式由引擎维护，CHECK 只兜底非负
const LEDGER_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_scope (
    scope_id TEXT PRIMARY KEY,
    scope_type TEXT NOT NULL,
    scope_key TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(scope_type, scope_key)
);

INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
VALUES ('global', 'GLOBAL', 'global');

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS compound_master (
    compound_code TEXT PRIMARY KEY,
    compound_name TEXT NOT NULL,
    default_weight_per_batch REAL NOT NULL CHECK (default_weight_per_batch > 0),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS compound_batch (
    batch_id TEXT PRIMARY KEY,
    compound_code TEXT NOT NULL,
    compound_name TEXT NOT NULL,
    batch_date TEXT NOT NULL UNIQUE,
    batches INTEGER NOT NULL CHECK (batches > 0),
    weight_per_batch REAL NOT NULL CHECK (weight_per_batch > 0),
    total_inventory REAL NOT NULL,
    inventory_remaining REAL NOT NULL CHECK (inventory_remaining >= -0.000001),
    consumed REAL NOT NULL DEFAULT 0 CHECK (consumed >= -0.000001),
    cover_produced_on TEXT,
    skim_produced_on TEXT,
    revision INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_compound_batch_fifo
    ON compound_batch(compound_code, batch_date);

CREATE TABLE IF NOT EXISTS belt (
    belt_id TEXT PRIMARY KEY,
    belt_number TEXT NOT NULL,
    spec_json TEXT NOT NULL,
    calendaring_date TEXT,
    cover_compound_code TEXT,
    skim_compound_code TEXT,
    cover_produced_on TEXT,
    skim_produced_on TEXT,
    cover_batches_used_json TEXT NOT NULL DEFAULT '[]',
    skim_batches_used_json TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_belt_created_at ON belt(created_at);
CREATE INDEX IF NOT EXISTS idx_belt_cover_code ON belt(cover_compound_code);
CREATE INDEX IF NOT EXISTS idx_belt_skim_code ON belt(skim_compound_code);

CREATE TABLE IF NOT EXISTS compound_batch_history (
    history_id TEXT PRIMARY KEY,
    batch_id TEXT NOT NULL,
    compound_code TEXT NOT NULL,
    batch_date TEXT NOT NULL,
    batches INTEGER NOT NULL,
    weight_per_batch REAL NOT NULL,
    total_inventory REAL NOT NULL,
    cover_produced_on TEXT,
    skim_produced_on TEXT,
    snapshot_json TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_batch_history_batch ON compound_batch_history(batch_id);

CREATE TABLE IF NOT EXISTS belt_history (
    history_id TEXT PRIMARY KEY,
    belt_id TEXT NOT NULL,
    belt_number TEXT NOT NULL,
    snapshot_json TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_belt_history_belt ON belt_history(belt_id);
"#;

/// 初始化台账 schema（幂等）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(LEDGER_SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

// ==========================================
// LedgerWriteGate - 单写者闸门
// ==========================================
// 同一共享连接上的台账写操作必须串行：
// 事务开在连接上，若两个级联交错执行会互相混入对方事务
#[derive(Debug, Clone, Default)]
pub struct LedgerWriteGate {
    inner: Arc<Mutex<()>>,
}

impl LedgerWriteGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取写闸门（阻塞直到当前写者释放）
    pub fn acquire(&self) -> RepositoryResult<MutexGuard<'_, ()>> {
        self.inner
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }
}

// ==========================================
// LedgerTransaction - 事务守卫
// ==========================================
// BEGIN IMMEDIATE 立即获取 reserved 锁，跨连接写者在此排队
// 未 commit 即被 drop 时自动 ROLLBACK
pub struct LedgerTransaction {
    conn: Arc<Mutex<Connection>>,
    active: bool,
}

impl LedgerTransaction {
    /// 在共享连接上开启事务
    pub fn begin(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            guard
                .execute_batch("BEGIN IMMEDIATE")
                .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        }
        Ok(Self { conn, active: true })
    }

    /// 提交事务
    pub fn commit(mut self) -> RepositoryResult<()> {
        let guard = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        guard
            .execute_batch("COMMIT")
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        self.active = false;
        Ok(())
    }
}

impl Drop for LedgerTransaction {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        match self.conn.lock() {
            Ok(guard) => {
                if let Err(e) = guard.execute_batch("ROLLBACK") {
                    tracing::error!(error = %e, "事务回滚失败");
                } else {
                    tracing::warn!("台账事务未提交，已回滚");
                }
            }
            Err(e) => tracing::error!(error = %e, "事务回滚时连接锁获取失败"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared_conn() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        Arc::new(Mutex::new(conn))
    }

    fn master_count(conn: &Arc<Mutex<Connection>>) -> i64 {
        conn.lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM compound_master", [], |r| r.get(0))
            .unwrap()
    }

    fn insert_master(conn: &Arc<Mutex<Connection>>, code: &str) {
        conn.lock()
            .unwrap()
            .execute(
                "INSERT INTO compound_master VALUES (?1, 'x', 90, 'now', 'now')",
                [code],
            )
            .unwrap();
    }

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_transaction_rolls_back_on_drop() {
        let conn = shared_conn();
        {
            let _tx = LedgerTransaction::begin(conn.clone()).unwrap();
            insert_master(&conn, "nk5");
        }
        assert_eq!(master_count(&conn), 0);
    }

    #[test]
    fn test_transaction_commit_persists() {
        let conn = shared_conn();
        let tx = LedgerTransaction::begin(conn.clone()).unwrap();
        insert_master(&conn, "nk5");
        tx.commit().unwrap();
        assert_eq!(master_count(&conn), 1);
    }
}
