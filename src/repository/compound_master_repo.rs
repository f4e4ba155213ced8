// ==========================================
// 输送带胶料批次台账 - 胶料主数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::compound::CompoundMaster;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// CompoundMasterRepository - 胶料主数据仓储
// ==========================================
pub struct CompoundMasterRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CompoundMasterRepository {
    /// 从已有连接创建仓储实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row) -> SqliteResult<CompoundMaster> {
        Ok(CompoundMaster {
            compound_code: row.get(0)?,
            compound_name: row.get(1)?,
            default_weight_per_batch: row.get(2)?,
        })
    }

    /// 按胶料代码查询
    pub fn find_by_code(&self, compound_code: &str) -> RepositoryResult<Option<CompoundMaster>> {
        let conn = self.get_conn()?;
        let master = conn
            .query_row(
                r#"
                SELECT compound_code, compound_name, default_weight_per_batch
                FROM compound_master
                WHERE compound_code = ?1
                "#,
                params![compound_code],
                Self::map_row,
            )
            .optional()?;
        Ok(master)
    }

    /// 查询全部主数据（按代码排序）
    pub fn list_all(&self) -> RepositoryResult<Vec<CompoundMaster>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT compound_code, compound_name, default_weight_per_batch
            FROM compound_master
            ORDER BY compound_code
            "#,
        )?;
        let masters = stmt
            .query_map([], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(masters)
    }

    /// 插入或更新单条主数据
    pub fn upsert(&self, master: &CompoundMaster) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::upsert_with(&conn, master)
    }

    /// 批量插入或更新（单事务）
    ///
    /// # 返回
    /// - Ok(usize): 写入条数
    pub fn upsert_batch(&self, masters: &[CompoundMaster]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        for master in masters {
            Self::upsert_with(&tx, master)?;
        }
        tx.commit()?;
        Ok(masters.len())
    }

    fn upsert_with(conn: &Connection, master: &CompoundMaster) -> RepositoryResult<()> {
        let now = Utc::now().naive_utc();
        conn.execute(
            r#"
            INSERT INTO compound_master (
                compound_code, compound_name, default_weight_per_batch, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?4)
            ON CONFLICT(compound_code) DO UPDATE SET
                compound_name = excluded.compound_name,
                default_weight_per_batch = excluded.default_weight_per_batch,
                updated_at = excluded.updated_at
            "#,
            params![
                master.compound_code,
                master.compound_name,
                master.default_weight_per_batch,
                now,
            ],
        )?;
        Ok(())
    }
}
