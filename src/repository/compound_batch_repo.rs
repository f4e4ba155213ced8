// ==========================================
// 输送带胶料批次台账 - 胶料批次仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 并发: 库存扣减/冲回均为条件更新 (CAS)，由引擎负责重试
// ==========================================

use crate::domain::compound::CompoundBatch;
use crate::domain::types::{CompoundRole, TIMESTAMP_FORMAT};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

/// 条件更新的浮点容差
const CAS_TOLERANCE: f64 = 1e-9;

const SELECT_COLUMNS: &str = r#"
    batch_id, compound_code, compound_name, batch_date, batches,
    weight_per_batch, total_inventory, inventory_remaining, consumed,
    cover_produced_on, skim_produced_on, revision, created_at, updated_at
"#;

// ==========================================
// CompoundBatchRepository - 批次仓储
// ==========================================
pub struct CompoundBatchRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CompoundBatchRepository {
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

    fn map_row(row: &Row) -> SqliteResult<CompoundBatch> {
        Ok(CompoundBatch {
            batch_id: row.get(0)?,
            compound_code: row.get(1)?,
            compound_name: row.get(2)?,
            batch_date: row.get(3)?,
            batches: row.get(4)?,
            weight_per_batch: row.get(5)?,
            total_inventory: row.get(6)?,
            inventory_remaining: row.get(7)?,
            consumed: row.get(8)?,
            cover_produced_on: row.get(9)?,
            skim_produced_on: row.get(10)?,
            revision: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn now_str() -> String {
        Utc::now().naive_utc().format(TIMESTAMP_FORMAT).to_string()
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 插入新批次
    ///
    /// # 错误
    /// - `UniqueConstraintViolation`: 当天已有任意胶料的批次
    pub fn insert(&self, batch: &CompoundBatch) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO compound_batch (
                batch_id, compound_code, compound_name, batch_date, batches,
                weight_per_batch, total_inventory, inventory_remaining, consumed,
                cover_produced_on, skim_produced_on, revision, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                batch.batch_id,
                batch.compound_code,
                batch.compound_name,
                batch.batch_date,
                batch.batches,
                batch.weight_per_batch,
                batch.total_inventory,
                batch.inventory_remaining,
                batch.consumed,
                batch.cover_produced_on,
                batch.skim_produced_on,
                batch.revision,
                batch.created_at.format(TIMESTAMP_FORMAT).to_string(),
                batch.updated_at.format(TIMESTAMP_FORMAT).to_string(),
            ],
        )?;
        Ok(())
    }

    /// 条件扣减库存
    ///
    /// 仅当 inventory_remaining >= kg 时扣减并累加 consumed
    ///
    /// # 返回
    /// - Ok(true): 扣减成功
    /// - Ok(false): 前置条件不满足（被其他写者抢先消耗，或批次不存在）
    pub fn try_consume(&self, batch_id: &str, kg: f64) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE compound_batch
            SET inventory_remaining = inventory_remaining - ?2,
                consumed = consumed + ?2,
                revision = revision + 1,
                updated_at = ?3
            WHERE batch_id = ?1 AND inventory_remaining + ?4 >= ?2
            "#,
            params![batch_id, kg, Self::now_str(), CAS_TOLERANCE],
        )?;
        Ok(affected == 1)
    }

    /// 条件冲回库存
    ///
    /// 仅当 consumed >= kg 时冲回，consumed 不允许变负
    ///
    /// # 返回
    /// - Ok(true): 冲回成功
    /// - Ok(false): consumed 不足以冲回
    /// - Err(NotFound): 批次不存在
    pub fn release(&self, batch_id: &str, kg: f64) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE compound_batch
            SET inventory_remaining = inventory_remaining + ?2,
                consumed = consumed - ?2,
                revision = revision + 1,
                updated_at = ?3
            WHERE batch_id = ?1 AND consumed + ?4 >= ?2
            "#,
            params![batch_id, kg, Self::now_str(), CAS_TOLERANCE],
        )?;

        if affected == 1 {
            return Ok(true);
        }

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM compound_batch WHERE batch_id = ?1)",
            params![batch_id],
            |row| row.get(0),
        )?;
        if exists {
            Ok(false)
        } else {
            Err(RepositoryError::not_found("CompoundBatch", batch_id))
        }
    }

    /// 写入角色生产日期（仅当尚未写入）
    ///
    /// # 返回
    /// - Ok(true): 本次首次写入
    /// - Ok(false): 已有值，未覆盖
    pub fn stamp_produced_on(
        &self,
        batch_id: &str,
        role: CompoundRole,
        produced_on: NaiveDate,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let column = role.produced_on_column();
        let sql = format!(
            "UPDATE compound_batch SET {col} = ?2, updated_at = ?3 \
             WHERE batch_id = ?1 AND {col} IS NULL",
            col = column
        );
        let affected = conn.execute(&sql, params![batch_id, produced_on, Self::now_str()])?;
        Ok(affected == 1)
    }

    // ==========================================
    // 查询操作
    // ==========================================

    /// 按批次ID查询
    pub fn find_by_id(&self, batch_id: &str) -> RepositoryResult<Option<CompoundBatch>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM compound_batch WHERE batch_id = ?1", SELECT_COLUMNS);
        let batch = conn
            .query_row(&sql, params![batch_id], Self::map_row)
            .optional()?;
        Ok(batch)
    }

    /// FIFO: 查询该胶料日期最早且仍有库存的批次
    pub fn find_oldest_available(
        &self,
        compound_code: &str,
        min_remaining: f64,
    ) -> RepositoryResult<Option<CompoundBatch>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {}
            FROM compound_batch
            WHERE compound_code = ?1 AND inventory_remaining > ?2
            ORDER BY batch_date ASC
            LIMIT 1
            "#,
            SELECT_COLUMNS
        );
        let batch = conn
            .query_row(&sql, params![compound_code, min_remaining], Self::map_row)
            .optional()?;
        Ok(batch)
    }

    /// 查询胶料全部批次（FIFO 顺序）
    pub fn list_by_compound(&self, compound_code: &str) -> RepositoryResult<Vec<CompoundBatch>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM compound_batch WHERE compound_code = ?1 ORDER BY batch_date ASC",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let batches = stmt
            .query_map(params![compound_code], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(batches)
    }

    /// 查询全部批次（按日期）
    pub fn list_all(&self) -> RepositoryResult<Vec<CompoundBatch>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM compound_batch ORDER BY batch_date ASC", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let batches = stmt
            .query_map([], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(batches)
    }

    /// 全局日期占用检查（任意胶料）
    pub fn exists_by_date(&self, date: NaiveDate) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM compound_batch WHERE batch_date = ?1)",
            params![date],
            |row| row.get(0),
        )?;
        Ok(exists)
    }
}
