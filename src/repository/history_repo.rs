// ==========================================
// 输送带胶料批次台账 - 历史快照仓储
// ==========================================
// 红线: 只追加；唯一的更新是生产日期首次写入
// ==========================================

use crate::domain::history::{BatchHistoryRecord, BeltHistoryRecord};
use crate::domain::types::{CompoundRole, TIMESTAMP_FORMAT};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// HistoryRepository - 历史快照仓储
// ==========================================
pub struct HistoryRepository {
    conn: Arc<Mutex<Connection>>,
}

impl HistoryRepository {
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

    fn parse_snapshot(row: &Row, idx: usize) -> SqliteResult<serde_json::Value> {
        let raw: String = row.get(idx)?;
        serde_json::from_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    /// 追加批次快照
    pub fn insert_batch_history(&self, record: &BatchHistoryRecord) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO compound_batch_history (
                history_id, batch_id, compound_code, batch_date, batches,
                weight_per_batch, total_inventory, cover_produced_on, skim_produced_on,
                snapshot_json, recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                record.history_id,
                record.batch_id,
                record.compound_code,
                record.batch_date,
                record.batches,
                record.weight_per_batch,
                record.total_inventory,
                record.cover_produced_on,
                record.skim_produced_on,
                record.snapshot_json.to_string(),
                record.recorded_at.format(TIMESTAMP_FORMAT).to_string(),
            ],
        )?;
        Ok(())
    }

    /// 追加皮带快照
    pub fn insert_belt_history(&self, record: &BeltHistoryRecord) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO belt_history (history_id, belt_id, belt_number, snapshot_json, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                record.history_id,
                record.belt_id,
                record.belt_number,
                record.snapshot_json.to_string(),
                record.recorded_at.format(TIMESTAMP_FORMAT).to_string(),
            ],
        )?;
        Ok(())
    }

    /// 生产日期首次写入时同步到批次快照
    ///
    /// # 返回
    /// - Ok(rows): 被更新的快照行数（已有值的行不覆盖）
    pub fn stamp_batch_produced_on(
        &self,
        batch_id: &str,
        role: CompoundRole,
        produced_on: NaiveDate,
    ) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let sql = format!(
            "UPDATE compound_batch_history SET {col} = ?2 WHERE batch_id = ?1 AND {col} IS NULL",
            col = role.produced_on_column()
        );
        let rows = conn.execute(&sql, params![batch_id, produced_on])?;
        Ok(rows)
    }

    /// 查询批次快照
    pub fn find_batch_history(&self, batch_id: &str) -> RepositoryResult<Vec<BatchHistoryRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT history_id, batch_id, compound_code, batch_date, batches,
                   weight_per_batch, total_inventory, cover_produced_on, skim_produced_on,
                   snapshot_json, recorded_at
            FROM compound_batch_history
            WHERE batch_id = ?1
            ORDER BY recorded_at ASC
            "#,
        )?;
        let records = stmt
            .query_map(params![batch_id], |row| {
                Ok(BatchHistoryRecord {
                    history_id: row.get(0)?,
                    batch_id: row.get(1)?,
                    compound_code: row.get(2)?,
                    batch_date: row.get(3)?,
                    batches: row.get(4)?,
                    weight_per_batch: row.get(5)?,
                    total_inventory: row.get(6)?,
                    cover_produced_on: row.get(7)?,
                    skim_produced_on: row.get(8)?,
                    snapshot_json: Self::parse_snapshot(row, 9)?,
                    recorded_at: row.get(10)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(records)
    }

    /// 查询皮带快照
    pub fn find_belt_history(&self, belt_id: &str) -> RepositoryResult<Vec<BeltHistoryRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT history_id, belt_id, belt_number, snapshot_json, recorded_at
            FROM belt_history
            WHERE belt_id = ?1
            ORDER BY recorded_at ASC
            "#,
        )?;
        let records = stmt
            .query_map(params![belt_id], |row| {
                Ok(BeltHistoryRecord {
                    history_id: row.get(0)?,
                    belt_id: row.get(1)?,
                    belt_number: row.get(2)?,
                    snapshot_json: Self::parse_snapshot(row, 3)?,
                    recorded_at: row.get(4)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(records)
    }
}
