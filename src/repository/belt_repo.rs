// ==========================================
// 输送带胶料批次台账 - 皮带仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 存储: 角色消耗声明以 JSON 数组存于 belt 表
// ==========================================

use crate::domain::belt::{Belt, BeltSpec};
use crate::domain::compound::BatchUsage;
use crate::domain::types::TIMESTAMP_FORMAT;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    belt_id, belt_number, spec_json, calendaring_date,
    cover_compound_code, skim_compound_code,
    cover_produced_on, skim_produced_on,
    cover_batches_used_json, skim_batches_used_json,
    created_at, updated_at
"#;

// ==========================================
// BeltRepository - 皮带仓储
// ==========================================
pub struct BeltRepository {
    conn: Arc<Mutex<Connection>>,
}

impl BeltRepository {
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

    fn parse_json<T: serde::de::DeserializeOwned>(
        row: &Row,
        idx: usize,
    ) -> SqliteResult<T> {
        let raw: String = row.get(idx)?;
        serde_json::from_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    fn map_row(row: &Row) -> SqliteResult<Belt> {
        let spec: BeltSpec = Self::parse_json(row, 2)?;
        let cover_used: Vec<BatchUsage> = Self::parse_json(row, 8)?;
        let skim_used: Vec<BatchUsage> = Self::parse_json(row, 9)?;
        Ok(Belt {
            belt_id: row.get(0)?,
            belt_number: row.get(1)?,
            spec,
            calendaring_date: row.get(3)?,
            cover_compound_code: row.get(4)?,
            skim_compound_code: row.get(5)?,
            cover_produced_on: row.get(6)?,
            skim_produced_on: row.get(7)?,
            cover_batches_used: cover_used,
            skim_batches_used: skim_used,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 插入皮带
    pub fn insert(&self, belt: &Belt) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO belt (
                belt_id, belt_number, spec_json, calendaring_date,
                cover_compound_code, skim_compound_code,
                cover_produced_on, skim_produced_on,
                cover_batches_used_json, skim_batches_used_json,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                belt.belt_id,
                belt.belt_number,
                serde_json::to_string(&belt.spec)?,
                belt.calendaring_date,
                belt.cover_compound_code,
                belt.skim_compound_code,
                belt.cover_produced_on,
                belt.skim_produced_on,
                serde_json::to_string(&belt.cover_batches_used)?,
                serde_json::to_string(&belt.skim_batches_used)?,
                belt.created_at.format(TIMESTAMP_FORMAT).to_string(),
                belt.updated_at.format(TIMESTAMP_FORMAT).to_string(),
            ],
        )?;
        Ok(())
    }

    /// 更新皮带（created_at 不可变，决定级联顺序）
    ///
    /// # 错误
    /// - `RepositoryError::NotFound`: belt_id 不存在
    pub fn update(&self, belt: &Belt) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE belt SET
                belt_number = ?2, spec_json = ?3, calendaring_date = ?4,
                cover_compound_code = ?5, skim_compound_code = ?6,
                cover_produced_on = ?7, skim_produced_on = ?8,
                cover_batches_used_json = ?9, skim_batches_used_json = ?10,
                updated_at = ?11
            WHERE belt_id = ?1
            "#,
            params![
                belt.belt_id,
                belt.belt_number,
                serde_json::to_string(&belt.spec)?,
                belt.calendaring_date,
                belt.cover_compound_code,
                belt.skim_compound_code,
                belt.cover_produced_on,
                belt.skim_produced_on,
                serde_json::to_string(&belt.cover_batches_used)?,
                serde_json::to_string(&belt.skim_batches_used)?,
                belt.updated_at.format(TIMESTAMP_FORMAT).to_string(),
            ],
        )?;
        if affected == 0 {
            return Err(RepositoryError::not_found("Belt", belt.belt_id.clone()));
        }
        Ok(())
    }

    /// 删除皮带
    pub fn delete(&self, belt_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute("DELETE FROM belt WHERE belt_id = ?1", params![belt_id])?;
        if affected == 0 {
            return Err(RepositoryError::not_found("Belt", belt_id));
        }
        Ok(())
    }

    // ==========================================
    // 查询操作
    // ==========================================

    /// 按ID查询
    pub fn find_by_id(&self, belt_id: &str) -> RepositoryResult<Option<Belt>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM belt WHERE belt_id = ?1", SELECT_COLUMNS);
        let belt = conn
            .query_row(&sql, params![belt_id], Self::map_row)
            .optional()?;
        Ok(belt)
    }

    /// 按创建顺序列出全部皮带
    pub fn list_chronological(&self) -> RepositoryResult<Vec<Belt>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM belt ORDER BY created_at ASC, rowid ASC", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let belts = stmt
            .query_map([], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(belts)
    }

    /// 查询在给定皮带之后创建、且引用任一胶料代码的皮带
    ///
    /// 排序: created_at 升序（同一时间戳按插入顺序）
    /// 不含给定皮带本身
    pub fn find_later_referencing(
        &self,
        belt_id: &str,
        compound_codes: &[String],
    ) -> RepositoryResult<Vec<Belt>> {
        if compound_codes.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.get_conn()?;
        let placeholders = (0..compound_codes.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            r#"
            SELECT {cols}
            FROM belt
            WHERE (created_at, rowid) > (SELECT created_at, rowid FROM belt WHERE belt_id = ?1)
              AND (cover_compound_code IN ({ph}) OR skim_compound_code IN ({ph}))
            ORDER BY created_at ASC, rowid ASC
            "#,
            cols = SELECT_COLUMNS,
            ph = placeholders
        );

        let mut values: Vec<&str> = Vec::with_capacity(compound_codes.len() + 1);
        values.push(belt_id);
        values.extend(compound_codes.iter().map(|c| c.as_str()));

        let mut stmt = conn.prepare(&sql)?;
        let belts = stmt
            .query_map(params_from_iter(values), Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(belts)
    }

    /// 生产日期是否已被其他皮带占用（覆盖胶或贴胶）
    pub fn is_production_date_taken(
        &self,
        date: NaiveDate,
        exclude_belt_id: Option<&str>,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let taken: bool = conn.query_row(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM belt
                WHERE (cover_produced_on = ?1 OR skim_produced_on = ?1)
                  AND (?2 IS NULL OR belt_id <> ?2)
            )
            "#,
            params![date, exclude_belt_id],
            |row| row.get(0),
        )?;
        Ok(taken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn setup() -> BeltRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        BeltRepository::new(Arc::new(Mutex::new(conn)))
    }

    fn belt(id: &str, cover: &str, skim: &str, offset_ms: i64) -> Belt {
        let ts = Utc::now().naive_utc() + Duration::milliseconds(offset_ms);
        Belt {
            belt_id: id.to_string(),
            belt_number: format!("CB-{}", id),
            spec: BeltSpec::default(),
            calendaring_date: None,
            cover_compound_code: Some(cover.to_string()),
            skim_compound_code: Some(skim.to_string()),
            cover_produced_on: None,
            skim_produced_on: None,
            cover_batches_used: vec![BatchUsage::new("x", 10.0)],
            skim_batches_used: Vec::new(),
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn test_roundtrip_usage_arrays() {
        let repo = setup();
        let b = belt("B1", "nk5", "sk2", 0);
        repo.insert(&b).unwrap();

        let found = repo.find_by_id("B1").unwrap().unwrap();
        assert_eq!(found.cover_batches_used, b.cover_batches_used);
        assert!(found.skim_batches_used.is_empty());
    }

    #[test]
    fn test_find_later_referencing_orders_and_filters() {
        let repo = setup();
        repo.insert(&belt("B1", "nk5", "sk2", 0)).unwrap();
        repo.insert(&belt("B2", "zz1", "zz2", 10)).unwrap();
        repo.insert(&belt("B3", "zz1", "nk5", 20)).unwrap();
        repo.insert(&belt("B4", "nk5", "zz2", 30)).unwrap();

        let later = repo
            .find_later_referencing("B1", &["nk5".to_string()])
            .unwrap();
        let ids: Vec<_> = later.iter().map(|b| b.belt_id.as_str()).collect();
        assert_eq!(ids, vec!["B3", "B4"]);

        let later = repo
            .find_later_referencing("B3", &["nk5".to_string(), "zz1".to_string()])
            .unwrap();
        let ids: Vec<_> = later.iter().map(|b| b.belt_id.as_str()).collect();
        assert_eq!(ids, vec!["B4"]);
    }

    #[test]
    fn test_production_date_taken_excludes_self() {
        let repo = setup();
        let mut b = belt("B1", "nk5", "sk2", 0);
        let d = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        b.skim_produced_on = Some(d);
        repo.insert(&b).unwrap();

        assert!(repo.is_production_date_taken(d, None).unwrap());
        assert!(repo.is_production_date_taken(d, Some("B2")).unwrap());
        assert!(!repo.is_production_date_taken(d, Some("B1")).unwrap());
    }

    #[test]
    fn test_update_and_delete_missing() {
        let repo = setup();
        let b = belt("B1", "nk5", "sk2", 0);
        assert!(matches!(repo.update(&b), Err(RepositoryError::NotFound { .. })));
        assert!(matches!(repo.delete("B1"), Err(RepositoryError::NotFound { .. })));
    }
}
