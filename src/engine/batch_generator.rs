// ==========================================
// 输送带胶料批次台账 - 批次自动生成
// ==========================================
// 触发: FIFO 消耗时该胶料已无可用库存
// 规则:
// - 批数在配置区间内，按剩余需求取整: clamp(ceil(剩余/单批重), min, max)
// - 单批重 = 主数据 default_weight_per_batch
// - 日期 = preferred_date 当天或之后第一个“全局空闲”工作日
// - 并发写者抢先占用该日 → 捕获唯一约束冲突，顺延下一个工作日（有限次）
// ==========================================

use crate::config::LedgerConfig;
use crate::domain::compound::CompoundBatch;
use crate::engine::error::{LedgerError, LedgerResult};
use crate::engine::history::HistoryRecorder;
use crate::engine::working_calendar::WorkingCalendar;
use crate::repository::{CompoundBatchRepository, CompoundMasterRepository, RepositoryError};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// 计算自动建批的批数
///
/// min > max 时以 min 为准
pub fn plan_batch_count(remaining_kg: f64, weight_per_batch: f64, min: u32, max: u32) -> u32 {
    let max = max.max(min);
    let needed = (remaining_kg / weight_per_batch).ceil();
    let needed = if needed.is_finite() && needed > 0.0 {
        needed.min(f64::from(u32::MAX)) as u32
    } else {
        min
    };
    needed.clamp(min, max)
}

// ==========================================
// BatchGenerator - 批次生成器
// ==========================================
pub struct BatchGenerator {
    batch_repo: Arc<CompoundBatchRepository>,
    master_repo: Arc<CompoundMasterRepository>,
    history: Arc<dyn HistoryRecorder>,
    calendar: Arc<WorkingCalendar>,
    config: Arc<LedgerConfig>,
}

impl BatchGenerator {
    pub fn new(
        batch_repo: Arc<CompoundBatchRepository>,
        master_repo: Arc<CompoundMasterRepository>,
        history: Arc<dyn HistoryRecorder>,
        calendar: Arc<WorkingCalendar>,
        config: Arc<LedgerConfig>,
    ) -> Self {
        Self {
            batch_repo,
            master_repo,
            history,
            calendar,
            config,
        }
    }

    /// 查找 from 当天或之后第一个没有任何批次的工作日
    ///
    /// # 错误
    /// - `CapacityExhausted`: 在 max_day_search 天内找不到
    pub fn find_free_day(&self, from: NaiveDate) -> LedgerResult<NaiveDate> {
        let exhausted = || {
            LedgerError::CapacityExhausted(format!(
                "{} 起 {} 个工作日内无空闲建批日期",
                from, self.config.max_day_search
            ))
        };

        let mut day = self.calendar.snap_forward(from).ok_or_else(exhausted)?;
        for _ in 0..self.config.max_day_search {
            if !self.batch_repo.exists_by_date(day)? {
                return Ok(day);
            }
            day = self.calendar.next_working_day(day).ok_or_else(exhausted)?;
        }
        Err(exhausted())
    }

    /// 为胶料生成一个新批次并落库
    ///
    /// # 参数
    /// - compound_code: 胶料代码
    /// - remaining_kg: 当前尚未满足的需求量
    /// - preferred_date: 期望建批日期
    ///
    /// # 错误
    /// - `NotFound`: 主数据缺失
    /// - `CapacityExhausted`: 日期搜索或建批重试超限
    pub fn generate(
        &self,
        compound_code: &str,
        remaining_kg: f64,
        preferred_date: NaiveDate,
    ) -> LedgerResult<CompoundBatch> {
        let master = self
            .master_repo
            .find_by_code(compound_code)?
            .ok_or_else(|| LedgerError::not_found("CompoundMaster", compound_code))?;

        if !(master.default_weight_per_batch > 0.0) {
            return Err(LedgerError::Validation(format!(
                "胶料 {} 的默认单批重量非法: {}",
                compound_code, master.default_weight_per_batch
            )));
        }

        let batches = plan_batch_count(
            remaining_kg,
            master.default_weight_per_batch,
            self.config.batch_count_min,
            self.config.batch_count_max,
        );

        let mut day = self.find_free_day(preferred_date)?;
        for attempt in 1..=self.config.max_create_attempts {
            let batch = CompoundBatch::from_master(
                &master,
                day,
                batches,
                master.default_weight_per_batch,
                Utc::now().naive_utc(),
            );

            match self.batch_repo.insert(&batch) {
                Ok(()) => {
                    info!(
                        compound_code = %compound_code,
                        batch_id = %batch.batch_id,
                        batch_date = %day,
                        batches,
                        total_kg = batch.total_inventory,
                        "库存不足，自动生成批次"
                    );
                    if let Err(e) = self.history.batch_created(&batch) {
                        warn!(batch_id = %batch.batch_id, error = %e, "批次快照写入失败");
                    }
                    return Ok(batch);
                }
                Err(RepositoryError::UniqueConstraintViolation(msg)) => {
                    warn!(
                        compound_code = %compound_code,
                        batch_date = %day,
                        attempt,
                        detail = %msg,
                        "建批日期已被占用，顺延"
                    );
                    let next = self.calendar.next_working_day(day).ok_or_else(|| {
                        LedgerError::CapacityExhausted(format!("{} 之后无可用工作日", day))
                    })?;
                    day = self.find_free_day(next)?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LedgerError::CapacityExhausted(format!(
            "胶料 {} 建批重试 {} 次仍冲突",
            compound_code, self.config.max_create_attempts
        )))
    }

    /// 手工登记批次（自动生成之外的生产批次）
    ///
    /// 日期必须是工作日且当天尚无任何批次；单批重缺省取主数据
    ///
    /// # 错误
    /// - `NotFound`: 主数据缺失
    /// - `Validation`: 非工作日 / 批数或单批重非法 / 日期已被占用
    pub fn register(
        &self,
        compound_code: &str,
        batch_date: NaiveDate,
        batches: u32,
        weight_per_batch: Option<f64>,
    ) -> LedgerResult<CompoundBatch> {
        let master = self
            .master_repo
            .find_by_code(compound_code)?
            .ok_or_else(|| LedgerError::not_found("CompoundMaster", compound_code))?;

        if !self.calendar.is_working_day(batch_date) {
            return Err(LedgerError::Validation(format!("{} 不是工作日", batch_date)));
        }
        if batches == 0 {
            return Err(LedgerError::Validation("批数必须 >= 1".to_string()));
        }
        let weight = weight_per_batch.unwrap_or(master.default_weight_per_batch);
        if !weight.is_finite() || weight <= 0.0 {
            return Err(LedgerError::Validation(format!("单批重量非法: {}", weight)));
        }

        let batch = CompoundBatch::from_master(&master, batch_date, batches, weight, Utc::now().naive_utc());
        match self.batch_repo.insert(&batch) {
            Ok(()) => {}
            Err(RepositoryError::UniqueConstraintViolation(_)) => {
                return Err(LedgerError::Validation(format!(
                    "{} 已存在批次，每天只能有一个批次",
                    batch_date
                )));
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            compound_code = %compound_code,
            batch_id = %batch.batch_id,
            batch_date = %batch_date,
            batches,
            total_kg = batch.total_inventory,
            "手工登记批次"
        );
        if let Err(e) = self.history.batch_created(&batch) {
            warn!(batch_id = %batch.batch_id, error = %e, "批次快照写入失败");
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::compound::CompoundMaster;
    use crate::engine::history::NoOpHistoryRecorder;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn setup() -> (BatchGenerator, Arc<Mutex<Connection>>) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let master_repo = Arc::new(CompoundMasterRepository::new(conn.clone()));
        master_repo
            .upsert(&CompoundMaster {
                compound_code: "nk5".to_string(),
                compound_name: "NK5".to_string(),
                default_weight_per_batch: 90.0,
            })
            .unwrap();
        let config = Arc::new(LedgerConfig::default());
        let generator = BatchGenerator::new(
            Arc::new(CompoundBatchRepository::new(conn.clone())),
            master_repo,
            Arc::new(NoOpHistoryRecorder),
            Arc::new(WorkingCalendar::new(config.holidays.clone())),
            config,
        );
        (generator, conn)
    }

    #[test]
    fn test_generate_moves_to_next_day_on_unique_clash() {
        let (generator, conn) = setup();
        // 模拟另一写者在 find_free_day 之后、insert 之前抢占 03-03
        conn.lock()
            .unwrap()
            .execute_batch(
                r#"
                CREATE TRIGGER squat_first_day BEFORE INSERT ON compound_batch
                WHEN NEW.batch_date = '2025-03-03' AND NEW.compound_code <> 'other'
                BEGIN
                    INSERT INTO compound_batch (
                        batch_id, compound_code, compound_name, batch_date, batches,
                        weight_per_batch, total_inventory, inventory_remaining, consumed,
                        created_at, updated_at
                    ) VALUES (
                        'other-' || NEW.batch_id, 'other', 'other', NEW.batch_date, 1,
                        1, 1, 1, 0, NEW.created_at, NEW.created_at
                    );
                END;
                "#,
            )
            .unwrap();

        assert_eq!(generator.find_free_day(d(2025, 3, 3)).unwrap(), d(2025, 3, 3));
        let batch = generator.generate("nk5", 100.0, d(2025, 3, 3)).unwrap();
        assert_eq!(batch.batch_date, d(2025, 3, 4));
        assert_eq!(batch.batches, 2);
    }

    #[test]
    fn test_generate_gives_up_after_max_attempts() {
        let (generator, conn) = setup();
        // 每个日期都被抢占
        conn.lock()
            .unwrap()
            .execute_batch(
                r#"
                CREATE TRIGGER squat_every_day BEFORE INSERT ON compound_batch
                WHEN NEW.compound_code <> 'other'
                BEGIN
                    INSERT INTO compound_batch (
                        batch_id, compound_code, compound_name, batch_date, batches,
                        weight_per_batch, total_inventory, inventory_remaining, consumed,
                        created_at, updated_at
                    ) VALUES (
                        'other-' || NEW.batch_id, 'other', 'other', NEW.batch_date, 1,
                        1, 1, 1, 0, NEW.created_at, NEW.created_at
                    );
                END;
                "#,
            )
            .unwrap();

        let err = generator.generate("nk5", 10.0, d(2025, 3, 3)).unwrap_err();
        assert!(matches!(err, LedgerError::CapacityExhausted(_)));
    }

    #[test]
    fn test_plan_batch_count_rounds_up() {
        assert_eq!(plan_batch_count(200.0, 90.0, 1, 10), 3);
        assert_eq!(plan_batch_count(90.0, 90.0, 1, 10), 1);
    }

    #[test]
    fn test_plan_batch_count_clamps() {
        assert_eq!(plan_batch_count(5000.0, 90.0, 1, 10), 10);
        assert_eq!(plan_batch_count(10.0, 90.0, 2, 10), 2);
        assert_eq!(plan_batch_count(f64::NAN, 90.0, 2, 10), 2);
    }

    #[test]
    fn test_plan_batch_count_inverted_range() {
        assert_eq!(plan_batch_count(10.0, 90.0, 5, 2), 5);
        assert_eq!(plan_batch_count(5000.0, 90.0, 5, 2), 5);
    }
}
