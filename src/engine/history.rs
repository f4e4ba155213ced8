// ==========================================
// 输送带胶料批次台账 - 历史记录器
// ==========================================
// 职责: 定义历史快照写入 trait，引擎只依赖 trait
// 说明: 历史记录是日志型下游，写入失败只告警，不影响台账
// ==========================================

use crate::domain::belt::Belt;
use crate::domain::compound::CompoundBatch;
use crate::domain::history::{BatchHistoryRecord, BeltHistoryRecord};
use crate::domain::types::CompoundRole;
use crate::repository::error::RepositoryResult;
use crate::repository::HistoryRepository;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;

// ==========================================
// HistoryRecorder Trait
// ==========================================
pub trait HistoryRecorder: Send + Sync {
    /// 批次创建
    fn batch_created(&self, batch: &CompoundBatch) -> RepositoryResult<()>;

    /// 皮带创建
    fn belt_created(&self, belt: &Belt) -> RepositoryResult<()>;

    /// 批次某角色生产日期首次写入
    fn production_date_stamped(
        &self,
        batch_id: &str,
        role: CompoundRole,
        produced_on: NaiveDate,
    ) -> RepositoryResult<()>;
}

// ==========================================
// SqliteHistoryRecorder - 写入历史快照表
// ==========================================
pub struct SqliteHistoryRecorder {
    repo: Arc<HistoryRepository>,
}

impl SqliteHistoryRecorder {
    pub fn new(repo: Arc<HistoryRepository>) -> Self {
        Self { repo }
    }
}

impl HistoryRecorder for SqliteHistoryRecorder {
    fn batch_created(&self, batch: &CompoundBatch) -> RepositoryResult<()> {
        let record = BatchHistoryRecord {
            history_id: uuid::Uuid::new_v4().to_string(),
            batch_id: batch.batch_id.clone(),
            compound_code: batch.compound_code.clone(),
            batch_date: batch.batch_date,
            batches: batch.batches,
            weight_per_batch: batch.weight_per_batch,
            total_inventory: batch.total_inventory,
            cover_produced_on: batch.cover_produced_on,
            skim_produced_on: batch.skim_produced_on,
            snapshot_json: serde_json::to_value(batch)?,
            recorded_at: Utc::now().naive_utc(),
        };
        self.repo.insert_batch_history(&record)
    }

    fn belt_created(&self, belt: &Belt) -> RepositoryResult<()> {
        let record = BeltHistoryRecord {
            history_id: uuid::Uuid::new_v4().to_string(),
            belt_id: belt.belt_id.clone(),
            belt_number: belt.belt_number.clone(),
            snapshot_json: serde_json::to_value(belt)?,
            recorded_at: Utc::now().naive_utc(),
        };
        self.repo.insert_belt_history(&record)
    }

    fn production_date_stamped(
        &self,
        batch_id: &str,
        role: CompoundRole,
        produced_on: NaiveDate,
    ) -> RepositoryResult<()> {
        self.repo
            .stamp_batch_produced_on(batch_id, role, produced_on)
            .map(|_| ())
    }
}

/// 空操作记录器
///
/// 用于不需要历史快照的场景（如单元测试）
#[derive(Debug, Clone, Default)]
pub struct NoOpHistoryRecorder;

impl HistoryRecorder for NoOpHistoryRecorder {
    fn batch_created(&self, batch: &CompoundBatch) -> RepositoryResult<()> {
        tracing::debug!(batch_id = %batch.batch_id, "NoOpHistoryRecorder: 跳过批次快照");
        Ok(())
    }

    fn belt_created(&self, belt: &Belt) -> RepositoryResult<()> {
        tracing::debug!(belt_id = %belt.belt_id, "NoOpHistoryRecorder: 跳过皮带快照");
        Ok(())
    }

    fn production_date_stamped(
        &self,
        _batch_id: &str,
        _role: CompoundRole,
        _produced_on: NaiveDate,
    ) -> RepositoryResult<()> {
        Ok(())
    }
}
