// ==========================================
// 输送带胶料批次台账 - 冲回引擎
// ==========================================
// 规则: 把已消耗量原样还回来源批次
// 红线: 批次缺失是错误而非静默跳过；consumed 不允许变负
// ==========================================

use crate::domain::compound::BatchUsage;
use crate::domain::types::QUANTITY_EPSILON;
use crate::engine::error::{LedgerError, LedgerResult};
use crate::repository::CompoundBatchRepository;
use std::sync::Arc;
use tracing::debug;

pub struct ReversalEngine {
    batch_repo: Arc<CompoundBatchRepository>,
}

impl ReversalEngine {
    pub fn new(batch_repo: Arc<CompoundBatchRepository>) -> Self {
        Self { batch_repo }
    }

    /// 冲回消耗声明
    ///
    /// # 错误
    /// - `NotFound`: 来源批次不存在
    /// - `InventoryInvariant`: 批次 consumed 不足以冲回
    pub fn revert(&self, batches_used: &[BatchUsage]) -> LedgerResult<()> {
        for usage in batches_used {
            if usage.consumed_kg <= QUANTITY_EPSILON {
                continue;
            }

            if !self.batch_repo.release(&usage.batch_id, usage.consumed_kg)? {
                return Err(LedgerError::InventoryInvariant(format!(
                    "批次 {} 冲回 {:.6} kg 将使 consumed 为负",
                    usage.batch_id, usage.consumed_kg
                )));
            }
            debug!(batch_id = %usage.batch_id, kg = usage.consumed_kg, "批次冲回");
        }
        Ok(())
    }
}
