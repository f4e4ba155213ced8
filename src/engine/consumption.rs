// ==========================================
// 输送带胶料批次台账 - FIFO 消耗引擎
// ==========================================
// 规则:
// 1. 取该胶料剩余 > 0 且日期最早的批次（严格 FIFO）
// 2. 无可用批次 → 自动建批
// 3. 条件扣减 min(剩余需求, 批次剩余)；失败 → 重读实时库存，退避重试（有限次）
// 4. 角色生产日期仅在该批次首次被该角色消耗时写入
// 保证: 返回的 consumedKg 合计 == 需求量（误差 ≤ QUANTITY_EPSILON），否则整体报错，不欠分配
// ==========================================

use crate::config::LedgerConfig;
use crate::domain::compound::BatchUsage;
use crate::domain::types::{CompoundRole, QUANTITY_EPSILON};
use crate::engine::batch_generator::BatchGenerator;
use crate::engine::error::{LedgerError, LedgerResult};
use crate::engine::history::HistoryRecorder;
use crate::repository::CompoundBatchRepository;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

// ==========================================
// ConsumptionRequest - 消耗请求
// ==========================================
#[derive(Debug, Clone)]
pub struct ConsumptionRequest {
    pub compound_code: String,
    pub required_kg: f64,
    /// 自动建批的期望日期
    pub preferred_date: NaiveDate,
    /// 角色生产日期（首次消耗时写入批次）
    pub produced_on: Option<NaiveDate>,
    pub role: Option<CompoundRole>,
}

impl ConsumptionRequest {
    pub fn new(compound_code: impl Into<String>, required_kg: f64, preferred_date: NaiveDate) -> Self {
        Self {
            compound_code: compound_code.into(),
            required_kg,
            preferred_date,
            produced_on: None,
            role: None,
        }
    }

    pub fn for_role(mut self, role: CompoundRole, produced_on: NaiveDate) -> Self {
        self.role = Some(role);
        self.produced_on = Some(produced_on);
        self
    }
}

// ==========================================
// ConsumptionOutcome - 消耗结果
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ConsumptionOutcome {
    pub batches_used: Vec<BatchUsage>,
    /// 本次调用自动生成的批次ID
    pub generated_batch_ids: Vec<String>,
    /// 条件更新冲突次数
    pub conflicts: u32,
}

impl ConsumptionOutcome {
    pub fn total_kg(&self) -> f64 {
        crate::domain::compound::total_consumed(&self.batches_used)
    }

    fn push_usage(&mut self, batch_id: &str, kg: f64) {
        match self.batches_used.last_mut() {
            Some(last) if last.batch_id == batch_id => last.consumed_kg += kg,
            _ => self.batches_used.push(BatchUsage::new(batch_id, kg)),
        }
    }
}

// ==========================================
// FifoConsumptionEngine - FIFO 消耗引擎
// ==========================================
pub struct FifoConsumptionEngine {
    batch_repo: Arc<CompoundBatchRepository>,
    generator: BatchGenerator,
    history: Arc<dyn HistoryRecorder>,
    config: Arc<LedgerConfig>,
}

impl FifoConsumptionEngine {
    pub fn new(
        batch_repo: Arc<CompoundBatchRepository>,
        generator: BatchGenerator,
        history: Arc<dyn HistoryRecorder>,
        config: Arc<LedgerConfig>,
    ) -> Self {
        Self {
            batch_repo,
            generator,
            history,
            config,
        }
    }

    pub fn generator(&self) -> &BatchGenerator {
        &self.generator
    }

    /// 按 FIFO 消耗胶料
    ///
    /// 返回的 consumedKg 合计与 required_kg 之差不超过 `QUANTITY_EPSILON`；
    /// 剩余需求 ≤ `QUANTITY_EPSILON` 即视为已满足
    ///
    /// # 错误
    /// - `Validation`: 需求量为负或非有限值
    /// - `NotFound`: 需要建批但主数据缺失
    /// - `CapacityExhausted`: 自动建批数超出单次上限 / 日期搜索超限
    /// - `ConcurrencyConflict`: 条件更新重试耗尽
    pub fn consume(&self, request: &ConsumptionRequest) -> LedgerResult<ConsumptionOutcome> {
        if !request.required_kg.is_finite() || request.required_kg < 0.0 {
            return Err(LedgerError::Validation(format!(
                "需求量非法: compound_code={}, required_kg={}",
                request.compound_code, request.required_kg
            )));
        }

        let mut outcome = ConsumptionOutcome::default();
        let mut remaining = request.required_kg;

        while remaining > QUANTITY_EPSILON {
            let batch = match self
                .batch_repo
                .find_oldest_available(&request.compound_code, QUANTITY_EPSILON)?
            {
                Some(b) => b,
                None => {
                    if outcome.generated_batch_ids.len() as u32 >= self.config.max_generated_batches {
                        return Err(LedgerError::CapacityExhausted(format!(
                            "胶料 {} 单次消耗自动建批已达上限 {}，剩余 {:.3} kg 未分配",
                            request.compound_code, self.config.max_generated_batches, remaining
                        )));
                    }
                    let generated = self.generator.generate(
                        &request.compound_code,
                        remaining,
                        request.preferred_date,
                    )?;
                    outcome.generated_batch_ids.push(generated.batch_id.clone());
                    generated
                }
            };

            // 条件扣减；失败则重读该批次实时库存后重试
            let mut available = batch.inventory_remaining;
            loop {
                let take = remaining.min(available);
                if take <= QUANTITY_EPSILON {
                    // 该批次已被其他写者耗尽，回到 FIFO 重新选批
                    break;
                }

                if self.batch_repo.try_consume(&batch.batch_id, take)? {
                    debug!(
                        compound_code = %request.compound_code,
                        batch_id = %batch.batch_id,
                        batch_date = %batch.batch_date,
                        take_kg = take,
                        "批次扣减成功"
                    );
                    self.stamp_production_date(&batch.batch_id, request)?;
                    outcome.push_usage(&batch.batch_id, take);
                    remaining -= take;
                    break;
                }

                outcome.conflicts += 1;
                if outcome.conflicts > self.config.max_conflict_retries {
                    return Err(LedgerError::ConcurrencyConflict {
                        batch_id: batch.batch_id.clone(),
                        attempts: outcome.conflicts,
                    });
                }
                warn!(
                    batch_id = %batch.batch_id,
                    attempt = outcome.conflicts,
                    wanted_kg = take,
                    "条件扣减失败，重读库存后重试"
                );
                std::thread::sleep(Duration::from_millis(
                    self.config.retry_backoff_ms * u64::from(outcome.conflicts),
                ));

                available = self
                    .batch_repo
                    .find_by_id(&batch.batch_id)?
                    .ok_or_else(|| LedgerError::not_found("CompoundBatch", batch.batch_id.clone()))?
                    .inventory_remaining;
            }
        }

        Ok(outcome)
    }

    fn stamp_production_date(&self, batch_id: &str, request: &ConsumptionRequest) -> LedgerResult<()> {
        let (Some(role), Some(produced_on)) = (request.role, request.produced_on) else {
            return Ok(());
        };

        if self.batch_repo.stamp_produced_on(batch_id, role, produced_on)? {
            debug!(batch_id = %batch_id, role = %role, produced_on = %produced_on, "写入批次生产日期");
            if let Err(e) = self.history.production_date_stamped(batch_id, role, produced_on) {
                warn!(batch_id = %batch_id, error = %e, "批次快照生产日期更新失败");
            }
        }
        Ok(())
    }
}
