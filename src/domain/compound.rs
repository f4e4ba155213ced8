// ==========================================
// 输送带胶料批次台账 - 胶料主数据与批次
// ==========================================
// 红线: inventory_remaining + consumed == total_inventory，两者均 >= 0
// ==========================================

use crate::domain::types::{BatchState, CompoundRole, QUANTITY_EPSILON};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// CompoundMaster - 胶料主数据（只读参考数据）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundMaster {
    pub compound_code: String,         // 胶料代码（唯一）
    pub compound_name: String,         // 胶料名称
    pub default_weight_per_batch: f64, // 默认单批重量 (kg)
}

// ==========================================
// CompoundBatch - 胶料批次（台账行）
// ==========================================
// 每个 (compound_code, date) 一行，且 date 全系统唯一
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompoundBatch {
    // ===== 主键 =====
    pub batch_id: String,

    // ===== 胶料 =====
    pub compound_code: String,
    pub compound_name: String, // 冗余自主数据

    // ===== 批次参数 =====
    pub batch_date: NaiveDate,
    pub batches: u32,
    pub weight_per_batch: f64,
    pub total_inventory: f64,

    // ===== 库存 =====
    pub inventory_remaining: f64,
    pub consumed: f64,

    // ===== 生产日期（首次消耗时写入，此后不可变）=====
    pub cover_produced_on: Option<NaiveDate>,
    pub skim_produced_on: Option<NaiveDate>,

    // ===== 审计 =====
    pub revision: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl CompoundBatch {
    /// 按主数据创建一个全新批次（尚未消耗）
    pub fn from_master(
        master: &CompoundMaster,
        batch_date: NaiveDate,
        batches: u32,
        weight_per_batch: f64,
        now: NaiveDateTime,
    ) -> Self {
        let total = f64::from(batches) * weight_per_batch;
        Self {
            batch_id: uuid::Uuid::new_v4().to_string(),
            compound_code: master.compound_code.clone(),
            compound_name: master.compound_name.clone(),
            batch_date,
            batches,
            weight_per_batch,
            total_inventory: total,
            inventory_remaining: total,
            consumed: 0.0,
            cover_produced_on: None,
            skim_produced_on: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> BatchState {
        if self.inventory_remaining > QUANTITY_EPSILON {
            BatchState::Active
        } else {
            BatchState::Depleted
        }
    }

    /// 库存恒等式检查
    pub fn invariant_holds(&self) -> bool {
        self.inventory_remaining >= -QUANTITY_EPSILON
            && self.consumed >= -QUANTITY_EPSILON
            && (self.inventory_remaining + self.consumed - self.total_inventory).abs()
                <= QUANTITY_EPSILON
    }

    pub fn produced_on(&self, role: CompoundRole) -> Option<NaiveDate> {
        match role {
            CompoundRole::Cover => self.cover_produced_on,
            CompoundRole::Skim => self.skim_produced_on,
        }
    }
}

// ==========================================
// BatchUsage - 皮带对批次的消耗声明
// ==========================================
// 持久化为 JSON 数组: [{ "batchId": "...", "consumedKg": 12.5 }]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUsage {
    pub batch_id: String,
    pub consumed_kg: f64,
}

impl BatchUsage {
    pub fn new(batch_id: impl Into<String>, consumed_kg: f64) -> Self {
        Self {
            batch_id: batch_id.into(),
            consumed_kg,
        }
    }
}

/// 消耗列表合计 (kg)
pub fn total_consumed(usages: &[BatchUsage]) -> f64 {
    usages.iter().map(|u| u.consumed_kg).sum()
}

// ==========================================
// CompoundInventorySummary - 单胶料库存汇总
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompoundInventorySummary {
    pub compound_code: String,
    pub total_inventory: f64,
    pub inventory_remaining: f64,
    pub consumed: f64,
    pub active_batches: usize,
    pub depleted_batches: usize,
}

impl CompoundInventorySummary {
    /// 由 FIFO 顺序的批次列表汇总
    pub fn from_batches(compound_code: &str, batches: &[CompoundBatch]) -> Self {
        let mut summary = Self {
            compound_code: compound_code.to_string(),
            total_inventory: 0.0,
            inventory_remaining: 0.0,
            consumed: 0.0,
            active_batches: 0,
            depleted_batches: 0,
        };
        for batch in batches {
            summary.total_inventory += batch.total_inventory;
            summary.inventory_remaining += batch.inventory_remaining;
            summary.consumed += batch.consumed;
            match batch.state() {
                BatchState::Active => summary.active_batches += 1,
                BatchState::Depleted => summary.depleted_batches += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master() -> CompoundMaster {
        CompoundMaster {
            compound_code: "nk5".to_string(),
            compound_name: "NK5 Cover".to_string(),
            default_weight_per_batch: 90.0,
        }
    }

    #[test]
    fn test_from_master_starts_full() {
        let now = chrono::Utc::now().naive_utc();
        let date = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let batch = CompoundBatch::from_master(&master(), date, 3, 90.0, now);

        assert_eq!(batch.total_inventory, 270.0);
        assert_eq!(batch.inventory_remaining, 270.0);
        assert_eq!(batch.consumed, 0.0);
        assert_eq!(batch.state(), BatchState::Active);
        assert!(batch.invariant_holds());
    }

    #[test]
    fn test_usage_json_shape() {
        let usage = BatchUsage::new("b1", 12.5);
        let json = serde_json::to_string(&usage).unwrap();
        assert_eq!(json, r#"{"batchId":"b1","consumedKg":12.5}"#);
        assert_eq!(total_consumed(&[usage.clone(), usage]), 25.0);
    }

    #[test]
    fn test_summary_counts_states() {
        let now = chrono::Utc::now().naive_utc();
        let d1 = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        let mut drained = CompoundBatch::from_master(&master(), d1, 1, 90.0, now);
        drained.inventory_remaining = 0.0;
        drained.consumed = 90.0;
        let fresh = CompoundBatch::from_master(&master(), d2, 2, 90.0, now);

        let summary = CompoundInventorySummary::from_batches("nk5", &[drained, fresh]);
        assert_eq!(summary.total_inventory, 270.0);
        assert_eq!(summary.consumed, 90.0);
        assert_eq!(summary.active_batches, 1);
        assert_eq!(summary.depleted_batches, 1);
    }
}
