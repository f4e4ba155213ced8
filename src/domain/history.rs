// ==========================================
// 输送带胶料批次台账 - 历史快照
// ==========================================
// 只追加；生产日期首次写入时更新一次
// 非权威状态，仅用于追溯
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 批次创建快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchHistoryRecord {
    pub history_id: String,
    pub batch_id: String,
    pub compound_code: String,
    pub batch_date: NaiveDate,
    pub batches: u32,
    pub weight_per_batch: f64,
    pub total_inventory: f64,
    pub cover_produced_on: Option<NaiveDate>,
    pub skim_produced_on: Option<NaiveDate>,
    pub snapshot_json: JsonValue,
    pub recorded_at: NaiveDateTime,
}

/// 皮带创建快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeltHistoryRecord {
    pub history_id: String,
    pub belt_id: String,
    pub belt_number: String,
    pub snapshot_json: JsonValue,
    pub recorded_at: NaiveDateTime,
}
