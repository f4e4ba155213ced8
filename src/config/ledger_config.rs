// ==========================================
// 输送带胶料批次台账 - 台账运行参数
// ==========================================
// 所有循环（日期搜索/批次生成/冲突重试）都有显式上限
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 默认节假日（静态表，可被 calendar/holidays 覆写）
pub const DEFAULT_HOLIDAYS: &[&str] = &[
    "2025-01-01", "2025-01-26", "2025-03-14", "2025-04-18", "2025-05-01",
    "2025-08-15", "2025-10-02", "2025-10-21", "2025-12-25",
    "2026-01-01", "2026-01-26", "2026-03-04", "2026-04-03", "2026-05-01",
    "2026-08-15", "2026-10-02", "2026-11-09", "2026-12-25",
];

// ==========================================
// LedgerConfig - 台账参数快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// 自动建批时的批数下限
    pub batch_count_min: u32,
    /// 自动建批时的批数上限
    pub batch_count_max: u32,
    /// 逐日搜索的最大天数（空闲工作日 / 生产日期）
    pub max_day_search: u32,
    /// 条件更新失败后的最大重试次数
    pub max_conflict_retries: u32,
    /// 重试退避基数（毫秒，按次数线性增长）
    pub retry_backoff_ms: u64,
    /// 单次消耗调用最多自动生成的批次数
    pub max_generated_batches: u32,
    /// 建批遇到日期唯一冲突时的最大尝试次数
    pub max_create_attempts: u32,
    /// 节假日
    pub holidays: Vec<NaiveDate>,
}

impl LedgerConfig {
    /// 批数区间是否合法
    pub fn batch_range_is_valid(&self) -> bool {
        self.batch_count_min >= 1 && self.batch_count_max >= self.batch_count_min
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            batch_count_min: 1,
            batch_count_max: 10,
            max_day_search: 60,
            max_conflict_retries: 5,
            retry_backoff_ms: 10,
            max_generated_batches: 20,
            max_create_attempts: 30,
            holidays: default_holidays(),
        }
    }
}

/// 解析静态节假日表
pub fn default_holidays() -> Vec<NaiveDate> {
    DEFAULT_HOLIDAYS
        .iter()
        .filter_map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .collect()
}
