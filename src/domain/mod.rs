// ==========================================
// 输送带胶料批次台账 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod belt;
pub mod compound;
pub mod history;
pub mod types;

// 重导出核心类型
pub use belt::{Belt, BeltSpec};
pub use compound::{
    total_consumed, BatchUsage, CompoundBatch, CompoundInventorySummary, CompoundMaster,
};
pub use history::{BatchHistoryRecord, BeltHistoryRecord};
pub use types::{BatchState, CompoundRole, DATE_FORMAT, QUANTITY_EPSILON, TIMESTAMP_FORMAT};
