// ==========================================
// 输送带胶料批次台账 - 引擎层错误类型
// ==========================================
// 传播规则: 底层冲突先在本地有限重试，超限后原样上抛
// 编排器不吞错误：皮带变更要么整体成功，要么整体失败
// ==========================================

use crate::repository::error::RepositoryError;
use chrono::NaiveDate;
use thiserror::Error;

/// 台账引擎错误类型
#[derive(Error, Debug)]
pub enum LedgerError {
    /// 输入校验失败（变更前拒绝）
    #[error("输入校验失败: {0}")]
    Validation(String),

    /// 主数据/批次/皮带不存在
    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    /// 日期搜索或批次生成超出上限
    #[error("容量耗尽: {0}")]
    CapacityExhausted(String),

    /// 条件更新重试耗尽
    #[error("并发冲突重试耗尽: batch_id={batch_id}, attempts={attempts}")]
    ConcurrencyConflict { batch_id: String, attempts: u32 },

    /// 覆盖胶/贴胶日期在上限内无法错开
    #[error("生产日期冲突: cover={cover}, skim={skim}")]
    DateCollision { cover: NaiveDate, skim: NaiveDate },

    /// 库存恒等式将被破坏（consumed 变负等）
    #[error("库存不变量违反: {0}")]
    InventoryInvariant(String),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl LedgerError {
    pub fn not_found(entity: &str, id: impl Into<String>) -> Self {
        LedgerError::NotFound {
            entity: entity.to_string(),
            id: id.into(),
        }
    }
}

// 仓储层 NotFound 直接提升为台账 NotFound，其余保持原样
impl From<RepositoryError> for LedgerError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => LedgerError::NotFound { entity, id },
            other => LedgerError::Repository(other),
        }
    }
}

/// Result 类型别名
pub type LedgerResult<T> = Result<T, LedgerError>;
