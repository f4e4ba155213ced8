// ==========================================
// 输送带胶料批次台账 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod belt_repo;
pub mod compound_batch_repo;
pub mod compound_master_repo;
pub mod error;
pub mod history_repo;

// 重导出核心仓储
pub use belt_repo::BeltRepository;
pub use compound_batch_repo::CompoundBatchRepository;
pub use compound_master_repo::CompoundMasterRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use history_repo::HistoryRepository;
