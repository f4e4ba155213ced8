// ==========================================
// 输送带胶料批次台账 - 引擎层仓储聚合
// ==========================================
// 职责: 聚合台账引擎所需的所有 Repository，减少构造参数
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::repository::{
    BeltRepository, CompoundBatchRepository, CompoundMasterRepository, HistoryRepository,
};

/// 台账仓储集合
///
/// 所有仓储共享同一个连接，保证编排器的事务覆盖全部写入。
#[derive(Clone)]
pub struct LedgerRepositories {
    /// 胶料主数据
    pub master_repo: Arc<CompoundMasterRepository>,
    /// 胶料批次
    pub batch_repo: Arc<CompoundBatchRepository>,
    /// 皮带
    pub belt_repo: Arc<BeltRepository>,
    /// 历史快照
    pub history_repo: Arc<HistoryRepository>,
}

impl LedgerRepositories {
    /// 在共享连接上创建全部仓储
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            master_repo: Arc::new(CompoundMasterRepository::new(conn.clone())),
            batch_repo: Arc::new(CompoundBatchRepository::new(conn.clone())),
            belt_repo: Arc::new(BeltRepository::new(conn.clone())),
            history_repo: Arc::new(HistoryRepository::new(conn)),
        }
    }
}
