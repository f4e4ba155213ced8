// ==========================================
// 输送带胶料批次台账 - 应用状态
// ==========================================
// 职责: 打开共享连接、初始化 schema、加载配置并装配引擎与 API
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::api::{BeltApi, InventoryApi, RequestValidator};
use crate::config::{ConfigManager, LedgerConfig};
use crate::db::{init_schema, open_sqlite_connection, LedgerWriteGate};
use crate::engine::{
    BatchGenerator, BeltLifecycleOrchestrator, FifoConsumptionEngine, HistoryRecorder,
    LedgerAuditor, LedgerRepositories, ProductionDateAllocator, ReversalEngine,
    SqliteHistoryRecorder, WorkingCalendar,
};
use crate::importer::CompoundMasterImporter;

/// 应用状态
///
/// 所有仓储共享一个连接；台账写操作经同一个写闸门串行
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 皮带API
    pub belt_api: Arc<BeltApi>,

    /// 库存API
    pub inventory_api: Arc<InventoryApi>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 启动时加载的台账参数
    pub ledger_config: Arc<LedgerConfig>,

    /// 仓储集合
    pub repos: LedgerRepositories,

    // ===== 引擎（只读或自带写闸门，供运维工具与集成测试直接调用）=====
    // 消耗/冲回引擎不直接暴露，经 InventoryApi 加闸调用
    pub calendar: Arc<WorkingCalendar>,
    pub allocator: Arc<ProductionDateAllocator>,
    pub orchestrator: Arc<BeltLifecycleOrchestrator>,
    pub auditor: Arc<LedgerAuditor>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径（不存在则创建）
    ///
    /// # 返回
    /// - Ok(AppState): 应用状态实例
    /// - Err(String): 初始化错误
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        Self::from_connection(db_path, conn)
    }

    /// 从已打开的连接装配（schema 幂等初始化）
    pub fn from_connection(db_path: String, conn: Connection) -> Result<Self, String> {
        init_schema(&conn).map_err(|e| format!("schema 初始化失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 配置
        // ==========================================
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let ledger_config = Arc::new(
            config_manager
                .load_ledger_config()
                .map_err(|e| format!("台账配置加载失败: {}", e))?,
        );
        tracing::info!(
            batch_count_min = ledger_config.batch_count_min,
            batch_count_max = ledger_config.batch_count_max,
            max_day_search = ledger_config.max_day_search,
            holidays = ledger_config.holidays.len(),
            "台账配置已加载"
        );

        // ==========================================
        // Repository层
        // ==========================================
        let repos = LedgerRepositories::from_connection(conn.clone());

        // ==========================================
        // Engine层
        // ==========================================
        let calendar = Arc::new(WorkingCalendar::new(ledger_config.holidays.iter().copied()));
        let history: Arc<dyn HistoryRecorder> =
            Arc::new(SqliteHistoryRecorder::new(repos.history_repo.clone()));
        let gate = LedgerWriteGate::new();

        let make_generator = || {
            BatchGenerator::new(
                repos.batch_repo.clone(),
                repos.master_repo.clone(),
                history.clone(),
                calendar.clone(),
                ledger_config.clone(),
            )
        };

        let allocator = Arc::new(ProductionDateAllocator::new(
            repos.belt_repo.clone(),
            calendar.clone(),
            ledger_config.clone(),
        ));
        let consumption = Arc::new(FifoConsumptionEngine::new(
            repos.batch_repo.clone(),
            make_generator(),
            history.clone(),
            ledger_config.clone(),
        ));
        let reversal = Arc::new(ReversalEngine::new(repos.batch_repo.clone()));
        let orchestrator = Arc::new(BeltLifecycleOrchestrator::new(
            conn.clone(),
            gate.clone(),
            repos.belt_repo.clone(),
            allocator.clone(),
            consumption.clone(),
            reversal.clone(),
            history.clone(),
            calendar.clone(),
        ));
        let auditor = Arc::new(LedgerAuditor::new(
            repos.batch_repo.clone(),
            repos.belt_repo.clone(),
        ));

        // ==========================================
        // API层
        // ==========================================
        let validator = Arc::new(RequestValidator::new(repos.master_repo.clone()));
        let belt_api = Arc::new(BeltApi::new(
            orchestrator.clone(),
            repos.belt_repo.clone(),
            validator,
        ));
        let inventory_api = Arc::new(InventoryApi::new(
            repos.master_repo.clone(),
            repos.batch_repo.clone(),
            Arc::new(make_generator()),
            consumption,
            reversal,
            auditor.clone(),
            Arc::new(CompoundMasterImporter::new(repos.master_repo.clone())),
            gate,
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            belt_api,
            inventory_api,
            config_manager,
            ledger_config,
            repos,
            calendar,
            allocator,
            orchestrator,
            auditor,
        })
    }

    /// 获取数据库路径
    pub fn get_db_path(&self) -> &str {
        &self.db_path
    }
}

// ==========================================
// 默认数据库路径辅助函数
// ==========================================

/// 获取默认数据库路径
///
/// # 返回
/// - 环境变量 BELT_COMPOUND_LEDGER_DB_PATH（若设置）
/// - 否则: 用户数据目录/belt-compound-ledger/belt_compound_ledger.db
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("BELT_COMPOUND_LEDGER_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./belt_compound_ledger.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("belt-compound-ledger");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("belt_compound_ledger.db");
        }
    }

    path.to_string_lossy().to_string()
}
