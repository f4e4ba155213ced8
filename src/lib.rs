// ==========================================
// 输送带胶料批次台账 - 核心库
// ==========================================
// 职责: 覆盖胶/贴胶胶料批次的 FIFO 库存分配、冲回与级联重算
// 技术栈: Rust + SQLite
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 台账规则
pub mod engine;

// 导入层 - 胶料主数据
pub mod importer;

// 配置层 - 台账参数
pub mod config;

// 数据库基础设施（连接/PRAGMA/schema/事务）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型与实体
pub use domain::{
    BatchState, BatchUsage, Belt, BeltSpec, CompoundBatch, CompoundInventorySummary,
    CompoundMaster, CompoundRole,
};

// 引擎
pub use engine::{
    BeltLifecycleOrchestrator, FifoConsumptionEngine, LedgerAuditor, LedgerError,
    ProductionDateAllocator, ReversalEngine, WorkingCalendar,
};

// API
pub use api::{BeltApi, InventoryApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "输送带胶料批次台账";
