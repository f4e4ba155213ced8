// ==========================================
// 输送带胶料批次台账 - 配置层
// ==========================================
// 职责: 台账运行参数管理
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod ledger_config;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use ledger_config::{default_holidays, LedgerConfig, DEFAULT_HOLIDAYS};
