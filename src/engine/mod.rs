// ==========================================
// 输送带胶料批次台账 - 引擎层
// ==========================================
// 职责: 实现台账业务规则，不拼 SQL
// 红线: 所有循环有显式上限；失败向上报告，不静默吞掉
// ==========================================

pub mod batch_generator;
pub mod belt_lifecycle;
pub mod consumption;
pub mod error;
pub mod history;
pub mod ledger_audit;
pub mod production_date;
pub mod repositories;
pub mod reversal;
pub mod working_calendar;

// 重导出核心引擎
pub use batch_generator::{plan_batch_count, BatchGenerator};
pub use belt_lifecycle::{BeltChanges, BeltLifecycleOrchestrator, BeltMutationResult, NewBelt};
pub use consumption::{ConsumptionOutcome, ConsumptionRequest, FifoConsumptionEngine};
pub use error::{LedgerError, LedgerResult};
pub use history::{HistoryRecorder, NoOpHistoryRecorder, SqliteHistoryRecorder};
pub use ledger_audit::{AuditReport, AuditViolation, LedgerAuditor};
pub use production_date::{DateRequest, ProductionDateAllocator, ResolvedDates};
pub use repositories::LedgerRepositories;
pub use reversal::ReversalEngine;
pub use working_calendar::WorkingCalendar;
