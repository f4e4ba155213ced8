// ==========================================
// 输送带胶料批次台账 - 库存 API
// ==========================================
// 职责: 胶料主数据导入、手工登记批次、直接消耗/冲回、库存查询、台账审计
// 红线: 所有写操作经写闸门，与皮带级联事务串行
// ==========================================

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::validator::{normalize_code, parse_date};
use crate::db::LedgerWriteGate;
use crate::domain::compound::{BatchUsage, CompoundBatch, CompoundInventorySummary, CompoundMaster};
use crate::engine::{
    AuditReport, BatchGenerator, ConsumptionOutcome, ConsumptionRequest, FifoConsumptionEngine,
    LedgerAuditor, ReversalEngine,
};
use crate::importer::{CompoundMasterImporter, ImportSummary};
use crate::repository::{CompoundBatchRepository, CompoundMasterRepository};

/// 手工登记批次请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterBatchRequest {
    pub compound_code: String,
    pub batch_date: String,
    pub batches: u32,
    /// 缺省取主数据默认单批重
    pub weight_per_batch: Option<f64>,
}

pub struct InventoryApi {
    master_repo: Arc<CompoundMasterRepository>,
    batch_repo: Arc<CompoundBatchRepository>,
    generator: Arc<BatchGenerator>,
    consumption: Arc<FifoConsumptionEngine>,
    reversal: Arc<ReversalEngine>,
    auditor: Arc<LedgerAuditor>,
    importer: Arc<CompoundMasterImporter>,
    gate: LedgerWriteGate,
}

impl InventoryApi {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        master_repo: Arc<CompoundMasterRepository>,
        batch_repo: Arc<CompoundBatchRepository>,
        generator: Arc<BatchGenerator>,
        consumption: Arc<FifoConsumptionEngine>,
        reversal: Arc<ReversalEngine>,
        auditor: Arc<LedgerAuditor>,
        importer: Arc<CompoundMasterImporter>,
        gate: LedgerWriteGate,
    ) -> Self {
        Self {
            master_repo,
            batch_repo,
            generator,
            consumption,
            reversal,
            auditor,
            importer,
            gate,
        }
    }

    // ==========================================
    // 主数据
    // ==========================================

    /// 从 CSV / Excel 导入胶料主数据
    pub fn import_compound_masters<P: AsRef<Path>>(&self, file_path: P) -> ApiResult<ImportSummary> {
        let _writer = self.gate.acquire()?;
        Ok(self.importer.import_file(file_path)?)
    }

    pub fn list_compounds(&self) -> ApiResult<Vec<CompoundMaster>> {
        Ok(self.master_repo.list_all()?)
    }

    // ==========================================
    // 批次
    // ==========================================

    /// 手工登记批次
    pub fn register_batch(&self, request: RegisterBatchRequest) -> ApiResult<CompoundBatch> {
        let code = normalize_code(Some(&request.compound_code))
            .ok_or_else(|| ApiError::InvalidInput("胶料代码不能为空".to_string()))?;
        let batch_date = parse_date("批次", &request.batch_date)?;

        let _writer = self.gate.acquire()?;
        Ok(self
            .generator
            .register(&code, batch_date, request.batches, request.weight_per_batch)?)
    }

    /// 直接按 FIFO 消耗（不关联皮带）
    pub fn consume(&self, request: &ConsumptionRequest) -> ApiResult<ConsumptionOutcome> {
        let _writer = self.gate.acquire()?;
        Ok(self.consumption.consume(request)?)
    }

    /// 冲回直接消耗的声明
    pub fn revert(&self, batches_used: &[BatchUsage]) -> ApiResult<()> {
        let _writer = self.gate.acquire()?;
        Ok(self.reversal.revert(batches_used)?)
    }

    /// 胶料批次列表（FIFO 顺序）
    pub fn list_batches(&self, compound_code: &str) -> ApiResult<Vec<CompoundBatch>> {
        Ok(self.batch_repo.list_by_compound(compound_code)?)
    }

    pub fn get_batch(&self, batch_id: &str) -> ApiResult<CompoundBatch> {
        self.batch_repo
            .find_by_id(batch_id)?
            .ok_or_else(|| ApiError::NotFound(format!("CompoundBatch(id={})不存在", batch_id)))
    }

    // ==========================================
    // 汇总与审计
    // ==========================================

    /// 单个胶料的库存汇总
    pub fn inventory_summary(&self, compound_code: &str) -> ApiResult<CompoundInventorySummary> {
        let batches = self.batch_repo.list_by_compound(compound_code)?;
        Ok(CompoundInventorySummary::from_batches(compound_code, &batches))
    }

    /// 全部胶料的库存汇总（按代码排序）
    pub fn inventory_summaries(&self) -> ApiResult<Vec<CompoundInventorySummary>> {
        self.master_repo
            .list_all()?
            .iter()
            .map(|m| self.inventory_summary(&m.compound_code))
            .collect()
    }

    pub fn audit_ledger(&self) -> ApiResult<AuditReport> {
        Ok(self.auditor.audit()?)
    }
}
