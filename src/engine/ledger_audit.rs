// ==========================================
// 输送带胶料批次台账 - 台账审计
// ==========================================
// 校验:
// 1. 每个批次 inventory_remaining + consumed == total_inventory，且均 ≥ 0
// 2. 每个批次的 consumed == 所有皮带对该批次 consumedKg 声明之和
// 3. 皮带声明引用的批次必须存在
// 违规只汇报，不修复
// ==========================================

use crate::domain::types::{CompoundRole, QUANTITY_EPSILON};
use crate::engine::error::LedgerResult;
use crate::repository::{BeltRepository, CompoundBatchRepository};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditViolation {
    /// 批次库存恒等式不成立
    BatchInvariant {
        batch_id: String,
        total_inventory: f64,
        inventory_remaining: f64,
        consumed: f64,
    },
    /// 批次 consumed 与皮带声明合计不一致
    ClaimMismatch {
        batch_id: String,
        consumed: f64,
        claimed: f64,
    },
    /// 皮带声明引用了不存在的批次
    DanglingClaim {
        belt_id: String,
        role: CompoundRole,
        batch_id: String,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditReport {
    pub batches_checked: usize,
    pub belts_checked: usize,
    pub violations: Vec<AuditViolation>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

pub struct LedgerAuditor {
    batch_repo: Arc<CompoundBatchRepository>,
    belt_repo: Arc<BeltRepository>,
}

impl LedgerAuditor {
    pub fn new(batch_repo: Arc<CompoundBatchRepository>, belt_repo: Arc<BeltRepository>) -> Self {
        Self {
            batch_repo,
            belt_repo,
        }
    }

    pub fn audit(&self) -> LedgerResult<AuditReport> {
        let batches = self.batch_repo.list_all()?;
        let belts = self.belt_repo.list_chronological()?;

        let mut report = AuditReport {
            batches_checked: batches.len(),
            belts_checked: belts.len(),
            violations: Vec::new(),
        };

        let mut claimed: HashMap<&str, f64> = HashMap::new();
        for belt in &belts {
            for role in CompoundRole::ALL {
                for usage in belt.batches_used(role) {
                    *claimed.entry(usage.batch_id.as_str()).or_insert(0.0) += usage.consumed_kg;
                }
            }
        }

        for batch in &batches {
            if !batch.invariant_holds() {
                report.violations.push(AuditViolation::BatchInvariant {
                    batch_id: batch.batch_id.clone(),
                    total_inventory: batch.total_inventory,
                    inventory_remaining: batch.inventory_remaining,
                    consumed: batch.consumed,
                });
            }

            let sum = claimed.remove(batch.batch_id.as_str()).unwrap_or(0.0);
            if (sum - batch.consumed).abs() > QUANTITY_EPSILON {
                report.violations.push(AuditViolation::ClaimMismatch {
                    batch_id: batch.batch_id.clone(),
                    consumed: batch.consumed,
                    claimed: sum,
                });
            }
        }

        // 剩余的声明指向不存在的批次
        if !claimed.is_empty() {
            for belt in &belts {
                for role in CompoundRole::ALL {
                    for usage in belt.batches_used(role) {
                        if claimed.contains_key(usage.batch_id.as_str()) {
                            report.violations.push(AuditViolation::DanglingClaim {
                                belt_id: belt.belt_id.clone(),
                                role,
                                batch_id: usage.batch_id.clone(),
                            });
                        }
                    }
                }
            }
        }

        if report.is_clean() {
            info!(
                batches = report.batches_checked,
                belts = report.belts_checked,
                "台账审计通过"
            );
        } else {
            warn!(
                batches = report.batches_checked,
                belts = report.belts_checked,
                violations = report.violations.len(),
                "台账审计发现违规"
            );
        }
        Ok(report)
    }
}
