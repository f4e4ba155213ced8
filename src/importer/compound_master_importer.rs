// ==========================================
// 输送带胶料批次台账 - 胶料主数据导入
// ==========================================
// 流程: 文件解析 → 字段映射(含别名) → 行级校验 → 批量 upsert
// 规则: 坏行带行号拒绝，合法行照常落库；同一文件内代码重复以最后一行为准
// ==========================================

use crate::domain::compound::CompoundMaster;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{RawRecord, UniversalFileParser};
use crate::repository::CompoundMasterRepository;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

const CODE_ALIASES: &[&str] = &["compound_code", "code", "胶料代码"];
const NAME_ALIASES: &[&str] = &["compound_name", "name", "胶料名称"];
const WEIGHT_ALIASES: &[&str] = &[
    "default_weight_per_batch",
    "weight_per_batch",
    "单批重量",
];

/// 被拒绝的行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedRow {
    pub row_number: usize,
    pub reason: String,
}

/// 导入汇总
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportSummary {
    pub total_rows: usize,
    pub imported: usize,
    pub rejected: Vec<RejectedRow>,
    pub elapsed_ms: i64,
}

pub struct CompoundMasterImporter {
    master_repo: Arc<CompoundMasterRepository>,
    parser: UniversalFileParser,
}

impl CompoundMasterImporter {
    pub fn new(master_repo: Arc<CompoundMasterRepository>) -> Self {
        Self {
            master_repo,
            parser: UniversalFileParser,
        }
    }

    /// 从 CSV / Excel 导入胶料主数据
    pub fn import_file<P: AsRef<Path>>(&self, file_path: P) -> ImportResult<ImportSummary> {
        let started = Instant::now();
        let path = file_path.as_ref();
        let records = self.parser.parse(path)?;

        if let Some(first) = records.first() {
            for (field, aliases) in [("compound_code", CODE_ALIASES), ("default_weight_per_batch", WEIGHT_ALIASES)] {
                if !aliases.iter().any(|a| first.contains_key(*a)) {
                    return Err(ImportError::MissingColumn(field.to_string()));
                }
            }
        }

        let mut summary = ImportSummary {
            total_rows: records.len(),
            ..ImportSummary::default()
        };
        let mut masters: Vec<CompoundMaster> = Vec::new();

        // 表头占第 1 行
        for (idx, record) in records.iter().enumerate() {
            let row_number = idx + 2;
            match map_record(record, row_number) {
                Ok(master) => {
                    masters.retain(|m| m.compound_code != master.compound_code);
                    masters.push(master);
                }
                Err(e) => {
                    warn!(row = row_number, error = %e, "胶料主数据行被拒绝");
                    summary.rejected.push(RejectedRow {
                        row_number,
                        reason: e.to_string(),
                    });
                }
            }
        }

        summary.imported = self.master_repo.upsert_batch(&masters)?;
        summary.elapsed_ms = started.elapsed().as_millis() as i64;

        info!(
            file = %path.display(),
            total = summary.total_rows,
            imported = summary.imported,
            rejected = summary.rejected.len(),
            "胶料主数据导入完成"
        );
        Ok(summary)
    }
}

fn field<'a>(record: &'a RawRecord, aliases: &[&str]) -> Option<&'a str> {
    aliases
        .iter()
        .filter_map(|a| record.get(*a))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
}

fn map_record(record: &RawRecord, row_number: usize) -> ImportResult<CompoundMaster> {
    let code = field(record, CODE_ALIASES).ok_or(ImportError::PrimaryKeyMissing(row_number))?;

    let raw_weight = field(record, WEIGHT_ALIASES).ok_or_else(|| ImportError::TypeConversionError {
        row: row_number,
        field: "default_weight_per_batch".to_string(),
        message: "值为空".to_string(),
    })?;
    let weight: f64 = raw_weight.parse().map_err(|_| ImportError::TypeConversionError {
        row: row_number,
        field: "default_weight_per_batch".to_string(),
        message: format!("无法解析为浮点数: {}", raw_weight),
    })?;
    if !weight.is_finite() || weight <= 0.0 {
        return Err(ImportError::NonPositiveValue {
            row: row_number,
            field: "default_weight_per_batch".to_string(),
            value: weight,
        });
    }

    Ok(CompoundMaster {
        compound_code: code.to_string(),
        compound_name: field(record, NAME_ALIASES).unwrap_or(code).to_string(),
        default_weight_per_batch: weight,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> RawRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_map_record_with_aliases() {
        let master = map_record(&record(&[("code", "nk5"), ("weight_per_batch", "90")]), 2).unwrap();
        assert_eq!(master.compound_code, "nk5");
        assert_eq!(master.compound_name, "nk5");
        assert_eq!(master.default_weight_per_batch, 90.0);
    }

    #[test]
    fn test_map_record_rejects_bad_weight() {
        let err = map_record(&record(&[("code", "nk5"), ("weight_per_batch", "0")]), 3).unwrap_err();
        assert!(matches!(err, ImportError::NonPositiveValue { row: 3, .. }));

        let err = map_record(&record(&[("code", "nk5"), ("weight_per_batch", "abc")]), 4).unwrap_err();
        assert!(matches!(err, ImportError::TypeConversionError { row: 4, .. }));

        let err = map_record(&record(&[("code", ""), ("weight_per_batch", "90")]), 5).unwrap_err();
        assert!(matches!(err, ImportError::PrimaryKeyMissing(5)));
    }
}
