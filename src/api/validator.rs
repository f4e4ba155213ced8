// ==========================================
// 输送带胶料批次台账 - 请求校验器
// ==========================================
// 职责: 变更前拒绝非法输入（胶料代码 / 需求量 / 日期格式）
// 规则:
// - 有胶料代码 → 代码必须在主数据中存在，需求量必须 > 0
// - 无胶料代码 → 需求量必须缺省或为 0
// - 日期统一 YYYY-MM-DD
// ==========================================

use chrono::NaiveDate;
use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::domain::types::{CompoundRole, DATE_FORMAT};
use crate::repository::CompoundMasterRepository;

/// 解析 YYYY-MM-DD 日期
pub fn parse_date(field: &str, value: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        ApiError::InvalidInput(format!("{}日期格式错误（期望YYYY-MM-DD）: {}", field, value))
    })
}

/// 解析可选日期；空串视为未提供
pub fn parse_optional_date(field: &str, value: Option<&str>) -> ApiResult<Option<NaiveDate>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => parse_date(field, v).map(Some),
    }
}

/// 规范化胶料代码；空串视为无
pub fn normalize_code(code: Option<&str>) -> Option<String> {
    code.map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

// ==========================================
// RequestValidator - 请求校验器
// ==========================================
pub struct RequestValidator {
    master_repo: Arc<CompoundMasterRepository>,
}

impl RequestValidator {
    pub fn new(master_repo: Arc<CompoundMasterRepository>) -> Self {
        Self { master_repo }
    }

    /// 校验胶料代码存在
    pub fn validate_compound_code(&self, code: &str) -> ApiResult<()> {
        match self.master_repo.find_by_code(code)? {
            Some(_) => Ok(()),
            None => Err(ApiError::InvalidInput(format!("胶料代码不存在: {}", code))),
        }
    }

    /// 校验单个角色的胶料与需求量
    ///
    /// # 参数
    /// - code: 生效后的胶料代码
    /// - kg: 生效后的需求量（None 表示沿用，仅更新时允许）
    /// - kg_required: 是否必须显式给出需求量
    pub fn validate_role_demand(
        &self,
        role: CompoundRole,
        code: Option<&str>,
        kg: Option<f64>,
        kg_required: bool,
    ) -> ApiResult<()> {
        if let Some(k) = kg {
            if !k.is_finite() || k < 0.0 {
                return Err(ApiError::InvalidInput(format!("{}需求量非法: {}", role, k)));
            }
        }

        match code {
            Some(code) => {
                self.validate_compound_code(code)?;
                match kg {
                    Some(k) if k > 0.0 => Ok(()),
                    Some(k) => Err(ApiError::InvalidInput(format!(
                        "{}胶料{}的需求量必须大于0: {}",
                        role, code, k
                    ))),
                    None if kg_required => Err(ApiError::InvalidInput(format!(
                        "{}胶料{}缺少需求量",
                        role, code
                    ))),
                    None => Ok(()),
                }
            }
            None => match kg {
                Some(k) if k > 0.0 => Err(ApiError::InvalidInput(format!(
                    "{}未指定胶料却给出需求量: {}",
                    role, k
                ))),
                _ => Ok(()),
            },
        }
    }

    /// 校验皮带编号
    pub fn validate_belt_number(&self, belt_number: &str) -> ApiResult<()> {
        if belt_number.trim().is_empty() {
            return Err(ApiError::InvalidInput("皮带编号不能为空".to_string()));
        }
        Ok(())
    }
}
