// ==========================================
// 输送带胶料批次台账 - 皮带 API
// ==========================================
// 职责: 皮带新建/修改/删除/查询的入口
// 流程: 请求校验 → 生命周期编排器（事务内级联） → 结果
// ==========================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::validator::{normalize_code, parse_optional_date, RequestValidator};
use crate::domain::belt::{Belt, BeltSpec};
use crate::domain::types::CompoundRole;
use crate::engine::{BeltChanges, BeltLifecycleOrchestrator, BeltMutationResult, NewBelt};
use crate::repository::BeltRepository;

// ==========================================
// 请求 DTO
// ==========================================

/// 新建皮带请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateBeltRequest {
    pub belt_number: String,
    #[serde(default)]
    pub spec: BeltSpec,
    pub calendaring_date: Option<String>,
    pub cover_compound_code: Option<String>,
    pub skim_compound_code: Option<String>,
    pub cover_kg: Option<f64>,
    pub skim_kg: Option<f64>,
    pub cover_produced_on: Option<String>,
    pub skim_produced_on: Option<String>,
}

/// 修改皮带请求（None = 不修改；代码/压延日期传空串 = 清空）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateBeltRequest {
    pub belt_number: Option<String>,
    pub spec: Option<BeltSpec>,
    pub calendaring_date: Option<String>,
    pub cover_compound_code: Option<String>,
    pub skim_compound_code: Option<String>,
    pub cover_kg: Option<f64>,
    pub skim_kg: Option<f64>,
    pub cover_produced_on: Option<String>,
    pub skim_produced_on: Option<String>,
}

// ==========================================
// BeltApi
// ==========================================
pub struct BeltApi {
    orchestrator: Arc<BeltLifecycleOrchestrator>,
    belt_repo: Arc<BeltRepository>,
    validator: Arc<RequestValidator>,
}

impl BeltApi {
    pub fn new(
        orchestrator: Arc<BeltLifecycleOrchestrator>,
        belt_repo: Arc<BeltRepository>,
        validator: Arc<RequestValidator>,
    ) -> Self {
        Self {
            orchestrator,
            belt_repo,
            validator,
        }
    }

    /// 新建皮带
    pub fn create_belt(&self, request: CreateBeltRequest) -> ApiResult<BeltMutationResult> {
        self.validator.validate_belt_number(&request.belt_number)?;

        let cover_code = normalize_code(request.cover_compound_code.as_deref());
        let skim_code = normalize_code(request.skim_compound_code.as_deref());
        self.validator.validate_role_demand(
            CompoundRole::Cover,
            cover_code.as_deref(),
            request.cover_kg,
            true,
        )?;
        self.validator.validate_role_demand(
            CompoundRole::Skim,
            skim_code.as_deref(),
            request.skim_kg,
            true,
        )?;

        let input = NewBelt {
            belt_number: request.belt_number.trim().to_string(),
            spec: request.spec,
            calendaring_date: parse_optional_date("压延", request.calendaring_date.as_deref())?,
            cover_kg: if cover_code.is_some() { request.cover_kg.unwrap_or(0.0) } else { 0.0 },
            skim_kg: if skim_code.is_some() { request.skim_kg.unwrap_or(0.0) } else { 0.0 },
            cover_compound_code: cover_code,
            skim_compound_code: skim_code,
            cover_produced_on: parse_optional_date("覆盖胶生产", request.cover_produced_on.as_deref())?,
            skim_produced_on: parse_optional_date("贴胶生产", request.skim_produced_on.as_deref())?,
        };

        let result = self.orchestrator.create_belt(input)?;
        info!(
            belt_id = ?result.belt.as_ref().map(|b| b.belt_id.as_str()),
            "API: 皮带已创建"
        );
        Ok(result)
    }

    /// 修改皮带
    pub fn update_belt(&self, belt_id: &str, request: UpdateBeltRequest) -> ApiResult<BeltMutationResult> {
        let belt = self.get_belt(belt_id)?;
        if let Some(number) = &request.belt_number {
            self.validator.validate_belt_number(number)?;
        }

        let cover_change = request
            .cover_compound_code
            .as_deref()
            .map(|c| normalize_code(Some(c)));
        let skim_change = request
            .skim_compound_code
            .as_deref()
            .map(|c| normalize_code(Some(c)));

        for (role, change, kg) in [
            (CompoundRole::Cover, &cover_change, request.cover_kg),
            (CompoundRole::Skim, &skim_change, request.skim_kg),
        ] {
            let effective = match change {
                Some(code) => code.as_deref(),
                None => belt.compound_code(role),
            };
            // 新增胶料（原先没有）时必须给出需求量
            let kg_required = belt.compound_code(role).is_none();
            if effective.is_some() || kg.is_some_and(|k| k > 0.0) {
                self.validator
                    .validate_role_demand(role, effective, kg, kg_required)?;
            }
        }

        let calendaring_date = match request.calendaring_date.as_deref() {
            None => None,
            Some(raw) => Some(parse_optional_date("压延", Some(raw))?),
        };

        let changes = BeltChanges {
            belt_number: request.belt_number.map(|n| n.trim().to_string()),
            spec: request.spec,
            calendaring_date,
            cover_compound_code: cover_change,
            skim_compound_code: skim_change,
            cover_kg: request.cover_kg,
            skim_kg: request.skim_kg,
            cover_produced_on: parse_optional_date("覆盖胶生产", request.cover_produced_on.as_deref())?,
            skim_produced_on: parse_optional_date("贴胶生产", request.skim_produced_on.as_deref())?,
        };

        let result = self.orchestrator.update_belt(belt_id, changes)?;
        info!(
            belt_id = %belt_id,
            recomputed = result.recomputed,
            affected = result.affected_belt_ids.len(),
            "API: 皮带已修改"
        );
        Ok(result)
    }

    /// 删除皮带
    pub fn delete_belt(&self, belt_id: &str) -> ApiResult<BeltMutationResult> {
        if belt_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("皮带ID不能为空".to_string()));
        }
        let result = self.orchestrator.delete_belt(belt_id)?;
        info!(belt_id = %belt_id, affected = result.affected_belt_ids.len(), "API: 皮带已删除");
        Ok(result)
    }

    /// 查询单条皮带
    pub fn get_belt(&self, belt_id: &str) -> ApiResult<Belt> {
        self.belt_repo
            .find_by_id(belt_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Belt(id={})不存在", belt_id)))
    }

    /// 按创建顺序列出全部皮带
    pub fn list_belts(&self) -> ApiResult<Vec<Belt>> {
        Ok(self.belt_repo.list_chronological()?)
    }
}
