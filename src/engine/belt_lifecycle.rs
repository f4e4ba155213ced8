// ==========================================
// 输送带胶料批次台账 - 皮带生命周期编排器
// ==========================================
// 状态: 无 → 已创建(已消耗) → [已更新]* → 已删除(已冲回)
// 职责: 协调日期分配、FIFO 消耗、冲回与级联重算
// 红线:
// - FIFO 按批次日期排序，任何对历史消耗的乱序修改都会影响之后所有皮带
//   → 受影响后缀必须完整冲回并按时间顺序重放
// - 级联整体运行在一个 BEGIN IMMEDIATE 事务内，中途失败整体回滚
// - 同一共享连接上只有一个写者
// ==========================================

use crate::db::{LedgerTransaction, LedgerWriteGate};
use crate::domain::belt::{Belt, BeltSpec};
use crate::domain::types::{CompoundRole, QUANTITY_EPSILON};
use crate::engine::consumption::{ConsumptionRequest, FifoConsumptionEngine};
use crate::engine::error::{LedgerError, LedgerResult};
use crate::engine::history::HistoryRecorder;
use crate::engine::production_date::{DateRequest, ProductionDateAllocator, ResolvedDates};
use crate::engine::reversal::ReversalEngine;
use crate::engine::working_calendar::WorkingCalendar;
use crate::repository::BeltRepository;
use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

// ==========================================
// NewBelt - 新建皮带输入
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct NewBelt {
    pub belt_number: String,
    pub spec: BeltSpec,
    pub calendaring_date: Option<NaiveDate>,
    pub cover_compound_code: Option<String>,
    pub skim_compound_code: Option<String>,
    pub cover_kg: f64,
    pub skim_kg: f64,
    /// 期望生产日期（缺省取压延日前一个工作日）
    pub cover_produced_on: Option<NaiveDate>,
    pub skim_produced_on: Option<NaiveDate>,
}

// ==========================================
// BeltChanges - 皮带部分更新
// ==========================================
// 外层 None = 不修改；Some(None) = 清空
#[derive(Debug, Clone, Default)]
pub struct BeltChanges {
    pub belt_number: Option<String>,
    pub spec: Option<BeltSpec>,
    pub calendaring_date: Option<Option<NaiveDate>>,
    pub cover_compound_code: Option<Option<String>>,
    pub skim_compound_code: Option<Option<String>>,
    pub cover_kg: Option<f64>,
    pub skim_kg: Option<f64>,
    pub cover_produced_on: Option<NaiveDate>,
    pub skim_produced_on: Option<NaiveDate>,
}

impl BeltChanges {
    fn compound_code(&self, role: CompoundRole) -> Option<&Option<String>> {
        match role {
            CompoundRole::Cover => self.cover_compound_code.as_ref(),
            CompoundRole::Skim => self.skim_compound_code.as_ref(),
        }
    }

    fn kg(&self, role: CompoundRole) -> Option<f64> {
        match role {
            CompoundRole::Cover => self.cover_kg,
            CompoundRole::Skim => self.skim_kg,
        }
    }

    fn produced_on(&self, role: CompoundRole) -> Option<NaiveDate> {
        match role {
            CompoundRole::Cover => self.cover_produced_on,
            CompoundRole::Skim => self.skim_produced_on,
        }
    }
}

// ==========================================
// BeltMutationResult - 变更结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeltMutationResult {
    /// 变更后的皮带（删除时为 None）
    pub belt: Option<Belt>,
    /// 被级联重算的其他皮带（按时间顺序）
    pub affected_belt_ids: Vec<String>,
    /// 本次操作自动生成的批次
    pub generated_batch_ids: Vec<String>,
    /// 是否执行了消耗重算
    pub recomputed: bool,
    pub elapsed_ms: i64,
}

/// 单个角色的目标需求
#[derive(Debug, Clone, PartialEq)]
struct RoleDemand {
    code: Option<String>,
    kg: f64,
}

impl RoleDemand {
    fn of(belt: &Belt, role: CompoundRole) -> Self {
        Self {
            code: belt.compound_code(role).map(str::to_string),
            kg: belt.required_kg(role),
        }
    }

    fn same_as(&self, other: &RoleDemand) -> bool {
        self.code == other.code && (self.kg - other.kg).abs() <= QUANTITY_EPSILON
    }
}

// ==========================================
// BeltLifecycleOrchestrator - 皮带生命周期编排器
// ==========================================
pub struct BeltLifecycleOrchestrator {
    conn: Arc<Mutex<Connection>>,
    gate: LedgerWriteGate,
    belt_repo: Arc<BeltRepository>,
    allocator: Arc<ProductionDateAllocator>,
    consumption: Arc<FifoConsumptionEngine>,
    reversal: Arc<ReversalEngine>,
    history: Arc<dyn HistoryRecorder>,
    calendar: Arc<WorkingCalendar>,
}

impl BeltLifecycleOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        gate: LedgerWriteGate,
        belt_repo: Arc<BeltRepository>,
        allocator: Arc<ProductionDateAllocator>,
        consumption: Arc<FifoConsumptionEngine>,
        reversal: Arc<ReversalEngine>,
        history: Arc<dyn HistoryRecorder>,
        calendar: Arc<WorkingCalendar>,
    ) -> Self {
        Self {
            conn,
            gate,
            belt_repo,
            allocator,
            consumption,
            reversal,
            history,
            calendar,
        }
    }

    // ==========================================
    // 创建
    // ==========================================

    /// 创建皮带：分配生产日期 → 覆盖胶/贴胶 FIFO 消耗 → 落库 → 快照
    #[instrument(skip(self, input), fields(belt_number = %input.belt_number))]
    pub fn create_belt(&self, input: NewBelt) -> LedgerResult<BeltMutationResult> {
        let started = Instant::now();
        check_demand(CompoundRole::Cover, input.cover_compound_code.as_deref(), Some(input.cover_kg))?;
        check_demand(CompoundRole::Skim, input.skim_compound_code.as_deref(), Some(input.skim_kg))?;

        let _writer = self.gate.acquire()?;
        let tx = LedgerTransaction::begin(self.conn.clone())?;

        let default_wish = self.default_wish(input.calendaring_date);
        let wish = |code: &Option<String>, explicit: Option<NaiveDate>| {
            code.as_ref().map(|_| explicit.unwrap_or(default_wish))
        };
        let dates = self.allocator.resolve(&DateRequest {
            cover_wish: wish(&input.cover_compound_code, input.cover_produced_on),
            skim_wish: wish(&input.skim_compound_code, input.skim_produced_on),
            exclude_belt_id: None,
        })?;

        let now = Utc::now().naive_utc();
        let mut belt = Belt {
            belt_id: uuid::Uuid::new_v4().to_string(),
            belt_number: input.belt_number,
            spec: input.spec,
            calendaring_date: input.calendaring_date,
            cover_compound_code: input.cover_compound_code,
            skim_compound_code: input.skim_compound_code,
            cover_produced_on: dates.cover,
            skim_produced_on: dates.skim,
            cover_batches_used: Vec::new(),
            skim_batches_used: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let mut generated = Vec::new();
        for (role, kg) in [
            (CompoundRole::Cover, input.cover_kg),
            (CompoundRole::Skim, input.skim_kg),
        ] {
            generated.extend(self.consume_role(&mut belt, role, kg)?);
        }

        self.belt_repo.insert(&belt)?;
        tx.commit()?;

        if let Err(e) = self.history.belt_created(&belt) {
            warn!(belt_id = %belt.belt_id, error = %e, "皮带快照写入失败");
        }

        info!(
            belt_id = %belt.belt_id,
            cover_kg = belt.required_kg(CompoundRole::Cover),
            skim_kg = belt.required_kg(CompoundRole::Skim),
            generated_batches = generated.len(),
            "皮带创建完成"
        );

        Ok(BeltMutationResult {
            belt: Some(belt),
            affected_belt_ids: Vec::new(),
            generated_batch_ids: generated,
            recomputed: true,
            elapsed_ms: started.elapsed().as_millis() as i64,
        })
    }

    // ==========================================
    // 更新
    // ==========================================

    /// 更新皮带
    ///
    /// 胶料代码与需求量均未变化 → 只更新元数据与日期；
    /// 否则冲回自身 → 冲回之后引用相关胶料的皮带 → 自身按新需求消耗 → 其余皮带按原需求重放
    #[instrument(skip(self, changes))]
    pub fn update_belt(&self, belt_id: &str, changes: BeltChanges) -> LedgerResult<BeltMutationResult> {
        let started = Instant::now();
        let _writer = self.gate.acquire()?;
        let tx = LedgerTransaction::begin(self.conn.clone())?;

        let mut belt = self.load_belt(belt_id)?;

        let old: Vec<RoleDemand> = CompoundRole::ALL.iter().map(|r| RoleDemand::of(&belt, *r)).collect();
        let new: Vec<RoleDemand> = CompoundRole::ALL
            .iter()
            .zip(old.iter())
            .map(|(role, prev)| {
                let code = match changes.compound_code(*role) {
                    Some(code) => code.clone(),
                    None => prev.code.clone(),
                };
                let kg = if code.is_none() {
                    0.0
                } else {
                    changes.kg(*role).unwrap_or(prev.kg)
                };
                RoleDemand { code, kg }
            })
            .collect();

        // 变更前校验：有胶料需求量必须 > 0，无胶料不得给出正需求量
        for (role, demand) in CompoundRole::ALL.iter().zip(new.iter()) {
            let kg = match demand.code {
                Some(_) => Some(demand.kg),
                None => changes.kg(*role),
            };
            check_demand(*role, demand.code.as_deref(), kg)?;
        }

        if let Some(number) = changes.belt_number.clone() {
            belt.belt_number = number;
        }
        if let Some(spec) = changes.spec.clone() {
            belt.spec = spec;
        }
        if let Some(calendaring_date) = changes.calendaring_date {
            belt.calendaring_date = calendaring_date;
        }
        belt.cover_compound_code = new[0].code.clone();
        belt.skim_compound_code = new[1].code.clone();

        let dates = self.resolve_for_update(&belt, &changes)?;
        belt.cover_produced_on = dates.cover;
        belt.skim_produced_on = dates.skim;
        belt.updated_at = Utc::now().naive_utc();

        let unchanged = old.iter().zip(new.iter()).all(|(o, n)| o.same_as(n));
        if unchanged {
            self.belt_repo.update(&belt)?;
            tx.commit()?;
            debug!(belt_id = %belt_id, "需求未变化，跳过消耗重算");
            return Ok(BeltMutationResult {
                belt: Some(belt),
                affected_belt_ids: Vec::new(),
                generated_batch_ids: Vec::new(),
                recomputed: false,
                elapsed_ms: started.elapsed().as_millis() as i64,
            });
        }

        // 受影响胶料 = 旧代码 ∪ 新代码
        let touched = touched_codes(old.iter().chain(new.iter()).filter_map(|d| d.code.as_deref()));

        // 1. 冲回自身
        for role in CompoundRole::ALL {
            self.reversal.revert(belt.batches_used(role))?;
            belt.set_batches_used(role, Vec::new());
        }

        // 2-3. 冲回之后引用相关胶料的皮带
        let affected = self.belt_repo.find_later_referencing(belt_id, &touched)?;
        info!(
            belt_id = %belt_id,
            touched = ?touched,
            affected = affected.len(),
            "开始级联重算"
        );
        self.revert_touched(&affected, &touched)?;

        // 4. 自身按新需求消耗
        let mut generated = Vec::new();
        for (role, demand) in CompoundRole::ALL.iter().zip(new.iter()) {
            generated.extend(self.consume_role(&mut belt, *role, demand.kg)?);
        }
        self.belt_repo.update(&belt)?;

        // 5-6. 其余皮带按原需求重放并落库
        let affected_ids = self.replay(affected, &touched, &mut generated)?;

        tx.commit()?;
        info!(
            belt_id = %belt_id,
            affected = affected_ids.len(),
            generated_batches = generated.len(),
            "级联重算完成"
        );

        Ok(BeltMutationResult {
            belt: Some(belt),
            affected_belt_ids: affected_ids,
            generated_batch_ids: generated,
            recomputed: true,
            elapsed_ms: started.elapsed().as_millis() as i64,
        })
    }

    // ==========================================
    // 删除
    // ==========================================

    /// 删除皮带：冲回自身与之后共享胶料的皮带，删除记录，再按时间顺序重放
    #[instrument(skip(self))]
    pub fn delete_belt(&self, belt_id: &str) -> LedgerResult<BeltMutationResult> {
        let started = Instant::now();
        let _writer = self.gate.acquire()?;
        let tx = LedgerTransaction::begin(self.conn.clone())?;

        let belt = self.load_belt(belt_id)?;
        let touched = touched_codes(
            CompoundRole::ALL
                .iter()
                .filter_map(|role| belt.compound_code(*role)),
        );

        for role in CompoundRole::ALL {
            self.reversal.revert(belt.batches_used(role))?;
        }

        let affected = if touched.is_empty() {
            Vec::new()
        } else {
            self.belt_repo.find_later_referencing(belt_id, &touched)?
        };
        info!(belt_id = %belt_id, touched = ?touched, affected = affected.len(), "删除皮带，开始级联重算");
        self.revert_touched(&affected, &touched)?;

        self.belt_repo.delete(belt_id)?;

        let mut generated = Vec::new();
        let affected_ids = self.replay(affected, &touched, &mut generated)?;

        tx.commit()?;
        info!(
            belt_id = %belt_id,
            affected = affected_ids.len(),
            generated_batches = generated.len(),
            "皮带删除完成"
        );

        Ok(BeltMutationResult {
            belt: None,
            affected_belt_ids: affected_ids,
            generated_batch_ids: generated,
            recomputed: true,
            elapsed_ms: started.elapsed().as_millis() as i64,
        })
    }

    // ==========================================
    // 内部步骤
    // ==========================================

    fn load_belt(&self, belt_id: &str) -> LedgerResult<Belt> {
        self.belt_repo
            .find_by_id(belt_id)?
            .ok_or_else(|| LedgerError::not_found("Belt", belt_id))
    }

    /// 缺省期望日期：压延日（或今天）之前的一个工作日
    fn default_wish(&self, calendaring_date: Option<NaiveDate>) -> NaiveDate {
        let base = calendaring_date.unwrap_or_else(|| Utc::now().date_naive());
        self.calendar.previous_working_day(base).unwrap_or(base)
    }

    /// 更新时的日期: 显式给出 > 已有日期 > 缺省；无胶料的角色不占日期
    fn resolve_for_update(&self, belt: &Belt, changes: &BeltChanges) -> LedgerResult<ResolvedDates> {
        let default_wish = self.default_wish(belt.calendaring_date);
        let wish = |role: CompoundRole| {
            belt.compound_code(role).map(|_| {
                changes
                    .produced_on(role)
                    .or_else(|| belt.produced_on(role))
                    .unwrap_or(default_wish)
            })
        };
        self.allocator.resolve(&DateRequest {
            cover_wish: wish(CompoundRole::Cover),
            skim_wish: wish(CompoundRole::Skim),
            exclude_belt_id: Some(belt.belt_id.clone()),
        })
    }

    /// 为皮带某角色消耗 kg，结果写回皮带；返回自动生成的批次
    fn consume_role(&self, belt: &mut Belt, role: CompoundRole, kg: f64) -> LedgerResult<Vec<String>> {
        let Some(code) = belt.compound_code(role).map(str::to_string) else {
            belt.set_batches_used(role, Vec::new());
            return Ok(Vec::new());
        };
        if kg <= QUANTITY_EPSILON {
            belt.set_batches_used(role, Vec::new());
            return Ok(Vec::new());
        }

        let produced_on = belt.produced_on(role);
        let preferred = produced_on
            .or(belt.calendaring_date)
            .unwrap_or_else(|| Utc::now().date_naive());
        let mut request = ConsumptionRequest::new(code, kg, preferred);
        if let Some(date) = produced_on {
            request = request.for_role(role, date);
        }

        let outcome = self.consumption.consume(&request)?;
        debug!(
            belt_id = %belt.belt_id,
            role = %role,
            kg,
            batches = outcome.batches_used.len(),
            "角色消耗完成"
        );
        belt.set_batches_used(role, outcome.batches_used);
        Ok(outcome.generated_batch_ids)
    }

    /// 冲回受影响皮带中引用相关胶料的角色
    fn revert_touched(&self, belts: &[Belt], touched: &[String]) -> LedgerResult<()> {
        for belt in belts.iter() {
            for role in touched_roles(belt, touched) {
                self.reversal.revert(belt.batches_used(role))?;
            }
        }
        Ok(())
    }

    /// 按时间顺序以原需求重放被冲回的角色并落库
    fn replay(
        &self,
        belts: Vec<Belt>,
        touched: &[String],
        generated: &mut Vec<String>,
    ) -> LedgerResult<Vec<String>> {
        let mut ids = Vec::with_capacity(belts.len());
        for mut belt in belts {
            for role in touched_roles(&belt, touched) {
                // batches_used 仍是冲回前的声明，合计即原需求
                let kg = belt.required_kg(role);
                generated.extend(self.consume_role(&mut belt, role, kg)?);
            }
            belt.updated_at = Utc::now().naive_utc();
            self.belt_repo.update(&belt)?;
            ids.push(belt.belt_id.clone());
        }
        Ok(ids)
    }
}

/// 单角色需求校验
fn check_demand(role: CompoundRole, code: Option<&str>, kg: Option<f64>) -> LedgerResult<()> {
    match (code, kg) {
        (Some(code), Some(k)) if !k.is_finite() || k <= 0.0 => Err(LedgerError::Validation(format!(
            "{}胶料{}的需求量必须大于0: {}",
            role, code, k
        ))),
        (Some(code), None) => Err(LedgerError::Validation(format!(
            "{}胶料{}缺少需求量",
            role, code
        ))),
        (None, Some(k)) if k != 0.0 => Err(LedgerError::Validation(format!(
            "{}未指定胶料却给出需求量: {}",
            role, k
        ))),
        _ => Ok(()),
    }
}

/// 去重后的胶料代码集合（保持首次出现顺序）
fn touched_codes<'a>(codes: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for code in codes {
        if !out.iter().any(|c| c == code) {
            out.push(code.to_string());
        }
    }
    out
}

/// 皮带中胶料代码落在集合内的角色
fn touched_roles(belt: &Belt, touched: &[String]) -> Vec<CompoundRole> {
    CompoundRole::ALL
        .iter()
        .copied()
        .filter(|role| {
            belt.compound_code(*role)
                .map(|code| touched.iter().any(|c| c == code))
                .unwrap_or(false)
        })
        .collect()
}
