// ==========================================
// 输送带胶料批次台账 - 皮带领域模型
// ==========================================
// 红线: 每个角色的 batches_used 合计 == 该角色最近一次计算的需求量
// ==========================================

use crate::domain::compound::{total_consumed, BatchUsage};
use crate::domain::types::CompoundRole;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// BeltSpec - 皮带规格（表单数据，台账不解释其含义）
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeltSpec {
    pub rating: Option<String>,       // 强度等级，如 EP630/4
    pub width_mm: Option<f64>,        // 带宽
    pub plies: Option<u32>,           // 层数
    pub top_cover_mm: Option<f64>,    // 上覆盖胶厚度
    pub bottom_cover_mm: Option<f64>, // 下覆盖胶厚度
    pub length_m: Option<f64>,        // 长度
    pub customer: Option<String>,
    pub remarks: Option<String>,
}

// ==========================================
// Belt - 皮带
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Belt {
    pub belt_id: String,
    pub belt_number: String,
    pub spec: BeltSpec,
    pub calendaring_date: Option<NaiveDate>,

    // ===== 胶料 =====
    pub cover_compound_code: Option<String>,
    pub skim_compound_code: Option<String>,

    // ===== 生产日期（全系统唯一，由日期分配器给出）=====
    pub cover_produced_on: Option<NaiveDate>,
    pub skim_produced_on: Option<NaiveDate>,

    // ===== 台账声明 =====
    pub cover_batches_used: Vec<BatchUsage>,
    pub skim_batches_used: Vec<BatchUsage>,

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Belt {
    pub fn compound_code(&self, role: CompoundRole) -> Option<&str> {
        match role {
            CompoundRole::Cover => self.cover_compound_code.as_deref(),
            CompoundRole::Skim => self.skim_compound_code.as_deref(),
        }
    }

    pub fn produced_on(&self, role: CompoundRole) -> Option<NaiveDate> {
        match role {
            CompoundRole::Cover => self.cover_produced_on,
            CompoundRole::Skim => self.skim_produced_on,
        }
    }

    pub fn batches_used(&self, role: CompoundRole) -> &[BatchUsage] {
        match role {
            CompoundRole::Cover => &self.cover_batches_used,
            CompoundRole::Skim => &self.skim_batches_used,
        }
    }

    pub fn set_batches_used(&mut self, role: CompoundRole, usages: Vec<BatchUsage>) {
        match role {
            CompoundRole::Cover => self.cover_batches_used = usages,
            CompoundRole::Skim => self.skim_batches_used = usages,
        }
    }

    /// 角色当前需求量（由消耗声明合计得出）
    pub fn required_kg(&self, role: CompoundRole) -> f64 {
        total_consumed(self.batches_used(role))
    }

    /// 皮带是否引用了给定胶料代码集合中的任意一个
    pub fn references_any(&self, codes: &[String]) -> bool {
        CompoundRole::ALL.iter().any(|role| {
            self.compound_code(*role)
                .map(|code| codes.iter().any(|c| c == code))
                .unwrap_or(false)
        })
    }
}
