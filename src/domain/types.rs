// ==========================================
// 输送带胶料批次台账 - 领域类型定义
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// 数量比较容差 (kg)
pub const QUANTITY_EPSILON: f64 = 1e-6;

/// 日期存储格式
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// 时间戳存储格式（微秒精度，保证同秒内创建的皮带仍可排序）
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

// ==========================================
// 胶料角色 (Compound Role)
// ==========================================
// 每条皮带消耗两种角色的胶料，即使胶料代码相同也分别记账
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompoundRole {
    Cover, // 覆盖胶
    Skim,  // 贴胶
}

impl CompoundRole {
    pub const ALL: [CompoundRole; 2] = [CompoundRole::Cover, CompoundRole::Skim];

    pub fn as_str(&self) -> &'static str {
        match self {
            CompoundRole::Cover => "COVER",
            CompoundRole::Skim => "SKIM",
        }
    }

    /// 批次表上对应的生产日期列
    pub fn produced_on_column(&self) -> &'static str {
        match self {
            CompoundRole::Cover => "cover_produced_on",
            CompoundRole::Skim => "skim_produced_on",
        }
    }
}

impl fmt::Display for CompoundRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 批次状态 (Batch State)
// ==========================================
// Unborn → Active → Depleted；消耗趋向 Depleted，冲回趋向 Active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchState {
    Active,   // 仍有剩余库存
    Depleted, // 剩余库存为 0
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchState::Active => write!(f, "ACTIVE"),
            BatchState::Depleted => write!(f, "DEPLETED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&CompoundRole::Cover).unwrap(), "\"COVER\"");
        assert_eq!(CompoundRole::Skim.to_string(), "SKIM");
        assert_eq!(CompoundRole::Skim.produced_on_column(), "skim_produced_on");
    }
}
