// ==========================================
// 车间执行追踪系统 - 工序领域模型
// ==========================================
// 职责: 工序实例 / 数量字段 / 报工数量三元组
// 红线: 工序只能经状态机修改, 不允许外部直接写字段
// ==========================================

use crate::domain::types::OperationStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// QuantityField - 可缺省数量
// ==========================================
// Unset 与 0 语义不同: 只有在数量核算边界才把 Unset 视为 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<u32>", into = "Option<u32>")]
pub enum QuantityField {
    Unset,
    Value(u32),
}

impl QuantityField {
    /// 核算边界取值 (Unset -> 0)
    pub fn resolve(&self) -> u32 {
        match self {
            QuantityField::Unset => 0,
            QuantityField::Value(n) => *n,
        }
    }

    pub fn as_option(&self) -> Option<u32> {
        match self {
            QuantityField::Unset => None,
            QuantityField::Value(n) => Some(*n),
        }
    }
}

impl Default for QuantityField {
    fn default() -> Self {
        QuantityField::Unset
    }
}

impl From<Option<u32>> for QuantityField {
    fn from(value: Option<u32>) -> Self {
        match value {
            Some(n) => QuantityField::Value(n),
            None => QuantityField::Unset,
        }
    }
}

impl From<QuantityField> for Option<u32> {
    fn from(value: QuantityField) -> Self {
        value.as_option()
    }
}

impl From<u32> for QuantityField {
    fn from(value: u32) -> Self {
        QuantityField::Value(value)
    }
}

// ==========================================
// QuantitySubmission - 报工提交的数量三元组
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuantitySubmission {
    #[serde(default)]
    pub good: QuantityField,
    #[serde(default)]
    pub scrap: QuantityField,
    #[serde(default)]
    pub pending: QuantityField,
}

impl QuantitySubmission {
    pub fn new(good: u32, scrap: u32, pending: u32) -> Self {
        Self {
            good: QuantityField::Value(good),
            scrap: QuantityField::Value(scrap),
            pending: QuantityField::Value(pending),
        }
    }

    /// 核算边界: 缺省项取 0
    pub fn resolve(&self) -> ResolvedQuantities {
        ResolvedQuantities {
            good: self.good.resolve(),
            scrap: self.scrap.resolve(),
            pending: self.pending.resolve(),
        }
    }
}

/// 已落定的数量三元组
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedQuantities {
    pub good: u32,
    pub scrap: u32,
    pub pending: u32,
}

impl ResolvedQuantities {
    /// 三元组合计 (u64 防溢出)
    pub fn total(&self) -> u64 {
        self.good as u64 + self.scrap as u64 + self.pending as u64
    }
}

// ==========================================
// Operation - 工序实例
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub operation_id: String,               // 工序ID
    pub sheet_id: String,                   // 所属流转卡
    pub sequence_number: u32,               // 工序号 (来自工艺路线)
    pub process_code: String,               // 工序代码
    pub process_name: String,               // 工序名称
    pub work_center: Option<String>,        // 工作中心
    pub standard_time_minutes: f64,         // 单件标准工时 (分钟)
    pub checkpoint_token: String,           // 检查点令牌 (二维码内容)
    pub status: OperationStatus,            // 工序状态
    pub operator_id: Option<String>,        // 开工操作员
    pub start_time: Option<NaiveDateTime>,  // 开工时间
    pub end_time: Option<NaiveDateTime>,    // 完工时间
    pub quantity_good: QuantityField,       // 合格数
    pub quantity_scrap: QuantityField,      // 报废数
    pub quantity_pending: QuantityField,    // 待处理数
    pub notes: Option<String>,              // 报工备注
    pub revision: i32,                      // 乐观锁：修订号
}

impl Operation {
    pub fn is_pending(&self) -> bool {
        self.status == OperationStatus::Pending
    }

    pub fn is_completed(&self) -> bool {
        self.status == OperationStatus::Completed
    }

    /// 加工时长 (分钟), 开工与完工时间齐全时才有值
    pub fn duration_minutes(&self) -> Option<i64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_minutes()),
            _ => None,
        }
    }

    /// 已报工的数量三元组
    pub fn reported_quantities(&self) -> ResolvedQuantities {
        ResolvedQuantities {
            good: self.quantity_good.resolve(),
            scrap: self.quantity_scrap.resolve(),
            pending: self.quantity_pending.resolve(),
        }
    }
}
