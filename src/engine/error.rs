// ==========================================
// 车间执行追踪系统 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类: 输入错误 / 守卫拒绝 / 一致性故障 / 基础设施
// ==========================================

use crate::domain::types::{OrderStatus, TravelSheetStatus};
use crate::repository::error::RepositoryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ==========================================
// ErrorCategory - 错误分类
// ==========================================
// Input:          输入无法识别或格式错误, 操作员修正输入即可
// Guard:          状态机/核算守卫拒绝, 数据未变更
// Consistency:    汇总不变量被破坏, 内部故障, 事务已回滚
// Infrastructure: 数据库/锁等基础设施故障
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Input,
    Guard,
    Consistency,
    Infrastructure,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Input => "INPUT",
            ErrorCategory::Guard => "GUARD",
            ErrorCategory::Consistency => "CONSISTENCY",
            ErrorCategory::Infrastructure => "INFRASTRUCTURE",
        };
        write!(f, "{}", s)
    }
}

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    // ===== 输入错误 =====
    #[error("未知操作员: badge={badge}")]
    UnknownOperator { badge: String },

    #[error("未知检查点: token={token}")]
    UnknownCheckpoint { token: String },

    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("输入无效: {0}")]
    InvalidInput(String),

    #[error("工艺路线无效 (part_number={part_number}): {reason}")]
    InvalidRouting { part_number: String, reason: String },

    #[error("订单状态不允许该操作: order_id={order_id}, status={status}")]
    InvalidOrderState { order_id: String, status: OrderStatus },

    #[error("流转卡不在流转中: sheet_id={sheet_id}, status={status}")]
    SheetNotActive {
        sheet_id: String,
        status: TravelSheetStatus,
    },

    #[error("工序尚未开工: operation_id={operation_id}")]
    OperationNotStarted { operation_id: String },

    // ===== 守卫拒绝 =====
    #[error("工序顺序违规: operation_id={operation_id}, sequence={sequence_number}, 前道未完工工序={blocking_sequence}")]
    SequenceViolation {
        operation_id: String,
        sequence_number: u32,
        blocking_sequence: u32,
    },

    #[error("操作员不一致: operation_id={operation_id}, 开工操作员={expected_operator}, 当前操作员={actual_operator}")]
    OperatorMismatch {
        operation_id: String,
        expected_operator: String,
        actual_operator: String,
    },

    #[error("工序已完工: operation_id={operation_id}")]
    AlreadyCompleted { operation_id: String },

    #[error("报工数量超出投入: operation_id={operation_id}, 投入={expected}, 报工合计={received}")]
    QuantityOverrun {
        operation_id: String,
        expected: u32,
        received: u64,
    },

    #[error("订单已存在流转中的流转卡: order_id={order_id}, active={active_sheets}")]
    DuplicateGeneration { order_id: String, active_sheets: u32 },

    #[error("订单可分配数量不足: order_id={order_id}, 申请={requested}, 剩余={available}")]
    AllocationExhausted {
        order_id: String,
        requested: u32,
        available: u32,
    },

    // ===== 一致性故障 =====
    #[error("数量汇总一致性故障: {0}")]
    ConsistencyFault(String),

    // ===== 基础设施 =====
    #[error("实体锁获取失败: {0}")]
    LockPoisoned(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl EngineError {
    /// 错误分类
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::UnknownOperator { .. }
            | EngineError::UnknownCheckpoint { .. }
            | EngineError::NotFound { .. }
            | EngineError::InvalidInput(_)
            | EngineError::InvalidRouting { .. }
            | EngineError::InvalidOrderState { .. }
            | EngineError::SheetNotActive { .. }
            | EngineError::OperationNotStarted { .. } => ErrorCategory::Input,

            EngineError::SequenceViolation { .. }
            | EngineError::OperatorMismatch { .. }
            | EngineError::AlreadyCompleted { .. }
            | EngineError::QuantityOverrun { .. }
            | EngineError::DuplicateGeneration { .. }
            | EngineError::AllocationExhausted { .. } => ErrorCategory::Guard,

            EngineError::ConsistencyFault(_) => ErrorCategory::Consistency,

            EngineError::LockPoisoned(_) => ErrorCategory::Infrastructure,
            EngineError::Repository(e) => match e {
                RepositoryError::NotFound { .. } => ErrorCategory::Input,
                RepositoryError::CheckConstraintViolation(_) => ErrorCategory::Consistency,
                _ => ErrorCategory::Infrastructure,
            },
        }
    }
}

/// 引擎层 Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;
