// ==========================================
// 车间执行追踪系统 - API层错误类型
// ==========================================
// 职责: 汇总仓储层/引擎层/导入层错误, 提供分类与面向操作员的提示语
// 说明: 提示语走 rust-i18n (locales/*.yml), 日志与错误 Display 使用中文技术描述
// ==========================================

use crate::engine::error::{EngineError, ErrorCategory};
use crate::i18n::t_with_args_in;
use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 执行流程错误 (输入 / 守卫 / 一致性)
    // ==========================================
    #[error(transparent)]
    Workflow(EngineError),

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 并发控制错误
    // ==========================================
    #[error("乐观锁冲突: {0}")]
    OptimisticLockFailure(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 导入错误
    // ==========================================
    #[error("工艺路线导入失败: {0}")]
    ImportError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::OptimisticLockFailure {
                entity,
                id,
                expected,
                actual,
            } => ApiError::OptimisticLockFailure(format!(
                "{}({})已被其他请求修改（期望revision={}，实际revision={}）",
                entity, id, expected, actual
            )),

            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::CheckConstraintViolation(msg) => ApiError::Workflow(
                EngineError::ConsistencyFault(format!("检查约束违反: {}", msg)),
            ),
        }
    }
}

// ==========================================
// 从 EngineError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Repository(repo_err) => repo_err.into(),
            EngineError::LockPoisoned(msg) => ApiError::InternalError(msg),
            other => ApiError::Workflow(other),
        }
    }
}

// ==========================================
// 从 ImportError 转换
// ==========================================
impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Repository(repo_err) => repo_err.into(),
            ImportError::InvalidRouting(engine_err) => engine_err.into(),
            other => ApiError::ImportError(other.to_string()),
        }
    }
}

impl ApiError {
    /// 错误分类
    pub fn category(&self) -> ErrorCategory {
        match self {
            ApiError::Workflow(e) => e.category(),
            ApiError::InvalidInput(_)
            | ApiError::NotFound(_)
            | ApiError::BusinessRuleViolation(_)
            | ApiError::ImportError(_) => ErrorCategory::Input,
            ApiError::OptimisticLockFailure(_) => ErrorCategory::Guard,
            ApiError::DatabaseError(_)
            | ApiError::DatabaseConnectionError(_)
            | ApiError::DatabaseTransactionError(_)
            | ApiError::InternalError(_)
            | ApiError::Other(_) => ErrorCategory::Infrastructure,
        }
    }

    /// 机器可读错误码 (SCREAMING_SNAKE_CASE)
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Workflow(e) => match e {
                EngineError::UnknownOperator { .. } => "UNKNOWN_OPERATOR",
                EngineError::UnknownCheckpoint { .. } => "UNKNOWN_CHECKPOINT",
                EngineError::NotFound { .. } => "NOT_FOUND",
                EngineError::InvalidInput(_) => "INVALID_INPUT",
                EngineError::InvalidRouting { .. } => "INVALID_ROUTING",
                EngineError::InvalidOrderState { .. } => "INVALID_ORDER_STATE",
                EngineError::SheetNotActive { .. } => "SHEET_NOT_ACTIVE",
                EngineError::OperationNotStarted { .. } => "OPERATION_NOT_STARTED",
                EngineError::SequenceViolation { .. } => "SEQUENCE_VIOLATION",
                EngineError::OperatorMismatch { .. } => "OPERATOR_MISMATCH",
                EngineError::AlreadyCompleted { .. } => "ALREADY_COMPLETED",
                EngineError::QuantityOverrun { .. } => "QUANTITY_OVERRUN",
                EngineError::DuplicateGeneration { .. } => "DUPLICATE_GENERATION",
                EngineError::AllocationExhausted { .. } => "ALLOCATION_EXHAUSTED",
                EngineError::ConsistencyFault(_) => "CONSISTENCY_FAULT",
                EngineError::LockPoisoned(_) | EngineError::Repository(_) => "INTERNAL",
            },
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BusinessRuleViolation(_) => "BUSINESS_RULE_VIOLATION",
            ApiError::OptimisticLockFailure(_) => "OPTIMISTIC_LOCK_FAILURE",
            ApiError::ImportError(_) => "IMPORT_ERROR",
            ApiError::DatabaseError(_)
            | ApiError::DatabaseConnectionError(_)
            | ApiError::DatabaseTransactionError(_) => "DATABASE_ERROR",
            ApiError::InternalError(_) | ApiError::Other(_) => "INTERNAL",
        }
    }

    /// 面向操作员的提示语
    ///
    /// # 参数
    /// - `locale`: 终端语言 ("zh-CN" / "en")
    pub fn operator_message(&self, locale: &str) -> String {
        let detail = self.to_string();
        match self {
            ApiError::Workflow(e) => workflow_message(locale, e, &detail),
            ApiError::InvalidInput(_) | ApiError::BusinessRuleViolation(_) | ApiError::ImportError(_) => {
                t_with_args_in(locale, "errors.invalid_input", &[("detail", &detail)])
            }
            ApiError::NotFound(msg) => t_with_args_in(locale, "errors.not_found", &[("detail", msg)]),
            _ => t_with_args_in(locale, "errors.internal", &[("detail", &detail)]),
        }
    }
}

fn workflow_message(locale: &str, err: &EngineError, detail: &str) -> String {
    match err {
        EngineError::UnknownOperator { badge } => {
            t_with_args_in(locale, "errors.unknown_operator", &[("badge", badge)])
        }
        EngineError::UnknownCheckpoint { token } => {
            t_with_args_in(locale, "errors.unknown_checkpoint", &[("token", token)])
        }
        EngineError::NotFound { entity, id } => t_with_args_in(
            locale,
            "errors.not_found",
            &[("detail", &format!("{} {}", entity, id))],
        ),
        EngineError::InvalidInput(msg) => {
            t_with_args_in(locale, "errors.invalid_input", &[("detail", msg)])
        }
        EngineError::InvalidRouting {
            part_number,
            reason,
        } => t_with_args_in(
            locale,
            "errors.invalid_routing",
            &[("part", part_number), ("reason", reason)],
        ),
        EngineError::InvalidOrderState { order_id, status } => t_with_args_in(
            locale,
            "errors.invalid_order_state",
            &[("order", order_id), ("status", status.to_db_str())],
        ),
        EngineError::SheetNotActive { sheet_id, status } => t_with_args_in(
            locale,
            "errors.sheet_not_active",
            &[("sheet", sheet_id), ("status", status.to_db_str())],
        ),
        EngineError::OperationNotStarted { operation_id } => t_with_args_in(
            locale,
            "errors.operation_not_started",
            &[("operation", operation_id)],
        ),
        EngineError::SequenceViolation {
            operation_id,
            sequence_number,
            blocking_sequence,
        } => t_with_args_in(
            locale,
            "errors.sequence_violation",
            &[
                ("operation", operation_id),
                ("sequence", &sequence_number.to_string()),
                ("blocking", &blocking_sequence.to_string()),
            ],
        ),
        EngineError::OperatorMismatch {
            operation_id,
            expected_operator,
            actual_operator,
        } => t_with_args_in(
            locale,
            "errors.operator_mismatch",
            &[
                ("operation", operation_id),
                ("expected", expected_operator),
                ("actual", actual_operator),
            ],
        ),
        EngineError::AlreadyCompleted { operation_id } => t_with_args_in(
            locale,
            "errors.already_completed",
            &[("operation", operation_id)],
        ),
        EngineError::QuantityOverrun {
            operation_id,
            expected,
            received,
        } => t_with_args_in(
            locale,
            "errors.quantity_overrun",
            &[
                ("operation", operation_id),
                ("expected", &expected.to_string()),
                ("received", &received.to_string()),
            ],
        ),
        EngineError::DuplicateGeneration {
            order_id,
            active_sheets,
        } => t_with_args_in(
            locale,
            "errors.duplicate_generation",
            &[("order", order_id), ("count", &active_sheets.to_string())],
        ),
        EngineError::AllocationExhausted {
            order_id,
            requested,
            available,
        } => t_with_args_in(
            locale,
            "errors.allocation_exhausted",
            &[
                ("order", order_id),
                ("requested", &requested.to_string()),
                ("available", &available.to_string()),
            ],
        ),
        EngineError::ConsistencyFault(msg) => {
            t_with_args_in(locale, "errors.consistency_fault", &[("detail", msg)])
        }
        EngineError::LockPoisoned(_) | EngineError::Repository(_) => {
            t_with_args_in(locale, "errors.internal", &[("detail", detail)])
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_conversion() {
        let err: ApiError = RepositoryError::NotFound {
            entity: "ProductionOrder".to_string(),
            id: "PO-1".to_string(),
        }
        .into();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(err.category(), ErrorCategory::Input);

        let err: ApiError = RepositoryError::CheckConstraintViolation("CHECK failed".to_string()).into();
        assert_eq!(err.category(), ErrorCategory::Consistency);
    }

    #[test]
    fn test_engine_error_conversion_unwraps_repository() {
        let err: ApiError = EngineError::Repository(RepositoryError::DatabaseQueryError(
            "disk I/O error".to_string(),
        ))
        .into();
        assert!(matches!(err, ApiError::DatabaseError(_)));
        assert_eq!(err.category(), ErrorCategory::Infrastructure);
    }

    #[test]
    fn test_operator_message_carries_quantities() {
        let err: ApiError = EngineError::QuantityOverrun {
            operation_id: "OP-20".to_string(),
            expected: 48,
            received: 50,
        }
        .into();
        assert_eq!(err.error_code(), "QUANTITY_OVERRUN");
        assert_eq!(err.category(), ErrorCategory::Guard);

        let msg = err.operator_message("en");
        assert!(msg.contains("OP-20"));
        assert!(msg.contains("48"));
        assert!(msg.contains("50"));
    }

    #[test]
    fn test_sequence_violation_message() {
        let err: ApiError = EngineError::SequenceViolation {
            operation_id: "OP-20".to_string(),
            sequence_number: 20,
            blocking_sequence: 10,
        }
        .into();
        let msg = err.operator_message("en");
        assert!(msg.starts_with("Previous operation not yet complete"));
        assert!(!err.operator_message("zh-CN").is_empty());
    }
}
