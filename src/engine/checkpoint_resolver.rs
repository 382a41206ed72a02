// ==========================================
// 车间执行追踪系统 - 检查点解析器
// ==========================================
// 职责: (工牌令牌, 检查点令牌) -> (操作员, 工序, 流转卡, 订单)
// 红线: 纯查询, 不修改任何状态
// 说明: 在调用方事务内读取, 快照与随后的状态机步骤一致
// ==========================================

use crate::domain::master_data::Operator;
use crate::domain::operation::Operation;
use crate::domain::production_order::ProductionOrder;
use crate::domain::scan::ScanEvent;
use crate::domain::travel_sheet::TravelSheet;
use crate::engine::entity_lock::{order_key, sheet_key};
use crate::engine::error::{EngineError, EngineResult};
use crate::repository::UnitOfWork;

/// 一次扫码所需的一致性快照
#[derive(Debug, Clone)]
pub struct CheckpointSnapshot {
    pub operator: Operator,
    pub operation: Operation,
    pub sheet: TravelSheet,
    pub order: ProductionOrder,
}

// ==========================================
// CheckpointResolver - 检查点解析器
// ==========================================
pub struct CheckpointResolver {
    // 无状态
}

impl CheckpointResolver {
    pub fn new() -> Self {
        Self {}
    }

    /// 解析扫码事件
    ///
    /// # 返回
    /// - `Err(InvalidInput)`: 令牌为空
    /// - `Err(UnknownOperator)`: 工牌不存在或操作员已停用
    /// - `Err(UnknownCheckpoint)`: 检查点令牌不存在
    pub fn resolve(&self, uow: &UnitOfWork, event: &ScanEvent) -> EngineResult<CheckpointSnapshot> {
        let operator = self.resolve_operator(uow, &event.badge_token)?;

        let token = event.checkpoint_token.trim();
        if token.is_empty() {
            return Err(EngineError::InvalidInput("检查点令牌为空".to_string()));
        }

        let located = uow
            .operations
            .find_by_checkpoint_token(token)?
            .ok_or_else(|| EngineError::UnknownCheckpoint {
                token: token.to_string(),
            })?;

        let (operation, sheet, order) = self.load_context(uow, &located.operation_id, &located.sheet_id)?;

        Ok(CheckpointSnapshot {
            operator,
            operation,
            sheet,
            order,
        })
    }

    /// 按工牌解析操作员 (停用视同未知)
    pub fn resolve_operator(&self, uow: &UnitOfWork, badge_token: &str) -> EngineResult<Operator> {
        let badge = badge_token.trim();
        if badge.is_empty() {
            return Err(EngineError::InvalidInput("工牌令牌为空".to_string()));
        }

        match uow.operators.find_by_badge_token(badge)? {
            Some(op) if op.active => Ok(op),
            Some(op) => {
                tracing::warn!(operator_id = %op.operator_id, "停用操作员扫码");
                Err(EngineError::UnknownOperator {
                    badge: badge.to_string(),
                })
            }
            None => Err(EngineError::UnknownOperator {
                badge: badge.to_string(),
            }),
        }
    }

    /// 按工序ID加载 (工序, 流转卡, 订单)
    pub fn resolve_operation(
        &self,
        uow: &UnitOfWork,
        operation_id: &str,
    ) -> EngineResult<(Operation, TravelSheet, ProductionOrder)> {
        let located = uow
            .operations
            .find_by_id(operation_id)?
            .ok_or_else(|| EngineError::NotFound {
                entity: "Operation".to_string(),
                id: operation_id.to_string(),
            })?;

        self.load_context(uow, &located.operation_id, &located.sheet_id)
    }

    /// 检查点令牌对应的实体锁键 (未知令牌返回空)
    pub fn lock_keys_for_checkpoint(&self, uow: &UnitOfWork, token: &str) -> EngineResult<Vec<String>> {
        match uow.operations.find_by_checkpoint_token(token.trim())? {
            Some(op) => self.lock_keys_for_sheet(uow, &op.sheet_id),
            None => Ok(Vec::new()),
        }
    }

    /// 工序对应的实体锁键 (未知工序返回空)
    pub fn lock_keys_for_operation(&self, uow: &UnitOfWork, operation_id: &str) -> EngineResult<Vec<String>> {
        match uow.operations.find_by_id(operation_id)? {
            Some(op) => self.lock_keys_for_sheet(uow, &op.sheet_id),
            None => Ok(Vec::new()),
        }
    }

    /// 流转卡及其订单的实体锁键
    pub fn lock_keys_for_sheet(&self, uow: &UnitOfWork, sheet_id: &str) -> EngineResult<Vec<String>> {
        match uow.sheets.find_by_id(sheet_id)? {
            Some(sheet) => Ok(vec![order_key(&sheet.order_id), sheet_key(&sheet.sheet_id)]),
            None => Ok(Vec::new()),
        }
    }

    fn load_context(
        &self,
        uow: &UnitOfWork,
        operation_id: &str,
        sheet_id: &str,
    ) -> EngineResult<(Operation, TravelSheet, ProductionOrder)> {
        let sheet = uow
            .sheets
            .find_by_id(sheet_id)?
            .ok_or_else(|| EngineError::NotFound {
                entity: "TravelSheet".to_string(),
                id: sheet_id.to_string(),
            })?;

        let operation = sheet
            .operation_by_id(operation_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound {
                entity: "Operation".to_string(),
                id: operation_id.to_string(),
            })?;

        let order = uow
            .orders
            .find_by_id(&sheet.order_id)?
            .ok_or_else(|| EngineError::NotFound {
                entity: "ProductionOrder".to_string(),
                id: sheet.order_id.clone(),
            })?;

        Ok((operation, sheet, order))
    }
}

impl Default for CheckpointResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ensure_schema;
    use chrono::Utc;
    use rusqlite::Connection;
    use std::sync::{Arc, Mutex};

    fn memory_uow() -> UnitOfWork {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        UnitOfWork::from_connection(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_unknown_and_inactive_operator() {
        let uow = memory_uow();
        let resolver = CheckpointResolver::new();
        uow.operators
            .create(&Operator {
                operator_id: "OPR-1".to_string(),
                badge_token: "BADGE-1".to_string(),
                display_name: "张三".to_string(),
                active: false,
            })
            .unwrap();

        let err = resolver.resolve_operator(&uow, "BADGE-X").unwrap_err();
        assert!(matches!(err, EngineError::UnknownOperator { .. }));

        let err = resolver.resolve_operator(&uow, " BADGE-1 ").unwrap_err();
        assert!(matches!(err, EngineError::UnknownOperator { .. }));

        let err = resolver.resolve_operator(&uow, "  ").unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn test_unknown_checkpoint() {
        let uow = memory_uow();
        let resolver = CheckpointResolver::new();
        uow.operators
            .create(&Operator {
                operator_id: "OPR-1".to_string(),
                badge_token: "BADGE-1".to_string(),
                display_name: "张三".to_string(),
                active: true,
            })
            .unwrap();

        let event = ScanEvent::new("BADGE-1", "NO-SUCH-TOKEN", Utc::now().naive_utc());
        let err = resolver.resolve(&uow, &event).unwrap_err();
        assert!(matches!(err, EngineError::UnknownCheckpoint { .. }));
        assert!(resolver
            .lock_keys_for_checkpoint(&uow, "NO-SUCH-TOKEN")
            .unwrap()
            .is_empty());
    }
}
