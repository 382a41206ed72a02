// ==========================================
// 车间执行追踪系统 - 数量核算引擎
// ==========================================
// 职责: 校验报工数量三元组, 推导订单汇总
// 规则:
// - 投入 = 前道工序合格数 (首道工序为流转卡分配数量)
// - 合格 + 报废 + 待处理 <= 投入
// - 完工数量只在末道工序累加合格数
// - 报废数量在每道工序累加
// - 完工 + 报废 == 订单数量 时订单完工
// - 中间工序合格数为 0 时, 后续工序无投入, 随本次报工一并关闭
// 红线: 汇总溢出或破坏不变量 -> 一致性故障, 整个事务回滚
// ==========================================

use crate::domain::operation::{Operation, QuantitySubmission, ResolvedQuantities};
use crate::domain::production_order::ProductionOrder;
use crate::domain::travel_sheet::TravelSheet;
use crate::domain::types::{OperationStatus, OrderStatus};
use crate::engine::error::{EngineError, EngineResult};
use chrono::NaiveDateTime;
use serde_json::json;

/// 报工核算结果 (待调用方落库)
#[derive(Debug, Clone)]
pub struct CompletionPlan {
    /// 落定的数量三元组
    pub quantities: ResolvedQuantities,
    /// 工序投入数量
    pub intake: u32,
    /// 是否为末道工序
    pub is_final_operation: bool,
    /// 汇总后的订单
    pub order: ProductionOrder,
    /// 订单汇总或状态是否变化
    pub order_changed: bool,
    /// 因无投入而随本次报工关闭的后续工序
    pub closed_downstream: Vec<Operation>,
    /// 本工序完工后流转卡是否全部完工
    pub sheet_completed: bool,
    /// 核算说明 (JSON)
    pub reason: String,
}

// ==========================================
// ReconciliationEngine - 数量核算引擎
// ==========================================
pub struct ReconciliationEngine {
    // 无状态引擎
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self {}
    }

    /// 核算一次报工
    ///
    /// # 参数
    /// - `sheet`: 工序所属流转卡 (含全部工序)
    /// - `operation`: 报工工序 (须为进行中)
    /// - `order`: 生产订单
    /// - `submission`: 报工数量 (缺省项在此取 0)
    /// - `now`: 报工时间
    pub fn reconcile(
        &self,
        sheet: &TravelSheet,
        operation: &Operation,
        order: &ProductionOrder,
        submission: &QuantitySubmission,
        now: NaiveDateTime,
    ) -> EngineResult<CompletionPlan> {
        let intake = self.intake(sheet, operation)?;
        let quantities = self.validate_quantities(operation, intake, submission)?;
        let is_final_operation = sheet.is_final_operation(operation);
        let rolled = self.apply_rollup(order, &quantities, is_final_operation, now)?;
        let order_changed = rolled != *order;

        let closed_downstream: Vec<Operation> = if !is_final_operation && quantities.good == 0 {
            sheet
                .pending_after(operation.sequence_number)
                .into_iter()
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        let sheet_completed = sheet.operations.iter().all(|op| {
            op.operation_id == operation.operation_id
                || op.status == OperationStatus::Completed
                || closed_downstream.iter().any(|c| c.operation_id == op.operation_id)
        });

        let reason = json!({
            "operation_id": operation.operation_id,
            "sequence_number": operation.sequence_number,
            "intake": intake,
            "good": quantities.good,
            "scrap": quantities.scrap,
            "pending": quantities.pending,
            "final_operation": is_final_operation,
            "closed_downstream": closed_downstream.len(),
            "order_completed": rolled.quantity_completed,
            "order_scrapped": rolled.quantity_scrapped,
            "order_status": rolled.status.to_db_str(),
        })
        .to_string();

        Ok(CompletionPlan {
            quantities,
            intake,
            is_final_operation,
            order: rolled,
            order_changed,
            closed_downstream,
            sheet_completed,
            reason,
        })
    }

    /// 工序投入数量
    ///
    /// 进行中的工序其前道必然已完工; 否则视为一致性故障
    pub fn intake(&self, sheet: &TravelSheet, operation: &Operation) -> EngineResult<u32> {
        sheet
            .intake_quantity(operation)
            .ok_or_else(|| {
                EngineError::ConsistencyFault(format!(
                    "工序 {} (工序号 {}) 的前道工序尚未完工, 无法确定投入数量",
                    operation.operation_id, operation.sequence_number
                ))
            })
    }

    /// 校验数量三元组
    ///
    /// # 返回
    /// - `Err(QuantityOverrun)`: 合计超过投入
    pub fn validate_quantities(
        &self,
        operation: &Operation,
        intake: u32,
        submission: &QuantitySubmission,
    ) -> EngineResult<ResolvedQuantities> {
        let quantities = submission.resolve();
        let received = quantities.total();

        if received > intake as u64 {
            return Err(EngineError::QuantityOverrun {
                operation_id: operation.operation_id.clone(),
                expected: intake,
                received,
            });
        }

        Ok(quantities)
    }

    /// 推导订单汇总
    ///
    /// # 规则
    /// - 末道工序: quantity_completed += good
    /// - 每道工序: quantity_scrapped += scrap
    /// - completed + scrapped == quantity 时订单完工
    pub fn apply_rollup(
        &self,
        order: &ProductionOrder,
        quantities: &ResolvedQuantities,
        is_final_operation: bool,
        now: NaiveDateTime,
    ) -> EngineResult<ProductionOrder> {
        let mut updated = order.clone();

        if is_final_operation {
            updated.quantity_completed = order
                .quantity_completed
                .checked_add(quantities.good)
                .ok_or_else(|| {
                    EngineError::ConsistencyFault(format!(
                        "订单 {} 完工数量溢出",
                        order.order_id
                    ))
                })?;
        }

        updated.quantity_scrapped = order
            .quantity_scrapped
            .checked_add(quantities.scrap)
            .ok_or_else(|| {
                EngineError::ConsistencyFault(format!("订单 {} 报废数量溢出", order.order_id))
            })?;

        if !updated.rollup_invariant_holds() {
            return Err(EngineError::ConsistencyFault(format!(
                "订单 {} 汇总越界: completed={} + scrapped={} > quantity={}",
                order.order_id, updated.quantity_completed, updated.quantity_scrapped, order.quantity
            )));
        }

        if updated.is_fully_accounted() && !updated.status.is_terminal() {
            updated.status = OrderStatus::Completed;
        }

        if updated != *order {
            updated.updated_at = now;
        }

        Ok(updated)
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::operation::QuantityField;
    use crate::domain::types::{OrderPriority, TravelSheetStatus};
    use chrono::Utc;

    fn order(quantity: u32, completed: u32, scrapped: u32) -> ProductionOrder {
        let now = Utc::now().naive_utc();
        ProductionOrder {
            order_id: "PO-1".to_string(),
            order_no: "MO-001".to_string(),
            part_number: "P-100".to_string(),
            quantity,
            quantity_completed: completed,
            quantity_scrapped: scrapped,
            status: OrderStatus::InProgress,
            due_date: None,
            priority: OrderPriority::Normal,
            created_at: now,
            updated_at: now,
            revision: 3,
        }
    }

    fn op(seq: u32, status: OperationStatus, good: Option<u32>) -> Operation {
        Operation {
            operation_id: format!("OP-{}", seq),
            sheet_id: "S1".to_string(),
            sequence_number: seq,
            process_code: format!("P{}", seq),
            process_name: format!("工序{}", seq),
            work_center: None,
            standard_time_minutes: 1.0,
            checkpoint_token: format!("T{}", seq),
            status,
            operator_id: Some("A".to_string()),
            start_time: None,
            end_time: None,
            quantity_good: QuantityField::from(good),
            quantity_scrap: QuantityField::Unset,
            quantity_pending: QuantityField::Unset,
            notes: None,
            revision: 0,
        }
    }

    fn sheet(ops: Vec<Operation>) -> TravelSheet {
        TravelSheet {
            sheet_id: "S1".to_string(),
            sheet_no: "TS-MO-001-01".to_string(),
            order_id: "PO-1".to_string(),
            batch_id: None,
            allocated_quantity: 50,
            status: TravelSheetStatus::Active,
            created_at: Utc::now().naive_utc(),
            closed_at: None,
            revision: 0,
            operations: ops,
        }
    }

    #[test]
    fn test_first_step_only_rolls_scrap() {
        let engine = ReconciliationEngine::new();
        let s = sheet(vec![
            op(10, OperationStatus::InProgress, None),
            op(20, OperationStatus::Pending, None),
        ]);
        let plan = engine
            .reconcile(
                &s,
                &s.operations[0],
                &order(50, 0, 0),
                &QuantitySubmission::new(48, 2, 0),
                Utc::now().naive_utc(),
            )
            .unwrap();

        assert_eq!(plan.intake, 50);
        assert!(!plan.is_final_operation);
        assert_eq!(plan.order.quantity_completed, 0);
        assert_eq!(plan.order.quantity_scrapped, 2);
        assert_eq!(plan.order.status, OrderStatus::InProgress);
        assert!(!plan.sheet_completed);
    }

    #[test]
    fn test_final_step_completes_order() {
        let engine = ReconciliationEngine::new();
        let s = sheet(vec![
            op(10, OperationStatus::Completed, Some(48)),
            op(20, OperationStatus::InProgress, None),
        ]);
        let plan = engine
            .reconcile(
                &s,
                &s.operations[1],
                &order(50, 0, 2),
                &QuantitySubmission::new(48, 0, 0),
                Utc::now().naive_utc(),
            )
            .unwrap();

        assert_eq!(plan.intake, 48);
        assert_eq!(plan.order.quantity_completed, 48);
        assert_eq!(plan.order.quantity_scrapped, 2);
        assert_eq!(plan.order.status, OrderStatus::Completed);
        assert!(plan.sheet_completed);
        assert!(plan.order_changed);
    }

    #[test]
    fn test_zero_good_closes_downstream_and_sheet() {
        let engine = ReconciliationEngine::new();
        let s = sheet(vec![
            op(10, OperationStatus::InProgress, None),
            op(20, OperationStatus::Pending, None),
            op(30, OperationStatus::Pending, None),
        ]);
        let plan = engine
            .reconcile(
                &s,
                &s.operations[0],
                &order(50, 0, 0),
                &QuantitySubmission::new(0, 50, 0),
                Utc::now().naive_utc(),
            )
            .unwrap();

        let closed: Vec<u32> = plan.closed_downstream.iter().map(|op| op.sequence_number).collect();
        assert_eq!(closed, vec![20, 30]);
        assert!(plan.sheet_completed);
        assert_eq!(plan.order.quantity_scrapped, 50);
        assert_eq!(plan.order.status, OrderStatus::Completed);
    }

    #[test]
    fn test_partial_good_keeps_downstream_open() {
        let engine = ReconciliationEngine::new();
        let s = sheet(vec![
            op(10, OperationStatus::InProgress, None),
            op(20, OperationStatus::Pending, None),
        ]);
        let plan = engine
            .reconcile(
                &s,
                &s.operations[0],
                &order(50, 0, 0),
                &QuantitySubmission::new(1, 49, 0),
                Utc::now().naive_utc(),
            )
            .unwrap();
        assert!(plan.closed_downstream.is_empty());
        assert!(!plan.sheet_completed);
    }

    #[test]
    fn test_overrun_reports_expected_and_received() {
        let engine = ReconciliationEngine::new();
        let s = sheet(vec![
            op(10, OperationStatus::Completed, Some(48)),
            op(20, OperationStatus::InProgress, None),
        ]);
        let err = engine
            .reconcile(
                &s,
                &s.operations[1],
                &order(50, 0, 2),
                &QuantitySubmission::new(50, 0, 0),
                Utc::now().naive_utc(),
            )
            .unwrap_err();

        match err {
            EngineError::QuantityOverrun {
                expected, received, ..
            } => {
                assert_eq!(expected, 48);
                assert_eq!(received, 50);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unset_fields_resolve_to_zero() {
        let engine = ReconciliationEngine::new();
        let s = sheet(vec![op(10, OperationStatus::InProgress, None)]);
        let submission = QuantitySubmission {
            good: QuantityField::Value(5),
            ..QuantitySubmission::default()
        };
        let plan = engine
            .reconcile(&s, &s.operations[0], &order(10, 0, 0), &submission, Utc::now().naive_utc())
            .unwrap();
        assert_eq!(plan.quantities, ResolvedQuantities { good: 5, scrap: 0, pending: 0 });
        assert_eq!(plan.order.quantity_completed, 5);
        assert_eq!(plan.order.status, OrderStatus::InProgress);
    }

    #[test]
    fn test_rollup_beyond_quantity_is_consistency_fault() {
        let engine = ReconciliationEngine::new();
        let quantities = ResolvedQuantities { good: 5, scrap: 0, pending: 0 };
        let err = engine
            .apply_rollup(&order(10, 8, 0), &quantities, true, Utc::now().naive_utc())
            .unwrap_err();
        assert!(matches!(err, EngineError::ConsistencyFault(_)));

        let quantities = ResolvedQuantities { good: 0, scrap: 1, pending: 0 };
        let err = engine
            .apply_rollup(&order(u32::MAX, 0, u32::MAX), &quantities, false, Utc::now().naive_utc())
            .unwrap_err();
        assert!(matches!(err, EngineError::ConsistencyFault(_)));
    }

    #[test]
    fn test_intake_unknown_is_consistency_fault() {
        let engine = ReconciliationEngine::new();
        let s = sheet(vec![
            op(10, OperationStatus::InProgress, None),
            op(20, OperationStatus::InProgress, None),
        ]);
        let err = engine.intake(&s, &s.operations[1]).unwrap_err();
        assert!(matches!(err, EngineError::ConsistencyFault(_)));
    }
}
