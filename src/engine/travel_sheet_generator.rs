// ==========================================
// 车间执行追踪系统 - 流转卡生成引擎
// ==========================================
// 职责: 生产订单 + 工艺路线 -> 流转卡 (每个工步一道工序)
// 输入: 订单 / 工艺路线 / 现有流转卡统计 / 生成策略
// 输出: 待落库的流转卡 + 下达后的订单
// 红线: Engine 不拼 SQL; 落库与事务由调用方负责
// ==========================================

use crate::config::policy::TravelSheetPolicy;
use crate::domain::master_data::RoutingStep;
use crate::domain::operation::{Operation, QuantityField};
use crate::domain::production_order::ProductionOrder;
use crate::domain::travel_sheet::TravelSheet;
use crate::domain::types::{OperationStatus, OrderStatus, TravelSheetStatus};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::token::{format_sheet_no, new_checkpoint_token, new_entity_id};
use chrono::NaiveDateTime;
use std::collections::HashSet;

/// 订单已有流转卡统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExistingSheets {
    /// 历史生成总数 (含已完工/作废)
    pub generated: u32,
    /// 流转中数量
    pub active: u32,
    /// 未作废流转卡已分配的数量合计
    pub allocated: u32,
}

// ==========================================
// TravelSheetGenerator - 流转卡生成引擎
// ==========================================
pub struct TravelSheetGenerator {
    // 无状态引擎
}

impl TravelSheetGenerator {
    pub fn new() -> Self {
        Self {}
    }

    /// 生成流转卡
    ///
    /// # 参数
    /// - `order`: 生产订单 (须为 Created / Released)
    /// - `routing`: 订单料号的工艺路线
    /// - `existing`: 订单已有流转卡统计
    /// - `policy`: 流转卡生成策略
    /// - `batch_id`: 批次号 (可选)
    /// - `quantity`: 分配数量 (缺省为订单剩余未分配数量)
    /// - `now`: 生成时间
    ///
    /// # 返回
    /// (流转卡, 下达后的订单)
    pub fn generate(
        &self,
        order: &ProductionOrder,
        routing: &[RoutingStep],
        existing: ExistingSheets,
        policy: &TravelSheetPolicy,
        batch_id: Option<String>,
        quantity: Option<u32>,
        now: NaiveDateTime,
    ) -> EngineResult<(TravelSheet, ProductionOrder)> {
        if !order.can_generate_travel_sheet() {
            return Err(EngineError::InvalidOrderState {
                order_id: order.order_id.clone(),
                status: order.status,
            });
        }

        self.validate_routing(&order.part_number, routing)?;

        if existing.active > 0 && !policy.allow_multiple_active {
            return Err(EngineError::DuplicateGeneration {
                order_id: order.order_id.clone(),
                active_sheets: existing.active,
            });
        }

        let allocated_quantity = self.allocate(order, existing, quantity)?;

        let sheet_id = new_entity_id();
        let mut operations: Vec<Operation> = routing
            .iter()
            .map(|step| Operation {
                operation_id: new_entity_id(),
                sheet_id: sheet_id.clone(),
                sequence_number: step.sequence_number,
                process_code: step.process_code.clone(),
                process_name: step.process_name.clone(),
                work_center: step.work_center.clone(),
                standard_time_minutes: step.standard_time_minutes,
                checkpoint_token: new_checkpoint_token(),
                status: OperationStatus::Pending,
                operator_id: None,
                start_time: None,
                end_time: None,
                quantity_good: QuantityField::Unset,
                quantity_scrap: QuantityField::Unset,
                quantity_pending: QuantityField::Unset,
                notes: None,
                revision: 0,
            })
            .collect();
        operations.sort_by_key(|op| op.sequence_number);

        let sheet = TravelSheet {
            sheet_no: format_sheet_no(
                &policy.sheet_number_prefix,
                &order.order_no,
                existing.generated + 1,
            ),
            sheet_id,
            order_id: order.order_id.clone(),
            batch_id: batch_id.filter(|b| !b.trim().is_empty()),
            allocated_quantity,
            status: TravelSheetStatus::Active,
            created_at: now,
            closed_at: None,
            revision: 0,
            operations,
        };

        let mut released = order.clone();
        if released.status == OrderStatus::Created {
            released.status = OrderStatus::Released;
            released.updated_at = now;
        }

        tracing::debug!(
            order_id = %order.order_id,
            sheet_no = %sheet.sheet_no,
            allocated_quantity,
            operations = sheet.operations.len(),
            "流转卡已生成"
        );

        Ok((sheet, released))
    }

    /// 计算新流转卡的分配数量
    ///
    /// # 规则
    /// - 可分配 = 订单数量 - 未作废流转卡已分配数量
    /// - 未指定数量时取全部可分配数量
    /// - 订单数量大于 0 时, 分配数量须在 (0, 可分配] 内
    pub fn allocate(
        &self,
        order: &ProductionOrder,
        existing: ExistingSheets,
        quantity: Option<u32>,
    ) -> EngineResult<u32> {
        let available = order.quantity.saturating_sub(existing.allocated);

        if quantity == Some(0) && order.quantity > 0 {
            return Err(EngineError::InvalidInput("流转卡分配数量必须大于 0".to_string()));
        }

        let requested = quantity.unwrap_or(available);
        if requested > available || (order.quantity > 0 && available == 0) {
            return Err(EngineError::AllocationExhausted {
                order_id: order.order_id.clone(),
                requested,
                available,
            });
        }

        Ok(requested)
    }

    /// 校验工艺路线
    ///
    /// # 规则
    /// - 至少一个工步
    /// - 工序号不重复
    /// - 各工步字段合法
    pub fn validate_routing(&self, part_number: &str, routing: &[RoutingStep]) -> EngineResult<()> {
        if routing.is_empty() {
            return Err(EngineError::InvalidRouting {
                part_number: part_number.to_string(),
                reason: "工艺路线没有任何工步".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for step in routing {
            if !seen.insert(step.sequence_number) {
                return Err(EngineError::InvalidRouting {
                    part_number: part_number.to_string(),
                    reason: format!("工序号重复: {}", step.sequence_number),
                });
            }
            step.validate()
                .map_err(|reason| EngineError::InvalidRouting {
                    part_number: part_number.to_string(),
                    reason,
                })?;
        }

        Ok(())
    }
}

impl Default for TravelSheetGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::OrderPriority;
    use chrono::Utc;

    fn order(status: OrderStatus) -> ProductionOrder {
        let now = Utc::now().naive_utc();
        ProductionOrder {
            order_id: "PO-1".to_string(),
            order_no: "MO-001".to_string(),
            part_number: "P-100".to_string(),
            quantity: 50,
            quantity_completed: 0,
            quantity_scrapped: 0,
            status,
            due_date: None,
            priority: OrderPriority::Normal,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    fn step(seq: u32, code: &str) -> RoutingStep {
        RoutingStep {
            part_number: "P-100".to_string(),
            sequence_number: seq,
            process_code: code.to_string(),
            process_name: code.to_string(),
            work_center: None,
            standard_time_minutes: 2.0,
        }
    }

    #[test]
    fn test_generates_one_pending_operation_per_step() {
        let gen = TravelSheetGenerator::new();
        let routing = vec![step(30, "INSP"), step(10, "CUT"), step(20, "WELD")];
        let (sheet, released) = gen
            .generate(
                &order(OrderStatus::Created),
                &routing,
                ExistingSheets::default(),
                &TravelSheetPolicy::default(),
                None,
                None,
                Utc::now().naive_utc(),
            )
            .unwrap();

        assert_eq!(sheet.operations.len(), 3);
        assert_eq!(sheet.sheet_no, "TS-MO-001-01");
        assert_eq!(
            sheet.operations.iter().map(|o| o.sequence_number).collect::<Vec<_>>(),
            vec![10, 20, 30]
        );
        assert!(sheet.operations.iter().all(|o| o.is_pending()));
        assert_eq!(sheet.lowest_open_sequence(), Some(10));
        assert_eq!(released.status, OrderStatus::Released);

        let tokens: HashSet<_> = sheet.operations.iter().map(|o| &o.checkpoint_token).collect();
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn test_empty_and_duplicate_routing_rejected() {
        let gen = TravelSheetGenerator::new();
        let policy = TravelSheetPolicy::default();
        let now = Utc::now().naive_utc();

        let err = gen
            .generate(&order(OrderStatus::Created), &[], ExistingSheets::default(), &policy, None, None, now)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRouting { .. }));

        let err = gen
            .generate(
                &order(OrderStatus::Created),
                &[step(10, "CUT"), step(10, "WELD")],
                ExistingSheets::default(),
                &policy,
                None,
                None,
                now,
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRouting { .. }));
    }

    #[test]
    fn test_duplicate_generation_depends_on_policy() {
        let gen = TravelSheetGenerator::new();
        let existing = ExistingSheets {
            generated: 1,
            active: 1,
            allocated: 20,
        };
        let now = Utc::now().naive_utc();

        let err = gen
            .generate(
                &order(OrderStatus::Released),
                &[step(10, "CUT")],
                existing,
                &TravelSheetPolicy::default(),
                None,
                None,
                now,
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateGeneration { active_sheets: 1, .. }));

        let policy = TravelSheetPolicy {
            allow_multiple_active: true,
            ..TravelSheetPolicy::default()
        };
        let (sheet, _) = gen
            .generate(
                &order(OrderStatus::Released),
                &[step(10, "CUT")],
                existing,
                &policy,
                Some("B-2".to_string()),
                None,
                now,
            )
            .unwrap();
        assert_eq!(sheet.sheet_no, "TS-MO-001-02");
        assert_eq!(sheet.batch_id.as_deref(), Some("B-2"));
        assert_eq!(sheet.allocated_quantity, 30);
    }

    #[test]
    fn test_allocation_is_bounded_by_unallocated_quantity() {
        let gen = TravelSheetGenerator::new();
        let released = order(OrderStatus::Released);
        let existing = |allocated| ExistingSheets {
            generated: 1,
            active: 1,
            allocated,
        };

        assert_eq!(gen.allocate(&released, ExistingSheets::default(), None).unwrap(), 50);
        assert_eq!(gen.allocate(&released, existing(20), Some(10)).unwrap(), 10);

        let err = gen.allocate(&released, existing(45), Some(6)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::AllocationExhausted { requested: 6, available: 5, .. }
        ));

        let err = gen.allocate(&released, existing(50), None).unwrap_err();
        assert!(matches!(err, EngineError::AllocationExhausted { available: 0, .. }));

        let err = gen.allocate(&released, ExistingSheets::default(), Some(0)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));

        let mut empty = order(OrderStatus::Created);
        empty.quantity = 0;
        assert_eq!(gen.allocate(&empty, ExistingSheets::default(), None).unwrap(), 0);
    }

    #[test]
    fn test_order_state_guard() {
        let gen = TravelSheetGenerator::new();
        let err = gen
            .generate(
                &order(OrderStatus::InProgress),
                &[step(10, "CUT")],
                ExistingSheets::default(),
                &TravelSheetPolicy::default(),
                None,
                None,
                Utc::now().naive_utc(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidOrderState { .. }));
    }
}
