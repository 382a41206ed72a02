// ==========================================
// 车间执行追踪系统 - 工序状态机
// ==========================================
// 流转: Pending -> InProgress -> Completed (单向)
// 守卫:
// - 开工: 工序号必须等于未完工工序中的最小工序号
// - 占用: 进行中的工序只属于开工操作员
// - 终态: 已完工工序拒绝任何扫码, 与扫码人无关
// 红线: Engine 不拼 SQL, 输出新状态由调用方以比较并交换方式落库
// ==========================================

use crate::domain::master_data::Operator;
use crate::domain::operation::Operation;
use crate::domain::production_order::ProductionOrder;
use crate::domain::scan::ScanOutcome;
use crate::domain::travel_sheet::TravelSheet;
use crate::domain::types::{OperationStatus, OrderStatus};
use crate::engine::checkpoint_resolver::CheckpointSnapshot;
use crate::engine::error::{EngineError, EngineResult};
use chrono::NaiveDateTime;

// ==========================================
// OperationStateMachine - 工序状态机
// ==========================================
pub struct OperationStateMachine {
    // 无状态引擎
}

impl OperationStateMachine {
    pub fn new() -> Self {
        Self {}
    }

    /// 评估一次扫码
    ///
    /// # 返回
    /// - `Ok(Started)`: 调用方应执行开工迁移
    /// - `Ok(AwaitingCompletion)`: 同一操作员再次扫码, 不做任何变更
    /// - `Err(..)`: 守卫拒绝或输入错误
    pub fn evaluate_scan(&self, snapshot: &CheckpointSnapshot) -> EngineResult<ScanOutcome> {
        let operation = &snapshot.operation;
        let operator = &snapshot.operator;

        match operation.status {
            OperationStatus::Completed => Err(EngineError::AlreadyCompleted {
                operation_id: operation.operation_id.clone(),
            }),
            OperationStatus::InProgress => {
                self.check_occupancy(operation, operator)?;
                Ok(ScanOutcome::AwaitingCompletion)
            }
            OperationStatus::Pending => {
                if !snapshot.sheet.is_active() {
                    return Err(EngineError::SheetNotActive {
                        sheet_id: snapshot.sheet.sheet_id.clone(),
                        status: snapshot.sheet.status,
                    });
                }
                if snapshot.order.is_terminal() {
                    return Err(EngineError::InvalidOrderState {
                        order_id: snapshot.order.order_id.clone(),
                        status: snapshot.order.status,
                    });
                }
                self.check_sequence(&snapshot.sheet, operation)?;
                Ok(ScanOutcome::Started)
            }
        }
    }

    /// 报工前置检查
    ///
    /// # 顺序
    /// 已完工 -> 未开工 -> 操作员一致
    pub fn check_completion(&self, operation: &Operation, operator: &Operator) -> EngineResult<()> {
        match operation.status {
            OperationStatus::Completed => Err(EngineError::AlreadyCompleted {
                operation_id: operation.operation_id.clone(),
            }),
            OperationStatus::Pending => Err(EngineError::OperationNotStarted {
                operation_id: operation.operation_id.clone(),
            }),
            OperationStatus::InProgress => self.check_occupancy(operation, operator),
        }
    }

    /// 开工后的工序 (仅内存, 供返回与事件使用)
    pub fn started(&self, operation: &Operation, operator: &Operator, now: NaiveDateTime) -> Operation {
        let mut started = operation.clone();
        started.status = OperationStatus::InProgress;
        started.operator_id = Some(operator.operator_id.clone());
        started.start_time = Some(now);
        started.revision += 1;
        started
    }

    /// 首次开工时订单 Released -> InProgress
    ///
    /// # 返回
    /// - `Some(order)`: 订单需要更新
    /// - `None`: 订单状态无需变化
    pub fn order_after_start(&self, order: &ProductionOrder, now: NaiveDateTime) -> Option<ProductionOrder> {
        if order.status != OrderStatus::Released {
            return None;
        }
        let mut updated = order.clone();
        updated.status = OrderStatus::InProgress;
        updated.updated_at = now;
        Some(updated)
    }

    /// 比较并交换失败后, 依据最新工序状态给出确定的拒绝原因
    pub fn classify_conflict(&self, current: &Operation, operator: &Operator) -> EngineError {
        match current.status {
            OperationStatus::Completed => EngineError::AlreadyCompleted {
                operation_id: current.operation_id.clone(),
            },
            OperationStatus::InProgress => match self.check_occupancy(current, operator) {
                Err(e) => e,
                Ok(()) => EngineError::ConsistencyFault(format!(
                    "工序 {} 并发更新冲突 (revision={})",
                    current.operation_id, current.revision
                )),
            },
            OperationStatus::Pending => EngineError::ConsistencyFault(format!(
                "工序 {} 并发更新冲突 (状态仍为待开工)",
                current.operation_id
            )),
        }
    }

    fn check_sequence(&self, sheet: &TravelSheet, operation: &Operation) -> EngineResult<()> {
        match sheet.lowest_open_sequence() {
            Some(lowest) if lowest == operation.sequence_number => Ok(()),
            Some(lowest) => Err(EngineError::SequenceViolation {
                operation_id: operation.operation_id.clone(),
                sequence_number: operation.sequence_number,
                blocking_sequence: lowest,
            }),
            None => Err(EngineError::AlreadyCompleted {
                operation_id: operation.operation_id.clone(),
            }),
        }
    }

    fn check_occupancy(&self, operation: &Operation, operator: &Operator) -> EngineResult<()> {
        match operation.operator_id.as_deref() {
            Some(owner) if owner == operator.operator_id => Ok(()),
            Some(owner) => Err(EngineError::OperatorMismatch {
                operation_id: operation.operation_id.clone(),
                expected_operator: owner.to_string(),
                actual_operator: operator.operator_id.clone(),
            }),
            None => Err(EngineError::ConsistencyFault(format!(
                "进行中的工序 {} 缺少开工操作员",
                operation.operation_id
            ))),
        }
    }
}

impl Default for OperationStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
