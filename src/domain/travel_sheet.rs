// ==========================================
// 车间执行追踪系统 - 流转卡领域模型
// ==========================================
// 职责: 流转卡及其工序集合
// 红线: 工序顺序只看 sequence_number 数值, 不看存储顺序
// ==========================================

use crate::domain::operation::Operation;
use crate::domain::types::{OperationStatus, TravelSheetStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// TravelSheet - 流转卡
// ==========================================
// 独占其工序 (组合关系); 对生产订单只持有弱引用 order_id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelSheet {
    pub sheet_id: String,                 // 流转卡ID
    pub sheet_no: String,                 // 流转卡号 (人工可读)
    pub order_id: String,                 // 关联生产订单
    pub batch_id: Option<String>,         // 批次号
    pub allocated_quantity: u32,          // 分配数量 (首道工序投入)
    pub status: TravelSheetStatus,        // 流转卡状态
    pub created_at: NaiveDateTime,        // 创建时间
    pub closed_at: Option<NaiveDateTime>, // 完工/作废时间
    pub revision: i32,                    // 乐观锁：修订号
    pub operations: Vec<Operation>,       // 工序列表
}

impl TravelSheet {
    pub fn is_active(&self) -> bool {
        self.status == TravelSheetStatus::Active
    }

    /// 按工序号查找工序
    pub fn operation_by_sequence(&self, sequence_number: u32) -> Option<&Operation> {
        self.operations
            .iter()
            .find(|op| op.sequence_number == sequence_number)
    }

    /// 按ID查找工序
    pub fn operation_by_id(&self, operation_id: &str) -> Option<&Operation> {
        self.operations
            .iter()
            .find(|op| op.operation_id == operation_id)
    }

    /// 未完工工序中的最小工序号 (唯一允许开工的工序)
    pub fn lowest_open_sequence(&self) -> Option<u32> {
        self.operations
            .iter()
            .filter(|op| op.status != OperationStatus::Completed)
            .map(|op| op.sequence_number)
            .min()
    }

    /// 末道工序的工序号
    pub fn final_sequence(&self) -> Option<u32> {
        self.operations.iter().map(|op| op.sequence_number).max()
    }

    /// 是否为末道工序
    pub fn is_final_operation(&self, operation: &Operation) -> bool {
        self.final_sequence() == Some(operation.sequence_number)
    }

    /// 前道工序 (工序号小于给定值中的最大者)
    pub fn previous_operation(&self, sequence_number: u32) -> Option<&Operation> {
        self.operations
            .iter()
            .filter(|op| op.sequence_number < sequence_number)
            .max_by_key(|op| op.sequence_number)
    }

    /// 工序的投入数量
    ///
    /// # 规则
    /// - 首道工序: 流转卡分配数量
    /// - 其余工序: 前道工序的合格数
    ///
    /// # 返回
    /// - None: 前道工序尚未报工, 投入数量未知
    pub fn intake_quantity(&self, operation: &Operation) -> Option<u32> {
        match self.previous_operation(operation.sequence_number) {
            None => Some(self.allocated_quantity),
            Some(prev) if prev.status == OperationStatus::Completed => {
                Some(prev.quantity_good.resolve())
            }
            Some(_) => None,
        }
    }

    /// 是否全部工序已完工
    pub fn all_operations_completed(&self) -> bool {
        !self.operations.is_empty()
            && self
                .operations
                .iter()
                .all(|op| op.status == OperationStatus::Completed)
    }

    /// 指定工序之后仍待开工的工序 (按工序号升序)
    pub fn pending_after(&self, sequence_number: u32) -> Vec<&Operation> {
        let mut ops: Vec<&Operation> = self
            .operations
            .iter()
            .filter(|op| op.sequence_number > sequence_number && op.status == OperationStatus::Pending)
            .collect();
        ops.sort_by_key(|op| op.sequence_number);
        ops
    }

    /// 是否已有工序开工
    pub fn has_started_operations(&self) -> bool {
        self.operations
            .iter()
            .any(|op| op.status != OperationStatus::Pending)
    }

    /// 按工序号升序排列工序 (加载后统一调用)
    pub fn sort_operations(&mut self) {
        self.operations.sort_by_key(|op| op.sequence_number);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::operation::QuantityField;
    use chrono::Utc;

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
            operator_id: None,
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
            sheet_no: "TS-MO-01".to_string(),
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
    fn test_ordering_uses_sequence_number_not_position() {
        // 存储顺序打乱, 工序号非连续
        let s = sheet(vec![
            op(30, OperationStatus::Pending, None),
            op(10, OperationStatus::Completed, Some(48)),
            op(20, OperationStatus::Pending, None),
        ]);
        assert_eq!(s.lowest_open_sequence(), Some(20));
        assert_eq!(s.final_sequence(), Some(30));
        assert_eq!(s.previous_operation(30).unwrap().sequence_number, 20);
        assert_eq!(s.previous_operation(20).unwrap().sequence_number, 10);
        assert!(s.previous_operation(10).is_none());
    }

    #[test]
    fn test_intake_quantity_follows_previous_good() {
        let s = sheet(vec![
            op(10, OperationStatus::Completed, Some(48)),
            op(20, OperationStatus::InProgress, None),
            op(30, OperationStatus::Pending, None),
        ]);
        let first = s.operation_by_sequence(10).unwrap();
        let second = s.operation_by_sequence(20).unwrap();
        let third = s.operation_by_sequence(30).unwrap();
        assert_eq!(s.intake_quantity(first), Some(50));
        assert_eq!(s.intake_quantity(second), Some(48));
        assert_eq!(s.intake_quantity(third), None);
    }

    #[test]
    fn test_first_step_intake_is_sheet_allocation() {
        let mut s = sheet(vec![
            op(10, OperationStatus::InProgress, None),
            op(20, OperationStatus::Pending, None),
            op(30, OperationStatus::Pending, None),
        ]);
        s.allocated_quantity = 6;
        assert_eq!(s.intake_quantity(&s.operations[0]), Some(6));

        let pending: Vec<u32> = s.pending_after(10).iter().map(|op| op.sequence_number).collect();
        assert_eq!(pending, vec![20, 30]);
        assert!(s.pending_after(30).is_empty());
    }

    #[test]
    fn test_all_operations_completed() {
        let mut s = sheet(vec![op(10, OperationStatus::Completed, Some(1))]);
        assert!(s.all_operations_completed());
        s.operations.push(op(20, OperationStatus::Pending, None));
        assert!(!s.all_operations_completed());
        assert!(s.has_started_operations());
        assert!(!sheet(vec![]).all_operations_completed());
    }
}
