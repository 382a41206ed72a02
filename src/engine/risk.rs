// ==========================================
// 车间执行追踪系统 - 交期风险引擎
// ==========================================
// 职责: 看板指标生成 (只读)
// 输入: 生产订单 + 未作废流转卡 + 工艺路线 + 风险阈值 + 评估日期
// 输出: RiskAssessment (风险等级 + 可解释原因)
// ==========================================
// 剩余工时:
// - 流转卡: 首个未完工工序的投入数量 × 未完工工序单件工时合计
// - 未分配数量 (尚无流转卡承接): 未分配数量 × 工艺路线单件工时合计
// 判定顺序:
// 1. 订单已完工/已取消, 或无剩余数量 -> GREEN
// 2. 无交期                           -> GREEN
// 3. 已到期/逾期且仍有剩余数量        -> RED
// 4. 负荷比 >= red_load_ratio         -> RED
// 5. 负荷比 >= yellow_load_ratio      -> YELLOW
// 6. 其余                             -> GREEN
// ==========================================

use crate::config::policy::RiskPolicy;
use crate::domain::master_data::RoutingStep;
use crate::domain::production_order::ProductionOrder;
use crate::domain::risk::RiskAssessment;
use crate::domain::travel_sheet::TravelSheet;
use crate::domain::types::{RiskLevel, TravelSheetStatus};
use chrono::NaiveDate;
use serde_json::json;

/// 单个订单的风险评估输入
#[derive(Debug, Clone)]
pub struct OrderWorkload {
    pub order: ProductionOrder,
    /// 订单下的流转卡 (已作废的在评估时忽略)
    pub sheets: Vec<TravelSheet>,
    /// 订单料号的工艺路线
    pub routing: Vec<RoutingStep>,
}

// ==========================================
// RiskEngine - 交期风险引擎
// ==========================================
pub struct RiskEngine {
    // 无状态引擎,不需要注入依赖
    // Repository 操作由调用方处理
}

impl RiskEngine {
    /// 构造函数
    pub fn new() -> Self {
        Self {}
    }

    /// 评估单个订单
    ///
    /// # 参数
    /// - `workload`: 订单 + 流转卡 + 工艺路线
    /// - `policy`: 风险阈值
    /// - `today`: 评估日期
    ///
    /// # 返回
    /// RiskAssessment
    pub fn assess(
        &self,
        workload: &OrderWorkload,
        policy: &RiskPolicy,
        today: NaiveDate,
    ) -> RiskAssessment {
        let order = &workload.order;
        let completion_percentage = self.completion_percentage(order);
        let remaining_quantity = order.remaining_quantity();
        let unallocated_quantity = self.unallocated_quantity(order, &workload.sheets);
        let remaining_work_minutes =
            self.remaining_work_minutes(order, &workload.sheets, &workload.routing);

        let days_to_due = order.due_date.map(|due| (due - today).num_days());
        let available_minutes =
            days_to_due.map(|days| days.max(0) as f64 * policy.working_minutes_per_day);
        let load_ratio = match available_minutes {
            Some(avail) if avail > 0.0 => Some(remaining_work_minutes / avail),
            _ => None,
        };

        let (risk_level, rule) = self.classify(order, days_to_due, load_ratio, policy);

        let risk_reason = json!({
            "rule": rule,
            "order_status": order.status.to_db_str(),
            "completion_percentage": completion_percentage,
            "remaining_quantity": remaining_quantity,
            "unallocated_quantity": unallocated_quantity,
            "remaining_work_minutes": remaining_work_minutes,
            "days_to_due": days_to_due,
            "available_minutes": available_minutes,
            "load_ratio": load_ratio,
            "yellow_load_ratio": policy.yellow_load_ratio,
            "red_load_ratio": policy.red_load_ratio,
        })
        .to_string();

        RiskAssessment {
            order_id: order.order_id.clone(),
            order_no: order.order_no.clone(),
            due_date: order.due_date,
            risk_level,
            completion_percentage,
            remaining_quantity,
            remaining_work_minutes,
            available_minutes,
            load_ratio,
            risk_reason,
        }
    }

    /// 批量评估, 按风险等级 (RED 优先) 再按交期排序
    pub fn assess_board(
        &self,
        workloads: &[OrderWorkload],
        policy: &RiskPolicy,
        today: NaiveDate,
    ) -> Vec<RiskAssessment> {
        let mut board: Vec<RiskAssessment> = workloads
            .iter()
            .map(|workload| self.assess(workload, policy, today))
            .collect();

        board.sort_by(|a, b| {
            b.risk_level
                .cmp(&a.risk_level)
                .then_with(|| match (a.due_date, b.due_date) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                })
                .then_with(|| a.order_no.cmp(&b.order_no))
        });

        board
    }

    /// 完工百分比: floor(100 * completed / quantity), 数量为 0 时为 0, 截断到 [0, 100]
    pub fn completion_percentage(&self, order: &ProductionOrder) -> u8 {
        if order.quantity == 0 {
            return 0;
        }
        let pct = (order.quantity_completed as u64 * 100) / order.quantity as u64;
        pct.min(100) as u8
    }

    /// 尚未分配给任何未作废流转卡的数量
    pub fn unallocated_quantity(&self, order: &ProductionOrder, sheets: &[TravelSheet]) -> u32 {
        if order.is_terminal() {
            return 0;
        }
        let allocated: u32 = live_sheets(sheets)
            .map(|s| s.allocated_quantity)
            .fold(0u32, u32::saturating_add);
        order.quantity.saturating_sub(allocated)
    }

    /// 剩余标准工时 (分钟)
    ///
    /// 流转卡上在制数量走完未完工工序, 加上未分配数量走完整条工艺路线
    pub fn remaining_work_minutes(
        &self,
        order: &ProductionOrder,
        sheets: &[TravelSheet],
        routing: &[RoutingStep],
    ) -> f64 {
        if order.is_terminal() {
            return 0.0;
        }

        let on_sheets: f64 = live_sheets(sheets)
            .filter(|s| s.is_active())
            .map(|sheet| {
                let open: Vec<_> = sheet.operations.iter().filter(|op| !op.is_completed()).collect();
                let in_flow = open
                    .iter()
                    .map(|op| op.sequence_number)
                    .min()
                    .and_then(|seq| sheet.operation_by_sequence(seq))
                    .and_then(|op| sheet.intake_quantity(op))
                    .unwrap_or(0) as f64;
                let minutes_per_unit: f64 = open.iter().map(|op| op.standard_time_minutes).sum();
                in_flow * minutes_per_unit
            })
            .sum();

        let routing_minutes_per_unit: f64 = routing.iter().map(|step| step.standard_time_minutes).sum();
        let unallocated = self.unallocated_quantity(order, sheets) as f64;

        on_sheets + unallocated * routing_minutes_per_unit
    }

    fn classify(
        &self,
        order: &ProductionOrder,
        days_to_due: Option<i64>,
        load_ratio: Option<f64>,
        policy: &RiskPolicy,
    ) -> (RiskLevel, &'static str) {
        if order.is_terminal() {
            return (RiskLevel::Green, "order_closed");
        }
        if order.remaining_quantity() == 0 {
            return (RiskLevel::Green, "no_remaining_quantity");
        }
        let days = match days_to_due {
            Some(days) => days,
            None => return (RiskLevel::Green, "no_due_date"),
        };
        if days <= 0 {
            return (RiskLevel::Red, "past_due");
        }
        match load_ratio {
            Some(ratio) if ratio >= policy.red_load_ratio => (RiskLevel::Red, "load_over_red"),
            Some(ratio) if ratio >= policy.yellow_load_ratio => {
                (RiskLevel::Yellow, "load_over_yellow")
            }
            _ => (RiskLevel::Green, "load_within_capacity"),
        }
    }
}

impl Default for RiskEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn live_sheets(sheets: &[TravelSheet]) -> impl Iterator<Item = &TravelSheet> {
    sheets
        .iter()
        .filter(|s| s.status != TravelSheetStatus::Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::operation::{Operation, QuantityField};
    use crate::domain::types::{OperationStatus, OrderPriority, OrderStatus};
    use chrono::{Duration, Utc};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    fn order(quantity: u32, completed: u32, due_in_days: Option<i64>) -> ProductionOrder {
        let now = Utc::now().naive_utc();
        ProductionOrder {
            order_id: "PO-1".to_string(),
            order_no: "MO-001".to_string(),
            part_number: "P".to_string(),
            quantity,
            quantity_completed: completed,
            quantity_scrapped: 0,
            status: OrderStatus::InProgress,
            due_date: due_in_days.map(|d| today() + Duration::days(d)),
            priority: OrderPriority::Normal,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    fn op(seq: u32, status: OperationStatus, minutes: f64, good: Option<u32>) -> Operation {
        Operation {
            operation_id: format!("OP-{}", seq),
            sheet_id: "S1".to_string(),
            sequence_number: seq,
            process_code: "P".to_string(),
            process_name: "P".to_string(),
            work_center: None,
            standard_time_minutes: minutes,
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

    fn sheet(allocated: u32, ops: Vec<Operation>) -> TravelSheet {
        TravelSheet {
            sheet_id: "S1".to_string(),
            sheet_no: "TS-MO-001-01".to_string(),
            order_id: "PO-1".to_string(),
            batch_id: None,
            allocated_quantity: allocated,
            status: TravelSheetStatus::Active,
            created_at: Utc::now().naive_utc(),
            closed_at: None,
            revision: 0,
            operations: ops,
        }
    }

    fn step(seq: u32, minutes: f64) -> RoutingStep {
        RoutingStep {
            part_number: "P".to_string(),
            sequence_number: seq,
            process_code: "P".to_string(),
            process_name: "P".to_string(),
            work_center: None,
            standard_time_minutes: minutes,
        }
    }

    fn workload(order: ProductionOrder, sheets: Vec<TravelSheet>, routing: Vec<RoutingStep>) -> OrderWorkload {
        OrderWorkload {
            order,
            sheets,
            routing,
        }
    }

    #[test]
    fn test_heavy_remaining_work_is_red() {
        let engine = RiskEngine::new();
        // 首道已完工 90 合格, 次道 15 分钟/件
        let sheets = vec![sheet(
            100,
            vec![
                op(10, OperationStatus::Completed, 5.0, Some(90)),
                op(20, OperationStatus::Pending, 15.0, None),
            ],
        )];
        let assessment = engine.assess(
            &workload(order(100, 10, Some(2)), sheets, vec![step(10, 5.0), step(20, 15.0)]),
            &RiskPolicy::default(),
            today(),
        );
        assert_eq!(assessment.risk_level, RiskLevel::Red);
        assert_eq!(assessment.completion_percentage, 10);
        assert_eq!(assessment.remaining_work_minutes, 1350.0);
        assert_eq!(assessment.available_minutes, Some(960.0));
        assert!(assessment.risk_reason.contains("load_over_red"));
    }

    #[test]
    fn test_order_without_sheet_uses_routing() {
        let engine = RiskEngine::new();
        let routing = vec![step(10, 7.5), step(20, 7.5)];

        let overdue = engine.assess(
            &workload(order(100, 0, Some(-1)), Vec::new(), routing.clone()),
            &RiskPolicy::default(),
            today(),
        );
        assert_eq!(overdue.risk_level, RiskLevel::Red);
        assert_eq!(overdue.remaining_work_minutes, 1500.0);
        assert!(overdue.risk_reason.contains("past_due"));

        let soon = engine.assess(
            &workload(order(100, 0, Some(2)), Vec::new(), routing),
            &RiskPolicy::default(),
            today(),
        );
        assert_eq!(soon.risk_level, RiskLevel::Red);
        assert_eq!(soon.load_ratio, Some(1500.0 / 960.0));
    }

    #[test]
    fn test_unallocated_quantity_adds_routing_work() {
        let engine = RiskEngine::new();
        let o = order(10, 0, Some(5));
        let sheets = vec![sheet(6, vec![op(10, OperationStatus::Pending, 2.0, None)])];
        let routing = vec![step(10, 2.0)];

        assert_eq!(engine.unallocated_quantity(&o, &sheets), 4);
        // 6 × 2 + 4 × 2
        assert_eq!(engine.remaining_work_minutes(&o, &sheets, &routing), 20.0);

        let mut cancelled = sheets.clone();
        cancelled[0].status = TravelSheetStatus::Cancelled;
        assert_eq!(engine.unallocated_quantity(&o, &cancelled), 10);
    }

    #[test]
    fn test_yellow_and_green_bands() {
        let engine = RiskEngine::new();
        let policy = RiskPolicy::default();

        // 400 / 480 = 0.83
        let yellow = engine.assess(
            &workload(order(40, 0, Some(1)), Vec::new(), vec![step(10, 10.0)]),
            &policy,
            today(),
        );
        assert_eq!(yellow.risk_level, RiskLevel::Yellow);

        let green = engine.assess(
            &workload(order(10, 0, Some(5)), Vec::new(), vec![step(10, 10.0)]),
            &policy,
            today(),
        );
        assert_eq!(green.risk_level, RiskLevel::Green);
        assert!(green.risk_reason.contains("load_within_capacity"));
    }

    #[test]
    fn test_past_due_and_no_due_date() {
        let engine = RiskEngine::new();
        let policy = RiskPolicy::default();

        // 剩余工时为 0 (工时未维护) 也不能掩盖逾期
        let overdue = engine.assess(
            &workload(order(10, 0, Some(-1)), Vec::new(), vec![step(10, 0.0)]),
            &policy,
            today(),
        );
        assert_eq!(overdue.risk_level, RiskLevel::Red);
        assert!(overdue.load_ratio.is_none());

        let no_due = engine.assess(
            &workload(order(10, 0, None), Vec::new(), vec![step(10, 1.0)]),
            &policy,
            today(),
        );
        assert_eq!(no_due.risk_level, RiskLevel::Green);
        assert!(no_due.available_minutes.is_none());
    }

    #[test]
    fn test_completion_percentage_bounds() {
        let engine = RiskEngine::new();
        assert_eq!(engine.completion_percentage(&order(0, 0, None)), 0);
        assert_eq!(engine.completion_percentage(&order(3, 1, None)), 33);
        assert_eq!(engine.completion_percentage(&order(3, 3, None)), 100);

        let mut closed = order(10, 10, Some(-5));
        closed.status = OrderStatus::Completed;
        let assessment = engine.assess(
            &workload(closed, Vec::new(), vec![step(10, 1.0)]),
            &RiskPolicy::default(),
            today(),
        );
        assert_eq!(assessment.risk_level, RiskLevel::Green);
        assert_eq!(assessment.completion_percentage, 100);
        assert_eq!(assessment.remaining_work_minutes, 0.0);
    }

    #[test]
    fn test_board_orders_red_first() {
        let engine = RiskEngine::new();
        let mut calm = order(1, 0, Some(30));
        calm.order_no = "MO-CALM".to_string();
        let mut late = order(10, 0, Some(-1));
        late.order_no = "MO-LATE".to_string();

        let board = engine.assess_board(
            &[
                workload(calm, Vec::new(), vec![step(10, 1.0)]),
                workload(late, Vec::new(), vec![step(10, 1.0)]),
            ],
            &RiskPolicy::default(),
            today(),
        );
        assert_eq!(board[0].order_no, "MO-LATE");
        assert_eq!(board[1].order_no, "MO-CALM");
    }
}
