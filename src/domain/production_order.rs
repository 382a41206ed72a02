// ==========================================
// 车间执行追踪系统 - 生产订单领域模型
// ==========================================
// 红线: quantity_completed + quantity_scrapped <= quantity
// 红线: 只有 completed + scrapped == quantity 时才能完工
// ==========================================

use crate::domain::types::{OrderPriority, OrderStatus};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// ProductionOrder - 生产订单
// ==========================================
// 由订单录入创建; 汇总字段只允许数量核算引擎修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionOrder {
    pub order_id: String,              // 订单ID (代理键)
    pub order_no: String,              // 订单号 (业务唯一)
    pub part_number: String,           // 料号
    pub quantity: u32,                 // 投入数量
    pub quantity_completed: u32,       // 累计完工数量
    pub quantity_scrapped: u32,        // 累计报废数量
    pub status: OrderStatus,           // 订单状态
    pub due_date: Option<NaiveDate>,   // 交期
    pub priority: OrderPriority,       // 优先级
    pub created_at: NaiveDateTime,     // 创建时间
    pub updated_at: NaiveDateTime,     // 更新时间
    pub revision: i32,                 // 乐观锁：修订号
}

impl ProductionOrder {
    /// 已核算数量 (完工 + 报废)
    pub fn accounted_quantity(&self) -> u64 {
        self.quantity_completed as u64 + self.quantity_scrapped as u64
    }

    /// 剩余未核算数量
    pub fn remaining_quantity(&self) -> u32 {
        (self.quantity as u64).saturating_sub(self.accounted_quantity()) as u32
    }

    /// 是否已全部核算
    pub fn is_fully_accounted(&self) -> bool {
        self.accounted_quantity() == self.quantity as u64
    }

    /// 汇总字段是否满足不变量
    pub fn rollup_invariant_holds(&self) -> bool {
        self.accounted_quantity() <= self.quantity as u64
    }

    /// 是否允许生成流转卡
    pub fn can_generate_travel_sheet(&self) -> bool {
        matches!(self.status, OrderStatus::Created | OrderStatus::Released)
    }

    /// 是否允许删除 (由调用方结合流转卡引用情况判断)
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn order(quantity: u32, completed: u32, scrapped: u32) -> ProductionOrder {
        let now = Utc::now().naive_utc();
        ProductionOrder {
            order_id: "PO-1".to_string(),
            order_no: "MO-0001".to_string(),
            part_number: "PN-100".to_string(),
            quantity,
            quantity_completed: completed,
            quantity_scrapped: scrapped,
            status: OrderStatus::Released,
            due_date: None,
            priority: OrderPriority::Normal,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    #[test]
    fn test_remaining_and_accounting() {
        let o = order(100, 60, 5);
        assert_eq!(o.accounted_quantity(), 65);
        assert_eq!(o.remaining_quantity(), 35);
        assert!(!o.is_fully_accounted());
        assert!(o.rollup_invariant_holds());

        let done = order(100, 95, 5);
        assert!(done.is_fully_accounted());
        assert_eq!(done.remaining_quantity(), 0);
    }

    #[test]
    fn test_invariant_detects_overrun() {
        let broken = order(10, 8, 3);
        assert!(!broken.rollup_invariant_holds());
        assert_eq!(broken.remaining_quantity(), 0);
    }
}
