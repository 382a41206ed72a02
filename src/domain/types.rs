// ==========================================
// 车间执行追踪系统 - 领域类型定义
// ==========================================
// 职责: 状态枚举 / 优先级 / 风险等级
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 生产订单状态 (Production Order Status)
// ==========================================
// 流转: Created -> Released -> InProgress -> Completed
// 任意非终态 -> Cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,    // 已录入
    Released,   // 已下达(已生成流转卡)
    InProgress, // 生产中
    Completed,  // 已完工
    Cancelled,  // 已取消
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl OrderStatus {
    /// 从字符串解析状态
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "CREATED" => Some(OrderStatus::Created),
            "RELEASED" => Some(OrderStatus::Released),
            "IN_PROGRESS" => Some(OrderStatus::InProgress),
            "COMPLETED" => Some(OrderStatus::Completed),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Released => "RELEASED",
            OrderStatus::InProgress => "IN_PROGRESS",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

// ==========================================
// 订单优先级 (Order Priority)
// ==========================================
// 顺序: Low < Normal < High < Urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl fmt::Display for OrderPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl OrderPriority {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "LOW" => Some(OrderPriority::Low),
            "NORMAL" => Some(OrderPriority::Normal),
            "HIGH" => Some(OrderPriority::High),
            "URGENT" => Some(OrderPriority::Urgent),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            OrderPriority::Low => "LOW",
            OrderPriority::Normal => "NORMAL",
            OrderPriority::High => "HIGH",
            OrderPriority::Urgent => "URGENT",
        }
    }
}

impl Default for OrderPriority {
    fn default() -> Self {
        OrderPriority::Normal
    }
}

// ==========================================
// 流转卡状态 (Travel Sheet Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TravelSheetStatus {
    Active,    // 流转中
    Completed, // 全部工序完工
    Cancelled, // 作废
}

impl fmt::Display for TravelSheetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl TravelSheetStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "ACTIVE" => Some(TravelSheetStatus::Active),
            "COMPLETED" => Some(TravelSheetStatus::Completed),
            "CANCELLED" => Some(TravelSheetStatus::Cancelled),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            TravelSheetStatus::Active => "ACTIVE",
            TravelSheetStatus::Completed => "COMPLETED",
            TravelSheetStatus::Cancelled => "CANCELLED",
        }
    }
}

// ==========================================
// 工序状态 (Operation Status)
// ==========================================
// 红线: Pending -> InProgress -> Completed, 不跳跃、不回退
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,    // 待开工
    InProgress, // 加工中
    Completed,  // 已报工
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl OperationStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Some(OperationStatus::Pending),
            "IN_PROGRESS" => Some(OperationStatus::InProgress),
            "COMPLETED" => Some(OperationStatus::Completed),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "PENDING",
            OperationStatus::InProgress => "IN_PROGRESS",
            OperationStatus::Completed => "COMPLETED",
        }
    }

    /// 状态机允许的下一状态
    pub fn next(&self) -> Option<OperationStatus> {
        match self {
            OperationStatus::Pending => Some(OperationStatus::InProgress),
            OperationStatus::InProgress => Some(OperationStatus::Completed),
            OperationStatus::Completed => None,
        }
    }
}

// ==========================================
// 交期风险等级 (Risk Level)
// ==========================================
// 顺序: Green < Yellow < Red
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Green,  // 正常
    Yellow, // 关注
    Red,    // 危险
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Green => write!(f, "GREEN"),
            RiskLevel::Yellow => write!(f, "YELLOW"),
            RiskLevel::Red => write!(f, "RED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_db_round_trip() {
        for status in [
            OrderStatus::Created,
            OrderStatus::Released,
            OrderStatus::InProgress,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::from_str(status.to_db_str()), Some(status));
        }
        assert_eq!(OperationStatus::from_str("in_progress"), Some(OperationStatus::InProgress));
        assert_eq!(TravelSheetStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_operation_status_never_reverses() {
        assert_eq!(OperationStatus::Pending.next(), Some(OperationStatus::InProgress));
        assert_eq!(OperationStatus::InProgress.next(), Some(OperationStatus::Completed));
        assert_eq!(OperationStatus::Completed.next(), None);
    }

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Red > RiskLevel::Yellow);
        assert!(RiskLevel::Yellow > RiskLevel::Green);
        assert_eq!(RiskLevel::Red.to_string(), "RED");
    }
}
