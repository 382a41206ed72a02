// ==========================================
// 车间执行追踪系统 - 交期风险领域模型
// ==========================================
// 用途: 看板指标, 只读派生数据, 不落库
// ==========================================

use crate::domain::types::RiskLevel;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ==========================================
// RiskAssessment - 订单交期风险评估
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub order_id: String,               // 订单ID
    pub order_no: String,               // 订单号
    pub due_date: Option<NaiveDate>,    // 交期
    pub risk_level: RiskLevel,          // 风险等级
    pub completion_percentage: u8,      // 完工百分比 [0, 100]
    pub remaining_quantity: u32,        // 剩余未核算数量
    pub remaining_work_minutes: f64,    // 剩余标准工时 (分钟)
    pub available_minutes: Option<f64>, // 距交期可用工时 (无交期为 None)
    pub load_ratio: Option<f64>,        // 负荷比 = 剩余工时 / 可用工时
    pub risk_reason: String,            // 风险原因 (JSON, 可解释性)
}

impl RiskAssessment {
    /// 是否需要看板高亮
    pub fn needs_attention(&self) -> bool {
        self.risk_level != RiskLevel::Green
    }
}
