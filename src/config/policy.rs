// ==========================================
// 车间执行追踪系统 - 策略配置对象
// ==========================================
// 职责: 流转卡生成策略 / 交期风险阈值
// 说明: 数值阈值属于策略, 由 config_kv 覆写
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// TravelSheetPolicy - 流转卡生成策略
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelSheetPolicy {
    /// 同一订单是否允许多张流转中的流转卡 (返工/拆批)
    pub allow_multiple_active: bool,
    /// 流转卡号前缀
    pub sheet_number_prefix: String,
}

impl Default for TravelSheetPolicy {
    fn default() -> Self {
        Self {
            allow_multiple_active: false,
            sheet_number_prefix: "TS".to_string(),
        }
    }
}

// ==========================================
// RiskPolicy - 交期风险阈值
// ==========================================
// 负荷比 = 剩余标准工时 / 距交期可用工时
// - 负荷比 >= red_load_ratio    -> RED
// - 负荷比 >= yellow_load_ratio -> YELLOW
// - 其余                        -> GREEN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPolicy {
    /// 每日可用工时 (分钟)
    pub working_minutes_per_day: f64,
    /// 黄色阈值
    pub yellow_load_ratio: f64,
    /// 红色阈值
    pub red_load_ratio: f64,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            working_minutes_per_day: 480.0,
            yellow_load_ratio: 0.8,
            red_load_ratio: 1.0,
        }
    }
}

impl RiskPolicy {
    /// 校验阈值
    ///
    /// # 规则
    /// - 每日工时 > 0
    /// - 0 < yellow <= red
    pub fn validate(&self) -> Result<(), String> {
        if !(self.working_minutes_per_day.is_finite() && self.working_minutes_per_day > 0.0) {
            return Err(format!(
                "working_minutes_per_day 必须为正数: {}",
                self.working_minutes_per_day
            ));
        }
        if !(self.yellow_load_ratio.is_finite() && self.yellow_load_ratio > 0.0) {
            return Err(format!("yellow_load_ratio 必须为正数: {}", self.yellow_load_ratio));
        }
        if !(self.red_load_ratio.is_finite() && self.red_load_ratio >= self.yellow_load_ratio) {
            return Err(format!(
                "red_load_ratio({}) 不能小于 yellow_load_ratio({})",
                self.red_load_ratio, self.yellow_load_ratio
            ));
        }
        Ok(())
    }
}
