// ==========================================
// 车间执行追踪系统 - 主数据领域模型
// ==========================================
// 职责: 操作员 / 工艺路线工步
// 说明: 两者对本核心只读 (由外部主数据维护)
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// Operator - 操作员
// ==========================================
// 通过工牌令牌识别身份, 除身份外无状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub operator_id: String,  // 操作员ID
    pub badge_token: String,  // 工牌令牌
    pub display_name: String, // 姓名
    pub active: bool,         // 是否在职
}

// ==========================================
// RoutingStep - 工艺路线工步
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingStep {
    pub part_number: String,          // 料号
    pub sequence_number: u32,         // 工序号
    pub process_code: String,         // 工序代码
    pub process_name: String,         // 工序名称
    pub work_center: Option<String>,  // 工作中心
    pub standard_time_minutes: f64,   // 单件标准工时 (分钟)
}

impl RoutingStep {
    /// 工步字段是否合法
    ///
    /// # 规则
    /// - 料号 / 工序代码非空
    /// - 标准工时为有限非负数
    pub fn validate(&self) -> Result<(), String> {
        if self.part_number.trim().is_empty() {
            return Err("part_number 为空".to_string());
        }
        if self.process_code.trim().is_empty() {
            return Err(format!(
                "工序号 {} 的 process_code 为空",
                self.sequence_number
            ));
        }
        if !self.standard_time_minutes.is_finite() || self.standard_time_minutes < 0.0 {
            return Err(format!(
                "工序号 {} 的标准工时非法: {}",
                self.sequence_number, self.standard_time_minutes
            ));
        }
        Ok(())
    }
}
