// ==========================================
// 车间执行追踪系统 - 扫码事件领域模型
// ==========================================
// 说明: 扫码事件是输入单元, 不单独落库
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// ScanEvent - 扫码事件
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEvent {
    pub badge_token: String,       // 工牌令牌
    pub checkpoint_token: String,  // 检查点令牌
    pub scanned_at: NaiveDateTime, // 扫码时间
}

impl ScanEvent {
    /// 构造扫码事件 (去除扫码枪带入的首尾空白)
    pub fn new(badge_token: &str, checkpoint_token: &str, scanned_at: NaiveDateTime) -> Self {
        Self {
            badge_token: badge_token.trim().to_string(),
            checkpoint_token: checkpoint_token.trim().to_string(),
            scanned_at,
        }
    }
}

// ==========================================
// ScanOutcome - 扫码结果
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    /// 工序已开工, 等待完工扫码
    Started,
    /// 同一操作员再次扫码, 调用方进入报工数量录入
    AwaitingCompletion,
}

impl fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanOutcome::Started => write!(f, "started"),
            ScanOutcome::AwaitingCompletion => write!(f, "awaiting_completion"),
        }
    }
}
