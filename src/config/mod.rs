// ==========================================
// 车间执行追踪系统 - 配置层
// ==========================================
// 职责: 系统配置管理 (流转卡策略 / 风险阈值)
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod policy;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use policy::{RiskPolicy, TravelSheetPolicy};
