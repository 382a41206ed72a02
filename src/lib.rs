// ==========================================
// 车间执行追踪系统 - 核心库
// ==========================================
// 职责: 流转卡生成 / 扫码开工 / 报工核算 / 交期风险评估
// 技术栈: Rust + SQLite + tokio
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "zh-CN");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 导入层 - 工艺路线目录
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 性能埋点
pub mod perf;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// API 层 - 业务接口
pub mod api;

// 应用层 - 共享状态
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    OperationStatus, OrderPriority, OrderStatus, RiskLevel, TravelSheetStatus,
};

// 领域实体
pub use domain::{
    Operation, Operator, ProductionOrder, QuantityField, QuantitySubmission, RiskAssessment,
    RoutingStep, ScanOutcome, TravelSheet,
};

// 引擎
pub use engine::{
    CheckpointResolver, EngineError, ErrorCategory, OperationStateMachine, ReconciliationEngine,
    RiskEngine, TravelSheetGenerator,
};

// API
pub use api::{ApiError, MasterDataApi, ShopFloorApi, TrackerService};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "车间执行追踪系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
