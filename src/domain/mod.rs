// ==========================================
// 车间执行追踪系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、业务规则接口
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod master_data;
pub mod operation;
pub mod production_order;
pub mod risk;
pub mod scan;
pub mod travel_sheet;
pub mod types;

// 重导出核心类型
pub use master_data::{Operator, RoutingStep};
pub use operation::{Operation, QuantityField, QuantitySubmission, ResolvedQuantities};
pub use production_order::ProductionOrder;
pub use risk::RiskAssessment;
pub use scan::{ScanEvent, ScanOutcome};
pub use travel_sheet::TravelSheet;
pub use types::{OperationStatus, OrderPriority, OrderStatus, RiskLevel, TravelSheetStatus};
