// ==========================================
// 车间执行追踪系统 - 引擎层
// ==========================================
// 职责: 实现业务规则引擎,不拼 SQL
// 红线: Engine 不拼 SQL, 所有核算/评估必须输出 reason
// ==========================================

pub mod checkpoint_resolver;
pub mod entity_lock;
pub mod error;
pub mod events;
pub mod operation_state_machine;
pub mod reconciliation;
pub mod risk;
pub mod token;
pub mod travel_sheet_generator;

// 重导出核心引擎
pub use checkpoint_resolver::{CheckpointResolver, CheckpointSnapshot};
pub use entity_lock::{EntityLockGuard, EntityLockRegistry};
pub use error::{EngineError, EngineResult, ErrorCategory};
pub use events::{
    NoOpEventPublisher, OptionalEventPublisher, ShopFloorEvent, ShopFloorEventPublisher,
    ShopFloorEventType, TracingEventPublisher,
};
pub use operation_state_machine::OperationStateMachine;
pub use reconciliation::{CompletionPlan, ReconciliationEngine};
pub use risk::{OrderWorkload, RiskEngine};
pub use travel_sheet_generator::{ExistingSheets, TravelSheetGenerator};
