// ==========================================
// 车间执行追踪系统 - API 层
// ==========================================
// 职责: 提供业务 API 接口, 供 JSON 行服务调用
// ==========================================

pub mod dispatcher;
pub mod dto;
pub mod error;
pub mod master_data_api;
pub mod shop_floor_api;

// 重导出核心类型
pub use dispatcher::{TrackerService, DEFAULT_LOCALE};
pub use dto::{
    CompletionResponse, ErrorResponse, RequestEnvelope, ResponseEnvelope, ScanResponse,
    TrackerRequest, TrackerResponse,
};
pub use error::{ApiError, ApiResult};
pub use master_data_api::MasterDataApi;
pub use shop_floor_api::ShopFloorApi;
