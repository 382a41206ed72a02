// ==========================================
// 车间执行追踪系统 - 导入层
// ==========================================
// 职责: 外部主数据导入 (工艺路线目录)
// 支持: CSV, JSON 记录数组
// ==========================================

// 模块声明
pub mod error;
pub mod routing_importer;
pub mod routing_mapper;
pub mod routing_source;

// 重导出核心类型
pub use error::{ImportError, ImportResult};
pub use routing_importer::{RoutingImportReport, RoutingImporter};
pub use routing_mapper::RoutingFieldMapper;
pub use routing_source::{CsvRoutingSource, JsonRecordSource, RawRecord, RoutingSource};
