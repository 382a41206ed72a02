// ==========================================
// 车间执行追踪系统 - 应用层
// ==========================================
// 职责: 组装共享状态 (锁注册表 / 配置 / 事件发布 / API 实例)
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
