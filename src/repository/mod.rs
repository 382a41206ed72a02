// ==========================================
// 车间执行追踪系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod error;
pub mod operation_repo;
pub mod operator_repo;
pub mod production_order_repo;
pub mod routing_repo;
pub mod travel_sheet_repo;
pub mod unit_of_work;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use operation_repo::OperationRepository;
pub use operator_repo::OperatorRepository;
pub use production_order_repo::ProductionOrderRepository;
pub use routing_repo::RoutingCatalogRepository;
pub use travel_sheet_repo::TravelSheetRepository;
pub use unit_of_work::{TransactionGuard, UnitOfWork};

use rusqlite::{params, Connection};

/// 比较并交换失败后的诊断: 区分"记录不存在"与"revision 冲突"
pub(crate) fn revision_conflict(
    conn: &Connection,
    table: &str,
    key_column: &str,
    entity: &str,
    id: &str,
    expected: i32,
) -> RepositoryError {
    let actual: Result<i32, _> = conn.query_row(
        &format!("SELECT revision FROM {} WHERE {} = ?", table, key_column),
        params![id],
        |row| row.get(0),
    );

    match actual {
        Ok(actual) => RepositoryError::OptimisticLockFailure {
            entity: entity.to_string(),
            id: id.to_string(),
            expected,
            actual,
        },
        Err(rusqlite::Error::QueryReturnedNoRows) => RepositoryError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        },
        Err(e) => e.into(),
    }
}
