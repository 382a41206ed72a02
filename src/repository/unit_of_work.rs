// ==========================================
// 车间执行追踪系统 - 工作单元 (Unit of Work)
// ==========================================
// 职责: 一个请求 = 一个连接 = 一组仓储
// 红线: 写操作全部包在 BEGIN IMMEDIATE 事务内, 要么全部提交要么全部回滚
// ==========================================

use crate::db::open_sqlite_connection;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::{
    OperationRepository, OperatorRepository, ProductionOrderRepository, RoutingCatalogRepository,
    TravelSheetRepository,
};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

// ==========================================
// UnitOfWork - 请求级仓储集合
// ==========================================
pub struct UnitOfWork {
    conn: Arc<Mutex<Connection>>,
    pub orders: ProductionOrderRepository,
    pub sheets: TravelSheetRepository,
    pub operations: OperationRepository,
    pub operators: OperatorRepository,
    pub routing: RoutingCatalogRepository,
}

impl UnitOfWork {
    /// 打开独立连接并创建工作单元
    pub fn open(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Ok(Self::from_connection(Arc::new(Mutex::new(conn))))
    }

    /// 从已有连接创建工作单元
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            orders: ProductionOrderRepository::new(conn.clone()),
            sheets: TravelSheetRepository::new(conn.clone()),
            operations: OperationRepository::new(conn.clone()),
            operators: OperatorRepository::new(conn.clone()),
            routing: RoutingCatalogRepository::new(conn.clone()),
            conn,
        }
    }

    /// 开启写事务 (立即获取写锁, 避免读后升级写锁时的死锁)
    pub fn begin_immediate(&self) -> RepositoryResult<TransactionGuard> {
        {
            let conn = self
                .conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            conn.execute_batch("BEGIN IMMEDIATE")
                .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        }

        Ok(TransactionGuard {
            conn: self.conn.clone(),
            finished: false,
        })
    }
}

// ==========================================
// TransactionGuard - 事务守卫
// ==========================================
// 未显式提交即回滚 (包括 ? 提前返回与 panic 展开)
pub struct TransactionGuard {
    conn: Arc<Mutex<Connection>>,
    finished: bool,
}

impl TransactionGuard {
    /// 提交事务
    pub fn commit(mut self) -> RepositoryResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        conn.execute_batch("COMMIT")
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        drop(conn);
        self.finished = true;
        Ok(())
    }

    /// 显式回滚
    pub fn rollback(mut self) -> RepositoryResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        conn.execute_batch("ROLLBACK")
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        drop(conn);
        self.finished = true;
        Ok(())
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let conn = match self.conn.lock() {
            Ok(conn) => conn,
            Err(poisoned) => poisoned.into_inner(),
        };
        if conn.is_autocommit() {
            return;
        }
        if let Err(e) = conn.execute_batch("ROLLBACK") {
            tracing::warn!("事务回滚失败: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ensure_schema;
    use crate::domain::master_data::Operator;

    fn memory_uow() -> UnitOfWork {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        UnitOfWork::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn operator(id: &str) -> Operator {
        Operator {
            operator_id: id.to_string(),
            badge_token: format!("BADGE-{}", id),
            display_name: id.to_string(),
            active: true,
        }
    }

    #[test]
    fn test_drop_without_commit_rolls_back() {
        let uow = memory_uow();
        {
            let _tx = uow.begin_immediate().unwrap();
            uow.operators.create(&operator("A")).unwrap();
        }
        assert!(uow.operators.find_by_id("A").unwrap().is_none());
    }

    #[test]
    fn test_commit_persists() {
        let uow = memory_uow();
        let tx = uow.begin_immediate().unwrap();
        uow.operators.create(&operator("B")).unwrap();
        tx.commit().unwrap();
        assert!(uow.operators.find_by_id("B").unwrap().is_some());
    }
}
