// ==========================================
// 车间执行追踪系统 - 生产订单数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 并发: 所有更新带 revision 乐观锁检查
// ==========================================

use crate::db::{
    format_date, format_datetime, parse_datetime_column, parse_enum_column,
    parse_optional_date_column,
};
use crate::domain::production_order::ProductionOrder;
use crate::domain::types::{OrderPriority, OrderStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::revision_conflict;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"SELECT order_id, order_no, part_number, quantity,
       quantity_completed, quantity_scrapped, status, due_date, priority,
       created_at, updated_at, revision
  FROM production_order"#;

// ==========================================
// ProductionOrderRepository - 生产订单仓储
// ==========================================
pub struct ProductionOrderRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProductionOrderRepository {
    /// 创建新的ProductionOrderRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 创建订单
    ///
    /// # 返回
    /// - `Ok(order_id)`: 成功
    /// - `Err(UniqueConstraintViolation)`: 订单号重复
    pub fn create(&self, order: &ProductionOrder) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"INSERT INTO production_order (
                order_id, order_no, part_number, quantity,
                quantity_completed, quantity_scrapped, status, due_date, priority,
                created_at, updated_at, revision
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &order.order_id,
                &order.order_no,
                &order.part_number,
                order.quantity,
                order.quantity_completed,
                order.quantity_scrapped,
                order.status.to_db_str(),
                order.due_date.as_ref().map(format_date),
                order.priority.to_db_str(),
                format_datetime(&order.created_at),
                format_datetime(&order.updated_at),
                order.revision,
            ],
        )?;

        Ok(order.order_id.clone())
    }

    /// 按order_id查询订单
    pub fn find_by_id(&self, order_id: &str) -> RepositoryResult<Option<ProductionOrder>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            &format!("{} WHERE order_id = ?", SELECT_COLUMNS),
            params![order_id],
            map_row,
        ) {
            Ok(order) => Ok(Some(order)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 按订单号查询订单
    pub fn find_by_order_no(&self, order_no: &str) -> RepositoryResult<Option<ProductionOrder>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            &format!("{} WHERE order_no = ?", SELECT_COLUMNS),
            params![order_no],
            map_row,
        ) {
            Ok(order) => Ok(Some(order)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询未结订单 (非完工/取消), 交期早的在前, 无交期排最后
    pub fn list_open(&self) -> RepositoryResult<Vec<ProductionOrder>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            r#"{}
               WHERE status NOT IN ('COMPLETED', 'CANCELLED')
               ORDER BY due_date IS NULL, due_date ASC, created_at ASC"#,
            SELECT_COLUMNS
        ))?;

        let orders = stmt
            .query_map([], map_row)?
            .collect::<Result<Vec<ProductionOrder>, _>>()?;

        Ok(orders)
    }

    /// 更新订单状态与汇总字段 (带乐观锁检查)
    ///
    /// # 并发控制
    /// `WHERE revision = ?` 比较并交换; 成功后 revision + 1
    ///
    /// # 返回
    /// - `Ok(new_revision)`
    /// - `Err(OptimisticLockFailure)`: 其他请求已修改
    /// - `Err(NotFound)`: 订单不存在
    pub fn update_progress(&self, order: &ProductionOrder) -> RepositoryResult<i32> {
        let conn = self.get_conn()?;

        let rows_affected = conn.execute(
            r#"UPDATE production_order
               SET quantity_completed = ?, quantity_scrapped = ?, status = ?,
                   updated_at = ?, revision = revision + 1
               WHERE order_id = ? AND revision = ?"#,
            params![
                order.quantity_completed,
                order.quantity_scrapped,
                order.status.to_db_str(),
                format_datetime(&order.updated_at),
                &order.order_id,
                order.revision,
            ],
        )?;

        if rows_affected == 0 {
            return Err(revision_conflict(
                &conn,
                "production_order",
                "order_id",
                "ProductionOrder",
                &order.order_id,
                order.revision,
            ));
        }

        Ok(order.revision + 1)
    }

    /// 删除订单
    ///
    /// 说明: 是否允许删除由 API 层判断 (存在未作废流转卡时禁止)
    pub fn delete(&self, order_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        let rows = conn.execute(
            "DELETE FROM production_order WHERE order_id = ?",
            params![order_id],
        )?;

        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ProductionOrder".to_string(),
                id: order_id.to_string(),
            });
        }

        Ok(())
    }
}

/// 映射数据库行到ProductionOrder对象
fn map_row(row: &rusqlite::Row) -> rusqlite::Result<ProductionOrder> {
    Ok(ProductionOrder {
        order_id: row.get(0)?,
        order_no: row.get(1)?,
        part_number: row.get(2)?,
        quantity: row.get(3)?,
        quantity_completed: row.get(4)?,
        quantity_scrapped: row.get(5)?,
        status: parse_enum_column(6, &row.get::<_, String>(6)?, OrderStatus::from_str)?,
        due_date: parse_optional_date_column(7, row.get(7)?)?,
        priority: parse_enum_column(8, &row.get::<_, String>(8)?, OrderPriority::from_str)?,
        created_at: parse_datetime_column(9, &row.get::<_, String>(9)?)?,
        updated_at: parse_datetime_column(10, &row.get::<_, String>(10)?)?,
        revision: row.get(11)?,
    })
}
