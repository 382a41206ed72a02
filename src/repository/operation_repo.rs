// ==========================================
// 车间执行追踪系统 - 工序数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑 (状态机规则在引擎层)
// 并发: 状态迁移 = 期望状态 + revision 的比较并交换
// ==========================================

use crate::db::{format_datetime, parse_enum_column, parse_optional_datetime_column};
use crate::domain::operation::{Operation, QuantityField, ResolvedQuantities};
use crate::domain::types::OperationStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::revision_conflict;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

pub(crate) const OPERATION_COLUMNS: &str = r#"SELECT operation_id, sheet_id, sequence_number,
       process_code, process_name, work_center, standard_time_minutes,
       checkpoint_token, status, operator_id, start_time, end_time,
       quantity_good, quantity_scrap, quantity_pending, notes, revision
  FROM operation"#;

// ==========================================
// OperationRepository - 工序仓储
// ==========================================
pub struct OperationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl OperationRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 按ID查询工序
    pub fn find_by_id(&self, operation_id: &str) -> RepositoryResult<Option<Operation>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            &format!("{} WHERE operation_id = ?", OPERATION_COLUMNS),
            params![operation_id],
            map_operation_row,
        ) {
            Ok(op) => Ok(Some(op)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 按检查点令牌查询工序 (唯一索引)
    pub fn find_by_checkpoint_token(&self, token: &str) -> RepositoryResult<Option<Operation>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            &format!("{} WHERE checkpoint_token = ?", OPERATION_COLUMNS),
            params![token],
            map_operation_row,
        ) {
            Ok(op) => Ok(Some(op)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询流转卡下全部工序 (工序号升序)
    pub fn list_by_sheet(&self, sheet_id: &str) -> RepositoryResult<Vec<Operation>> {
        let conn = self.get_conn()?;
        load_operations_for_sheet(&conn, sheet_id)
    }

    /// 开工: Pending -> InProgress
    ///
    /// # 返回
    /// - `Ok(new_revision)`
    /// - `Err(OptimisticLockFailure)`: 状态或 revision 已被其他请求修改
    pub fn mark_started(
        &self,
        operation: &Operation,
        operator_id: &str,
        start_time: NaiveDateTime,
    ) -> RepositoryResult<i32> {
        let conn = self.get_conn()?;

        let rows_affected = conn.execute(
            r#"UPDATE operation
               SET status = 'IN_PROGRESS', operator_id = ?, start_time = ?,
                   revision = revision + 1
               WHERE operation_id = ? AND status = 'PENDING' AND revision = ?"#,
            params![
                operator_id,
                format_datetime(&start_time),
                &operation.operation_id,
                operation.revision,
            ],
        )?;

        if rows_affected == 0 {
            return Err(revision_conflict(
                &conn,
                "operation",
                "operation_id",
                "Operation",
                &operation.operation_id,
                operation.revision,
            ));
        }

        Ok(operation.revision + 1)
    }

    /// 完工: InProgress -> Completed, 同时写入数量三元组
    ///
    /// 条件: 状态为 IN_PROGRESS 且开工操作员一致且 revision 未变
    pub fn mark_completed(
        &self,
        operation: &Operation,
        operator_id: &str,
        quantities: &ResolvedQuantities,
        end_time: NaiveDateTime,
        notes: Option<&str>,
    ) -> RepositoryResult<i32> {
        let conn = self.get_conn()?;

        let rows_affected = conn.execute(
            r#"UPDATE operation
               SET status = 'COMPLETED', end_time = ?,
                   quantity_good = ?, quantity_scrap = ?, quantity_pending = ?,
                   notes = ?, revision = revision + 1
               WHERE operation_id = ? AND status = 'IN_PROGRESS'
                 AND operator_id = ? AND revision = ?"#,
            params![
                format_datetime(&end_time),
                quantities.good,
                quantities.scrap,
                quantities.pending,
                notes,
                &operation.operation_id,
                operator_id,
                operation.revision,
            ],
        )?;

        if rows_affected == 0 {
            return Err(revision_conflict(
                &conn,
                "operation",
                "operation_id",
                "Operation",
                &operation.operation_id,
                operation.revision,
            ));
        }

        Ok(operation.revision + 1)
    }

    /// 无投入关闭: Pending -> Completed, 数量三元组记为 0
    ///
    /// 说明: 前道合格数为 0 时后续工序不再有实物流入, 不记操作员
    pub fn close_without_intake(
        &self,
        operation: &Operation,
        end_time: NaiveDateTime,
    ) -> RepositoryResult<i32> {
        let conn = self.get_conn()?;

        let rows_affected = conn.execute(
            r#"UPDATE operation
               SET status = 'COMPLETED', end_time = ?,
                   quantity_good = 0, quantity_scrap = 0, quantity_pending = 0,
                   revision = revision + 1
               WHERE operation_id = ? AND status = 'PENDING' AND revision = ?"#,
            params![
                format_datetime(&end_time),
                &operation.operation_id,
                operation.revision,
            ],
        )?;

        if rows_affected == 0 {
            return Err(revision_conflict(
                &conn,
                "operation",
                "operation_id",
                "Operation",
                &operation.operation_id,
                operation.revision,
            ));
        }

        Ok(operation.revision + 1)
    }
}

/// 加载流转卡下的工序 (供流转卡仓储复用)
pub(crate) fn load_operations_for_sheet(
    conn: &Connection,
    sheet_id: &str,
) -> RepositoryResult<Vec<Operation>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE sheet_id = ? ORDER BY sequence_number ASC",
        OPERATION_COLUMNS
    ))?;

    let ops = stmt
        .query_map(params![sheet_id], map_operation_row)?
        .collect::<Result<Vec<Operation>, _>>()?;

    Ok(ops)
}

/// 写入单条工序 (调用方负责事务)
pub(crate) fn insert_operation(conn: &Connection, op: &Operation) -> RepositoryResult<()> {
    conn.execute(
        r#"INSERT INTO operation (
            operation_id, sheet_id, sequence_number, process_code, process_name,
            work_center, standard_time_minutes, checkpoint_token, status,
            operator_id, start_time, end_time,
            quantity_good, quantity_scrap, quantity_pending, notes, revision
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        params![
            &op.operation_id,
            &op.sheet_id,
            op.sequence_number,
            &op.process_code,
            &op.process_name,
            &op.work_center,
            op.standard_time_minutes,
            &op.checkpoint_token,
            op.status.to_db_str(),
            &op.operator_id,
            op.start_time.as_ref().map(format_datetime),
            op.end_time.as_ref().map(format_datetime),
            op.quantity_good.as_option(),
            op.quantity_scrap.as_option(),
            op.quantity_pending.as_option(),
            &op.notes,
            op.revision,
        ],
    )?;
    Ok(())
}

/// 映射数据库行到Operation对象 (NULL 数量 -> QuantityField::Unset)
pub(crate) fn map_operation_row(row: &rusqlite::Row) -> rusqlite::Result<Operation> {
    Ok(Operation {
        operation_id: row.get(0)?,
        sheet_id: row.get(1)?,
        sequence_number: row.get(2)?,
        process_code: row.get(3)?,
        process_name: row.get(4)?,
        work_center: row.get(5)?,
        standard_time_minutes: row.get(6)?,
        checkpoint_token: row.get(7)?,
        status: parse_enum_column(8, &row.get::<_, String>(8)?, OperationStatus::from_str)?,
        operator_id: row.get(9)?,
        start_time: parse_optional_datetime_column(10, row.get(10)?)?,
        end_time: parse_optional_datetime_column(11, row.get(11)?)?,
        quantity_good: QuantityField::from(row.get::<_, Option<u32>>(12)?),
        quantity_scrap: QuantityField::from(row.get::<_, Option<u32>>(13)?),
        quantity_pending: QuantityField::from(row.get::<_, Option<u32>>(14)?),
        notes: row.get(15)?,
        revision: row.get(16)?,
    })
}
