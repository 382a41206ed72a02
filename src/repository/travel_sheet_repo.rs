// ==========================================
// 车间执行追踪系统 - 流转卡数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: 流转卡独占工序, 读取时一并加载
// ==========================================

use crate::db::{
    format_datetime, parse_datetime_column, parse_enum_column, parse_optional_datetime_column,
};
use crate::domain::travel_sheet::TravelSheet;
use crate::domain::types::TravelSheetStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::operation_repo::{insert_operation, load_operations_for_sheet};
use crate::repository::revision_conflict;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

const SHEET_COLUMNS: &str = r#"SELECT sheet_id, sheet_no, order_id, batch_id, allocated_quantity,
       status, created_at, closed_at, revision
  FROM travel_sheet"#;

// ==========================================
// TravelSheetRepository - 流转卡仓储
// ==========================================
pub struct TravelSheetRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TravelSheetRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入流转卡及其全部工序
    ///
    /// 说明: 调用方负责事务 (与订单状态变更同一事务提交)
    pub fn insert(&self, sheet: &TravelSheet) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"INSERT INTO travel_sheet (
                sheet_id, sheet_no, order_id, batch_id, allocated_quantity,
                status, created_at, closed_at, revision
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &sheet.sheet_id,
                &sheet.sheet_no,
                &sheet.order_id,
                &sheet.batch_id,
                sheet.allocated_quantity,
                sheet.status.to_db_str(),
                format_datetime(&sheet.created_at),
                sheet.closed_at.as_ref().map(format_datetime),
                sheet.revision,
            ],
        )?;

        for op in &sheet.operations {
            insert_operation(&conn, op)?;
        }

        Ok(sheet.sheet_id.clone())
    }

    /// 按ID查询流转卡 (含工序)
    pub fn find_by_id(&self, sheet_id: &str) -> RepositoryResult<Option<TravelSheet>> {
        let conn = self.get_conn()?;

        let header = match conn.query_row(
            &format!("{} WHERE sheet_id = ?", SHEET_COLUMNS),
            params![sheet_id],
            map_header_row,
        ) {
            Ok(sheet) => sheet,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut sheet = header;
        sheet.operations = load_operations_for_sheet(&conn, &sheet.sheet_id)?;
        sheet.sort_operations();
        Ok(Some(sheet))
    }

    /// 查询订单下全部流转卡 (含工序, 按创建时间)
    pub fn find_by_order(&self, order_id: &str) -> RepositoryResult<Vec<TravelSheet>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE order_id = ? ORDER BY created_at ASC, sheet_no ASC",
            SHEET_COLUMNS
        ))?;

        let headers = stmt
            .query_map(params![order_id], map_header_row)?
            .collect::<Result<Vec<TravelSheet>, _>>()?;

        let mut sheets = Vec::with_capacity(headers.len());
        for mut sheet in headers {
            sheet.operations = load_operations_for_sheet(&conn, &sheet.sheet_id)?;
            sheet.sort_operations();
            sheets.push(sheet);
        }

        Ok(sheets)
    }

    /// 订单已生成的流转卡总数 (含作废, 用于编号)
    pub fn count_by_order(&self, order_id: &str) -> RepositoryResult<u32> {
        let conn = self.get_conn()?;
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM travel_sheet WHERE order_id = ?",
            params![order_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// 订单下指定状态的流转卡数量
    pub fn count_by_order_and_status(
        &self,
        order_id: &str,
        status: TravelSheetStatus,
    ) -> RepositoryResult<u32> {
        let conn = self.get_conn()?;
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM travel_sheet WHERE order_id = ? AND status = ?",
            params![order_id, status.to_db_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// 仍引用订单的流转卡数量 (未作废)
    pub fn count_referencing_order(&self, order_id: &str) -> RepositoryResult<u32> {
        let conn = self.get_conn()?;
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM travel_sheet WHERE order_id = ? AND status <> 'CANCELLED'",
            params![order_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// 订单已分配给未作废流转卡的数量合计
    pub fn sum_allocated_by_order(&self, order_id: &str) -> RepositoryResult<u32> {
        let conn = self.get_conn()?;
        let total: u32 = conn.query_row(
            r#"SELECT COALESCE(SUM(allocated_quantity), 0) FROM travel_sheet
               WHERE order_id = ? AND status <> 'CANCELLED'"#,
            params![order_id],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// 删除订单下已作废的流转卡 (工序级联删除)
    ///
    /// 说明: 仅用于订单删除; 调用方负责事务
    pub fn delete_cancelled_by_order(&self, order_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "DELETE FROM travel_sheet WHERE order_id = ? AND status = 'CANCELLED'",
            params![order_id],
        )?;
        Ok(rows)
    }

    /// 更新流转卡状态 (带乐观锁检查)
    pub fn update_status(
        &self,
        sheet: &TravelSheet,
        status: TravelSheetStatus,
        closed_at: Option<NaiveDateTime>,
    ) -> RepositoryResult<i32> {
        let conn = self.get_conn()?;

        let rows_affected = conn.execute(
            r#"UPDATE travel_sheet
               SET status = ?, closed_at = ?, revision = revision + 1
               WHERE sheet_id = ? AND revision = ?"#,
            params![
                status.to_db_str(),
                closed_at.as_ref().map(format_datetime),
                &sheet.sheet_id,
                sheet.revision,
            ],
        )?;

        if rows_affected == 0 {
            return Err(revision_conflict(
                &conn,
                "travel_sheet",
                "sheet_id",
                "TravelSheet",
                &sheet.sheet_id,
                sheet.revision,
            ));
        }

        Ok(sheet.revision + 1)
    }
}

/// 映射流转卡表头 (工序另行加载)
fn map_header_row(row: &rusqlite::Row) -> rusqlite::Result<TravelSheet> {
    Ok(TravelSheet {
        sheet_id: row.get(0)?,
        sheet_no: row.get(1)?,
        order_id: row.get(2)?,
        batch_id: row.get(3)?,
        allocated_quantity: row.get(4)?,
        status: parse_enum_column(5, &row.get::<_, String>(5)?, TravelSheetStatus::from_str)?,
        created_at: parse_datetime_column(6, &row.get::<_, String>(6)?)?,
        closed_at: parse_optional_datetime_column(7, row.get(7)?)?,
        revision: row.get(8)?,
        operations: Vec::new(),
    })
}
