// ==========================================
// 车间执行追踪系统 - 操作员数据仓储
// ==========================================
// 说明: badge_token 唯一索引, 扫码解析 O(1)
// ==========================================

use crate::domain::master_data::Operator;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

// ==========================================
// OperatorRepository - 操作员仓储
// ==========================================
pub struct OperatorRepository {
    conn: Arc<Mutex<Connection>>,
}

impl OperatorRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 新增操作员
    pub fn create(&self, operator: &Operator) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"INSERT INTO operator (operator_id, badge_token, display_name, active)
               VALUES (?, ?, ?, ?)"#,
            params![
                &operator.operator_id,
                &operator.badge_token,
                &operator.display_name,
                operator.active,
            ],
        )?;

        Ok(operator.operator_id.clone())
    }

    /// 按工牌令牌查询 (含已停用)
    pub fn find_by_badge_token(&self, badge_token: &str) -> RepositoryResult<Option<Operator>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            r#"SELECT operator_id, badge_token, display_name, active
               FROM operator
               WHERE badge_token = ?"#,
            params![badge_token],
            map_row,
        ) {
            Ok(op) => Ok(Some(op)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 按ID查询
    pub fn find_by_id(&self, operator_id: &str) -> RepositoryResult<Option<Operator>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            r#"SELECT operator_id, badge_token, display_name, active
               FROM operator
               WHERE operator_id = ?"#,
            params![operator_id],
            map_row,
        ) {
            Ok(op) => Ok(Some(op)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 启用/停用操作员
    pub fn set_active(&self, operator_id: &str, active: bool) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        let rows = conn.execute(
            "UPDATE operator SET active = ? WHERE operator_id = ?",
            params![active, operator_id],
        )?;

        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Operator".to_string(),
                id: operator_id.to_string(),
            });
        }

        Ok(())
    }
}

fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Operator> {
    Ok(Operator {
        operator_id: row.get(0)?,
        badge_token: row.get(1)?,
        display_name: row.get(2)?,
        active: row.get(3)?,
    })
}
