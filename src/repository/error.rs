// ==========================================
// 车间执行追踪系统 - 仓储层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 约束错误按 SQLite 扩展错误码区分, 不依赖错误文本
// ==========================================

use rusqlite::ffi;
use thiserror::Error;

/// 仓储层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    // ===== 比较并交换 =====
    /// 行的 revision 已被其他请求推进 (或状态条件不再成立)
    #[error("修订号不匹配: {entity} id={id}, 期望 revision={expected}, 当前 revision={actual}")]
    OptimisticLockFailure {
        entity: String,
        id: String,
        expected: i32,
        actual: i32,
    },

    #[error("{entity} 不存在: id={id}")]
    NotFound { entity: String, id: String },

    // ===== 连接 / 事务 =====
    #[error("打开车间数据库失败: {0}")]
    DatabaseConnectionError(String),

    #[error("连接互斥锁已中毒: {0}")]
    LockError(String),

    #[error("事务控制失败: {0}")]
    DatabaseTransactionError(String),

    // ===== 语句 / 约束 =====
    #[error("SQL 执行失败: {0}")]
    DatabaseQueryError(String),

    /// 工单号 / 工牌 / 流转卡号 / 检查点令牌 重复
    #[error("唯一键冲突: {0}")]
    UniqueConstraintViolation(String),

    #[error("引用的记录不存在: {0}")]
    ForeignKeyViolation(String),

    /// 数量汇总越界等 CHECK 约束
    #[error("检查约束违反: {0}")]
    CheckConstraintViolation(String),
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(failure, msg) => {
                let detail = msg.unwrap_or_else(|| failure.to_string());
                match failure.extended_code {
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        RepositoryError::UniqueConstraintViolation(detail)
                    }
                    ffi::SQLITE_CONSTRAINT_FOREIGNKEY => RepositoryError::ForeignKeyViolation(detail),
                    ffi::SQLITE_CONSTRAINT_CHECK => RepositoryError::CheckConstraintViolation(detail),
                    _ => RepositoryError::DatabaseQueryError(detail),
                }
            }
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                entity: "row".to_string(),
                id: "-".to_string(),
            },
            other => RepositoryError::DatabaseQueryError(other.to_string()),
        }
    }
}

/// Result 类型别名
pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::{params, Connection};

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"PRAGMA foreign_keys = ON;
               CREATE TABLE parent (id TEXT PRIMARY KEY);
               CREATE TABLE child (
                   id TEXT PRIMARY KEY,
                   parent_id TEXT REFERENCES parent(id),
                   qty INTEGER CHECK (qty >= 0)
               );
               INSERT INTO parent (id) VALUES ('P1');"#,
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_constraint_failures_map_by_extended_code() {
        let conn = conn();

        let err: RepositoryError = conn
            .execute("INSERT INTO parent (id) VALUES ('P1')", [])
            .unwrap_err()
            .into();
        assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)));

        let err: RepositoryError = conn
            .execute("INSERT INTO child (id, parent_id, qty) VALUES ('C1', 'NOPE', 1)", [])
            .unwrap_err()
            .into();
        assert!(matches!(err, RepositoryError::ForeignKeyViolation(_)));

        let err: RepositoryError = conn
            .execute("INSERT INTO child (id, parent_id, qty) VALUES ('C2', 'P1', ?)", params![-1])
            .unwrap_err()
            .into();
        assert!(matches!(err, RepositoryError::CheckConstraintViolation(_)));
    }

    #[test]
    fn test_missing_row_is_not_found() {
        let conn = conn();
        let err: RepositoryError = conn
            .query_row("SELECT id FROM parent WHERE id = 'X'", [], |row| row.get::<_, String>(0))
            .unwrap_err()
            .into();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }
}
