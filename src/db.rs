// ==========================================
// 车间执行追踪系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为 (外键 / WAL / busy_timeout)
// - 每个请求独立连接, 写入由 SQLite 串行化, 读取可并行
// - 建表语句集中维护, 启动时幂等执行
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 时间戳存储格式
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 日期存储格式
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// 建表语句 (幂等)
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL DEFAULT 'global',
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS production_order (
    order_id TEXT PRIMARY KEY,
    order_no TEXT NOT NULL UNIQUE,
    part_number TEXT NOT NULL,
    quantity INTEGER NOT NULL CHECK (quantity >= 0),
    quantity_completed INTEGER NOT NULL DEFAULT 0 CHECK (quantity_completed >= 0),
    quantity_scrapped INTEGER NOT NULL DEFAULT 0 CHECK (quantity_scrapped >= 0),
    status TEXT NOT NULL,
    due_date TEXT,
    priority TEXT NOT NULL DEFAULT 'NORMAL',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    revision INTEGER NOT NULL DEFAULT 0,
    CHECK (quantity_completed + quantity_scrapped <= quantity)
);

CREATE TABLE IF NOT EXISTS operator (
    operator_id TEXT PRIMARY KEY,
    badge_token TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS routing_step (
    part_number TEXT NOT NULL,
    sequence_number INTEGER NOT NULL,
    process_code TEXT NOT NULL,
    process_name TEXT NOT NULL,
    work_center TEXT,
    standard_time_minutes REAL NOT NULL DEFAULT 0,
    PRIMARY KEY (part_number, sequence_number)
);

CREATE TABLE IF NOT EXISTS travel_sheet (
    sheet_id TEXT PRIMARY KEY,
    sheet_no TEXT NOT NULL UNIQUE,
    order_id TEXT NOT NULL REFERENCES production_order(order_id),
    batch_id TEXT,
    allocated_quantity INTEGER NOT NULL DEFAULT 0 CHECK (allocated_quantity >= 0),
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    closed_at TEXT,
    revision INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_travel_sheet_order ON travel_sheet(order_id, status);

CREATE TABLE IF NOT EXISTS operation (
    operation_id TEXT PRIMARY KEY,
    sheet_id TEXT NOT NULL REFERENCES travel_sheet(sheet_id) ON DELETE CASCADE,
    sequence_number INTEGER NOT NULL,
    process_code TEXT NOT NULL,
    process_name TEXT NOT NULL,
    work_center TEXT,
    standard_time_minutes REAL NOT NULL DEFAULT 0,
    checkpoint_token TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL,
    operator_id TEXT REFERENCES operator(operator_id),
    start_time TEXT,
    end_time TEXT,
    quantity_good INTEGER,
    quantity_scrap INTEGER,
    quantity_pending INTEGER,
    notes TEXT,
    revision INTEGER NOT NULL DEFAULT 0,
    UNIQUE (sheet_id, sequence_number)
);

INSERT OR IGNORE INTO schema_version (version) VALUES (1);
"#;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
/// - journal_mode=WAL 为库级设置, 重复执行幂等 (内存库保持 memory)
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let mut conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    crate::perf::install_sqlite_tracing(&mut conn);
    Ok(conn)
}

/// 初始化 schema (幂等)
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    match read_schema_version(conn)? {
        Some(v) if v > CURRENT_SCHEMA_VERSION => {
            tracing::warn!(
                db_version = v,
                expected = CURRENT_SCHEMA_VERSION,
                "数据库 schema_version 高于当前代码期望版本"
            );
        }
        _ => {}
    }

    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

// ==========================================
// 行映射辅助函数
// ==========================================

/// 格式化时间戳
pub fn format_datetime(value: &NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

/// 格式化日期
pub fn format_date(value: &NaiveDate) -> String {
    value.format(DATE_FORMAT).to_string()
}

/// 解析时间戳列
pub fn parse_datetime_column(idx: usize, raw: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// 解析可空时间戳列
pub fn parse_optional_datetime_column(
    idx: usize,
    raw: Option<String>,
) -> rusqlite::Result<Option<NaiveDateTime>> {
    raw.map(|s| parse_datetime_column(idx, &s)).transpose()
}

/// 解析可空日期列
pub fn parse_optional_date_column(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<NaiveDate>> {
    raw.map(|s| {
        NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}

/// 解析枚举列 (未知取值视为数据损坏)
pub fn parse_enum_column<T>(
    idx: usize,
    raw: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("未知枚举取值: {}", raw).into(),
        )
    })
}
