// ==========================================
// 车间执行追踪系统 - 性能埋点
// ==========================================
// 职责:
// - 每次车间 API 调用输出耗时 + SQL 语句数 (PerfGuard)
// - 按 API 累计调用次数 / 耗时 / SQL 数, 服务退出时汇总输出
// - 慢 SQL 告警
// 说明: SQL 计数为线程局部, 与 spawn_blocking 的请求线程一一对应
// ==========================================

use rusqlite::Connection;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 车间 API 操作 (埋点维度)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerOp {
    GenerateTravelSheet,
    ProcessScan,
    CompleteOperation,
    CancelTravelSheet,
    GetTravelSheet,
    ListTravelSheets,
    AssessOrderRisk,
    RiskBoard,
    RegisterOrder,
    CancelOrder,
    DeleteOrder,
    ReplaceRouting,
}

const OP_COUNT: usize = 12;

impl TrackerOp {
    pub const ALL: [TrackerOp; OP_COUNT] = [
        TrackerOp::GenerateTravelSheet,
        TrackerOp::ProcessScan,
        TrackerOp::CompleteOperation,
        TrackerOp::CancelTravelSheet,
        TrackerOp::GetTravelSheet,
        TrackerOp::ListTravelSheets,
        TrackerOp::AssessOrderRisk,
        TrackerOp::RiskBoard,
        TrackerOp::RegisterOrder,
        TrackerOp::CancelOrder,
        TrackerOp::DeleteOrder,
        TrackerOp::ReplaceRouting,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TrackerOp::GenerateTravelSheet => "generate_travel_sheet",
            TrackerOp::ProcessScan => "process_scan",
            TrackerOp::CompleteOperation => "complete_operation",
            TrackerOp::CancelTravelSheet => "cancel_travel_sheet",
            TrackerOp::GetTravelSheet => "get_travel_sheet",
            TrackerOp::ListTravelSheets => "list_travel_sheets",
            TrackerOp::AssessOrderRisk => "assess_order_risk",
            TrackerOp::RiskBoard => "risk_board",
            TrackerOp::RegisterOrder => "register_order",
            TrackerOp::CancelOrder => "cancel_order",
            TrackerOp::DeleteOrder => "delete_order",
            TrackerOp::ReplaceRouting => "replace_routing",
        }
    }

    /// 扫码与报工在工位终端前同步等待, 单独标记
    pub fn is_station_facing(self) -> bool {
        matches!(self, TrackerOp::ProcessScan | TrackerOp::CompleteOperation)
    }

    fn index(self) -> usize {
        self as usize
    }
}

static PERF_SQL_ENABLED: AtomicBool = AtomicBool::new(false);
static SLOW_SQL_THRESHOLD_MS: AtomicU64 = AtomicU64::new(0);

#[allow(clippy::declare_interior_mutable_const)]
const ZERO: AtomicU64 = AtomicU64::new(0);
static OP_CALLS: [AtomicU64; OP_COUNT] = [ZERO; OP_COUNT];
static OP_ELAPSED_MS: [AtomicU64; OP_COUNT] = [ZERO; OP_COUNT];
static OP_SQL: [AtomicU64; OP_COUNT] = [ZERO; OP_COUNT];

thread_local! {
    static PERF_DEPTH: Cell<u32> = const { Cell::new(0) };
    static SQL_COUNT: Cell<u64> = const { Cell::new(0) };
    static SLOW_SQL_COUNT: Cell<u64> = const { Cell::new(0) };
}

fn env_flag(v: &str) -> bool {
    matches!(
        v.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

fn shorten_sql(sql: &str, max_len: usize) -> String {
    let s = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

/// 为车间库连接安装 SQL 计数与慢 SQL 告警
///
/// # 环境变量
/// - `SHOP_FLOOR_PERF_SQL`: 开关 (缺省 Debug 开 / Release 关)
/// - `SHOP_FLOOR_SLOW_SQL_MS`: 慢 SQL 阈值, 毫秒 (缺省 Debug 50 / Release 200)
pub fn install_sqlite_tracing(conn: &mut Connection) {
    let enabled = std::env::var("SHOP_FLOOR_PERF_SQL")
        .map(|v| env_flag(&v))
        .unwrap_or(cfg!(debug_assertions));
    PERF_SQL_ENABLED.store(enabled, Ordering::Relaxed);

    if !enabled {
        conn.trace(None);
        conn.profile(None);
        return;
    }

    let slow_ms = std::env::var("SHOP_FLOOR_SLOW_SQL_MS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(if cfg!(debug_assertions) { 50 } else { 200 });
    SLOW_SQL_THRESHOLD_MS.store(slow_ms, Ordering::Relaxed);

    conn.trace(Some(count_statement));
    conn.profile(Some(flag_slow_statement));
}

fn inside_guard() -> bool {
    PERF_DEPTH.with(|d| d.get() > 0)
}

fn count_statement(_sql: &str) {
    if PERF_SQL_ENABLED.load(Ordering::Relaxed) && inside_guard() {
        SQL_COUNT.with(|c| c.set(c.get().saturating_add(1)));
    }
}

fn flag_slow_statement(sql: &str, duration: Duration) {
    if !PERF_SQL_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let ms = duration.as_millis() as u64;
    let threshold = SLOW_SQL_THRESHOLD_MS.load(Ordering::Relaxed);
    if threshold == 0 || ms < threshold {
        return;
    }

    tracing::warn!(
        target: "slow_sql",
        duration_ms = ms,
        sql = %shorten_sql(sql, 420),
        "慢 SQL"
    );
    if inside_guard() {
        SLOW_SQL_COUNT.with(|c| c.set(c.get().saturating_add(1)));
    }
}

/// 单次 API 调用埋点: 析构时输出 elapsed_ms / sql_count / slow_sql_count 并计入累计
///
/// ```ignore
/// let _perf = PerfGuard::new(TrackerOp::ProcessScan);
/// ```
pub struct PerfGuard {
    op: TrackerOp,
    start: Instant,
    sql_start: u64,
    slow_sql_start: u64,
}

impl PerfGuard {
    pub fn new(op: TrackerOp) -> Self {
        PERF_DEPTH.with(|d| d.set(d.get().saturating_add(1)));
        Self {
            op,
            start: Instant::now(),
            sql_start: SQL_COUNT.with(|c| c.get()),
            slow_sql_start: SLOW_SQL_COUNT.with(|c| c.get()),
        }
    }

    /// 本次调用至今执行的 SQL 语句数
    pub fn sql_count(&self) -> u64 {
        SQL_COUNT.with(|c| c.get()).saturating_sub(self.sql_start)
    }
}

impl Drop for PerfGuard {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_millis() as u64;
        let sql_count = self.sql_count();
        let slow_sql_count = SLOW_SQL_COUNT
            .with(|c| c.get())
            .saturating_sub(self.slow_sql_start);

        let i = self.op.index();
        OP_CALLS[i].fetch_add(1, Ordering::Relaxed);
        OP_ELAPSED_MS[i].fetch_add(elapsed_ms, Ordering::Relaxed);
        OP_SQL[i].fetch_add(sql_count, Ordering::Relaxed);

        tracing::debug!(
            target: "perf",
            op = self.op.as_str(),
            station = self.op.is_station_facing(),
            elapsed_ms,
            sql_count,
            slow_sql_count,
            "done"
        );

        PERF_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// 单个 API 的累计指标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpStats {
    pub op: &'static str,
    pub calls: u64,
    pub total_elapsed_ms: u64,
    pub total_sql: u64,
}

/// 已被调用过的 API 累计指标
pub fn snapshot() -> Vec<OpStats> {
    TrackerOp::ALL
        .iter()
        .filter_map(|op| {
            let i = op.index();
            let calls = OP_CALLS[i].load(Ordering::Relaxed);
            (calls > 0).then(|| OpStats {
                op: op.as_str(),
                calls,
                total_elapsed_ms: OP_ELAPSED_MS[i].load(Ordering::Relaxed),
                total_sql: OP_SQL[i].load(Ordering::Relaxed),
            })
        })
        .collect()
}

/// 输出累计指标 (服务退出时调用)
pub fn log_summary() {
    for stats in snapshot() {
        tracing::info!(
            target: "perf",
            op = stats.op,
            calls = stats.calls,
            total_elapsed_ms = stats.total_elapsed_ms,
            total_sql = stats.total_sql,
            "API 累计指标"
        );
    }
}
