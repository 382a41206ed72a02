// ==========================================
// 车间执行追踪系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::policy::{RiskPolicy, TravelSheetPolicy};
use crate::db::open_sqlite_connection;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值 (UPSERT)
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at)
             VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;

        tracing::info!(config_key = key, value, "配置已更新");
        Ok(())
    }

    /// 从 config_kv 表读取配置值，带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, Box<dyn Error>> {
        Ok(self.get_config_value(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// 读取数值配置; 格式错误时告警并回退默认值
    fn get_f64_or_default(&self, key: &str, default: f64) -> Result<f64, Box<dyn Error>> {
        let raw = self.get_config_or_default(key, &default.to_string())?;
        match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => {
                tracing::warn!(config_key = key, raw_value = %raw, "数值配置格式错误，使用默认值");
                Ok(default)
            }
        }
    }

    /// 获取所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key"
        )?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
            ))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        let json_value = json!(config_map);
        Ok(serde_json::to_string(&json_value)?)
    }

    // ===== 流转卡策略 =====

    /// 获取流转卡生成策略
    pub fn get_travel_sheet_policy(&self) -> Result<TravelSheetPolicy, Box<dyn Error>> {
        let defaults = TravelSheetPolicy::default();

        let allow_raw = self.get_config_or_default(
            config_keys::ALLOW_MULTIPLE_ACTIVE_SHEETS,
            if defaults.allow_multiple_active { "true" } else { "false" },
        )?;
        let allow_multiple_active = matches!(
            allow_raw.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        );

        let prefix = self.get_config_or_default(
            config_keys::SHEET_NUMBER_PREFIX,
            &defaults.sheet_number_prefix,
        )?;
        let sheet_number_prefix = if prefix.trim().is_empty() {
            defaults.sheet_number_prefix
        } else {
            prefix.trim().to_string()
        };

        Ok(TravelSheetPolicy {
            allow_multiple_active,
            sheet_number_prefix,
        })
    }

    // ===== 交期风险阈值 =====

    /// 获取交期风险阈值; 组合不合法时整体回退默认值
    pub fn get_risk_policy(&self) -> Result<RiskPolicy, Box<dyn Error>> {
        let defaults = RiskPolicy::default();

        let policy = RiskPolicy {
            working_minutes_per_day: self.get_f64_or_default(
                config_keys::RISK_WORKING_MINUTES_PER_DAY,
                defaults.working_minutes_per_day,
            )?,
            yellow_load_ratio: self
                .get_f64_or_default(config_keys::RISK_YELLOW_LOAD_RATIO, defaults.yellow_load_ratio)?,
            red_load_ratio: self
                .get_f64_or_default(config_keys::RISK_RED_LOAD_RATIO, defaults.red_load_ratio)?,
        };

        if let Err(reason) = policy.validate() {
            tracing::warn!(%reason, "交期风险阈值配置不合法，使用默认值");
            return Ok(defaults);
        }

        Ok(policy)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 流转卡
    pub const ALLOW_MULTIPLE_ACTIVE_SHEETS: &str = "travel_sheet.allow_multiple_active";
    pub const SHEET_NUMBER_PREFIX: &str = "travel_sheet.number_prefix";

    // 交期风险
    pub const RISK_WORKING_MINUTES_PER_DAY: &str = "risk.working_minutes_per_day";
    pub const RISK_YELLOW_LOAD_RATIO: &str = "risk.yellow_load_ratio";
    pub const RISK_RED_LOAD_RATIO: &str = "risk.red_load_ratio";
}
