// ==========================================
// 车间执行追踪系统 - 工艺路线数据源
// ==========================================
// 职责: 从外部数据源读取原始行 (列名 -> 字符串值)
// 支持: CSV 文件 / JSON 记录数组
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use async_trait::async_trait;
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// 原始行
pub type RawRecord = HashMap<String, String>;

// ==========================================
// RoutingSource Trait
// ==========================================
// 实现者: CsvRoutingSource / JsonRecordSource
#[async_trait]
pub trait RoutingSource: Send + Sync {
    /// 数据源描述 (用于日志)
    fn describe(&self) -> String;

    /// 读取全部原始行 (已去除完全空白的行)
    async fn load_records(&self) -> ImportResult<Vec<RawRecord>>;
}

// ==========================================
// CsvRoutingSource - CSV 文件
// ==========================================
pub struct CsvRoutingSource {
    path: PathBuf,
}

impl CsvRoutingSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl RoutingSource for CsvRoutingSource {
    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }

    async fn load_records(&self) -> ImportResult<Vec<RawRecord>> {
        // 检查文件存在
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Err(ImportError::FileNotFound(self.path.display().to_string()));
        }

        // 检查扩展名
        if let Some(ext) = self.path.extension() {
            if !ext.eq_ignore_ascii_case("csv") {
                return Err(ImportError::UnsupportedFormat(
                    ext.to_string_lossy().to_string(),
                ));
            }
        }

        let content = tokio::fs::read(&self.path).await?;
        parse_csv_records(&content)
    }
}

/// 解析 CSV 内容 (首行为表头)
pub fn parse_csv_records(content: &[u8]) -> ImportResult<Vec<RawRecord>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true) // 允许行长度不一致
        .trim(csv::Trim::All)
        .from_reader(content);

    // 读取表头
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().trim_start_matches('\u{feff}').to_lowercase())
        .collect();

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result?;
        let mut row_map = HashMap::new();

        for (col_idx, value) in record.iter().enumerate() {
            if let Some(header) = headers.get(col_idx) {
                row_map.insert(header.clone(), value.trim().to_string());
            }
        }

        // 跳过完全空白的行
        if row_map.values().all(|v| v.is_empty()) {
            continue;
        }

        records.push(row_map);
    }

    Ok(records)
}

// ==========================================
// JsonRecordSource - JSON 记录数组
// ==========================================
// 格式: [{"part_number": "P-100", "sequence_number": 10, ...}, ...]
pub struct JsonRecordSource {
    payload: String,
}

impl JsonRecordSource {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }
}

#[async_trait]
impl RoutingSource for JsonRecordSource {
    fn describe(&self) -> String {
        format!("json:{} bytes", self.payload.len())
    }

    async fn load_records(&self) -> ImportResult<Vec<RawRecord>> {
        parse_json_records(&self.payload)
    }
}

/// 解析 JSON 记录数组, 标量值统一转为字符串
pub fn parse_json_records(payload: &str) -> ImportResult<Vec<RawRecord>> {
    let value: serde_json::Value = serde_json::from_str(payload)?;
    let items = value.as_array().ok_or_else(|| {
        ImportError::JsonParseError("顶层必须是记录数组".to_string())
    })?;

    let mut records = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let obj = item.as_object().ok_or_else(|| ImportError::FieldMappingError {
            row: idx + 1,
            message: "记录必须是 JSON 对象".to_string(),
        })?;

        let mut row_map = HashMap::new();
        for (key, val) in obj {
            let text = match val {
                serde_json::Value::Null => String::new(),
                serde_json::Value::String(s) => s.trim().to_string(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                other => {
                    return Err(ImportError::TypeConversionError {
                        row: idx + 1,
                        field: key.clone(),
                        message: format!("不支持的值类型: {}", other),
                    })
                }
            };
            row_map.insert(key.trim().to_lowercase(), text);
        }

        if row_map.values().all(|v| v.is_empty()) {
            continue;
        }
        records.push(row_map);
    }

    Ok(records)
}
