// ==========================================
// 车间执行追踪系统 - 工艺路线字段映射
// ==========================================
// 职责: 原始行 -> RoutingStep (类型转换 + 必填校验)
// 列名: part_number / sequence_number / process_code / process_name
//       work_center (可选) / standard_time_minutes (可选, 默认 0)
// ==========================================

use crate::domain::master_data::RoutingStep;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::routing_source::RawRecord;

pub struct RoutingFieldMapper;

impl RoutingFieldMapper {
    /// 映射单行
    ///
    /// # 参数
    /// - `row`: 行号 (从 1 开始, 用于报错)
    /// - `record`: 原始行
    pub fn map_record(&self, row: usize, record: &RawRecord) -> ImportResult<RoutingStep> {
        let part_number = required(row, record, "part_number")?;
        let process_code = required(row, record, "process_code")?;

        let sequence_raw = required(row, record, "sequence_number")?;
        let sequence_number =
            sequence_raw
                .parse::<u32>()
                .map_err(|e| ImportError::TypeConversionError {
                    row,
                    field: "sequence_number".to_string(),
                    message: format!("{} ({})", e, sequence_raw),
                })?;

        let process_name = optional(record, "process_name").unwrap_or_else(|| process_code.clone());
        let work_center = optional(record, "work_center");

        let standard_time_minutes = match optional(record, "standard_time_minutes") {
            None => 0.0,
            Some(raw) => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .ok_or_else(|| ImportError::TypeConversionError {
                    row,
                    field: "standard_time_minutes".to_string(),
                    message: format!("非法工时: {}", raw),
                })?,
        };

        Ok(RoutingStep {
            part_number,
            sequence_number,
            process_code,
            process_name,
            work_center,
            standard_time_minutes,
        })
    }

    /// 映射全部行
    pub fn map_all(&self, records: &[RawRecord]) -> ImportResult<Vec<RoutingStep>> {
        records
            .iter()
            .enumerate()
            .map(|(idx, record)| self.map_record(idx + 1, record))
            .collect()
    }
}

fn required(row: usize, record: &RawRecord, field: &str) -> ImportResult<String> {
    optional(record, field).ok_or_else(|| ImportError::FieldMappingError {
        row,
        message: format!("缺少必填字段 {}", field),
    })
}

fn optional(record: &RawRecord, field: &str) -> Option<String> {
    record
        .get(field)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn record(pairs: &[(&str, &str)]) -> RawRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>()
    }

    #[test]
    fn test_map_full_record() {
        let step = RoutingFieldMapper
            .map_record(
                1,
                &record(&[
                    ("part_number", "P-1"),
                    ("sequence_number", "20"),
                    ("process_code", "WELD"),
                    ("process_name", "焊接"),
                    ("work_center", "WC-2"),
                    ("standard_time_minutes", "2.5"),
                ]),
            )
            .unwrap();
        assert_eq!(step.sequence_number, 20);
        assert_eq!(step.process_name, "焊接");
        assert_eq!(step.work_center.as_deref(), Some("WC-2"));
        assert_eq!(step.standard_time_minutes, 2.5);
    }

    #[test]
    fn test_defaults_and_errors() {
        let step = RoutingFieldMapper
            .map_record(
                1,
                &record(&[("part_number", "P-1"), ("sequence_number", "10"), ("process_code", "CUT")]),
            )
            .unwrap();
        assert_eq!(step.process_name, "CUT");
        assert_eq!(step.standard_time_minutes, 0.0);

        let err = RoutingFieldMapper
            .map_record(3, &record(&[("part_number", "P-1"), ("process_code", "CUT")]))
            .unwrap_err();
        assert!(matches!(err, ImportError::FieldMappingError { row: 3, .. }));

        let err = RoutingFieldMapper
            .map_record(
                2,
                &record(&[("part_number", "P-1"), ("sequence_number", "ten"), ("process_code", "CUT")]),
            )
            .unwrap_err();
        assert!(matches!(err, ImportError::TypeConversionError { row: 2, .. }));
    }
}
