// ==========================================
// 车间执行追踪系统 - 工艺路线导入器
// ==========================================
// 导入流程:
// 1. 数据源读取 (CSV / JSON)
// 2. 字段映射与类型转换
// 3. 按料号分组 + 工艺路线校验 (非空 / 工序号不重复 / 字段合法)
// 4. 落库 (单一事务整体替换)
// 红线: 任何一行不合法则整批拒绝, 数据库不做任何变更
// ==========================================

use crate::domain::master_data::RoutingStep;
use crate::engine::travel_sheet_generator::TravelSheetGenerator;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::routing_mapper::RoutingFieldMapper;
use crate::importer::routing_source::RoutingSource;
use crate::repository::UnitOfWork;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

/// 导入结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingImportReport {
    /// 导入批次ID
    pub batch_id: String,
    /// 数据源描述
    pub source: String,
    /// 替换的料号 (升序)
    pub part_numbers: Vec<String>,
    /// 写入的工步数
    pub steps_imported: usize,
}

// ==========================================
// RoutingImporter - 工艺路线导入器
// ==========================================
pub struct RoutingImporter {
    db_path: String,
    mapper: RoutingFieldMapper,
    generator: TravelSheetGenerator,
}

impl RoutingImporter {
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            mapper: RoutingFieldMapper,
            generator: TravelSheetGenerator::new(),
        }
    }

    /// 从数据源导入工艺路线
    pub async fn import(&self, source: &dyn RoutingSource) -> ImportResult<RoutingImportReport> {
        let batch_id = Uuid::new_v4().to_string();
        let description = source.describe();
        info!(batch_id = %batch_id, source = %description, "开始导入工艺路线");

        // === 阶段 1: 读取 ===
        let records = source.load_records().await?;
        if records.is_empty() {
            return Err(ImportError::EmptyInput(description));
        }

        // === 阶段 2-3: 映射 + 校验 ===
        let steps = self.mapper.map_all(&records)?;
        let grouped = self.group_and_validate(steps)?;

        // === 阶段 4: 落库 ===
        let part_numbers: Vec<String> = grouped.iter().map(|(p, _)| p.clone()).collect();
        let db_path = self.db_path.clone();
        let steps_imported = tokio::task::spawn_blocking(move || -> ImportResult<usize> {
            let uow = UnitOfWork::open(&db_path)?;
            Ok(uow.routing.replace_parts(&grouped)?)
        })
        .await
        .map_err(|e| ImportError::InternalError(format!("导入任务异常终止: {}", e)))??;

        info!(
            batch_id = %batch_id,
            parts = part_numbers.len(),
            steps_imported,
            "工艺路线导入完成"
        );

        Ok(RoutingImportReport {
            batch_id,
            source: description,
            part_numbers,
            steps_imported,
        })
    }

    /// 按料号分组并校验
    fn group_and_validate(
        &self,
        steps: Vec<RoutingStep>,
    ) -> ImportResult<Vec<(String, Vec<RoutingStep>)>> {
        let mut grouped: BTreeMap<String, Vec<RoutingStep>> = BTreeMap::new();
        for step in steps {
            grouped.entry(step.part_number.clone()).or_default().push(step);
        }

        let mut parts = Vec::with_capacity(grouped.len());
        for (part_number, mut part_steps) in grouped {
            if let Err(e) = self.generator.validate_routing(&part_number, &part_steps) {
                warn!(part_number = %part_number, "工艺路线校验失败: {}", e);
                return Err(ImportError::InvalidRouting(e));
            }
            part_steps.sort_by_key(|s| s.sequence_number);
            parts.push((part_number, part_steps));
        }

        Ok(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::EngineError;
    use crate::importer::routing_source::JsonRecordSource;

    #[test]
    fn test_duplicate_sequence_rejects_whole_batch() {
        let importer = RoutingImporter::new(":memory:");
        let step = |part: &str, seq: u32| RoutingStep {
            part_number: part.to_string(),
            sequence_number: seq,
            process_code: "CUT".to_string(),
            process_name: "CUT".to_string(),
            work_center: None,
            standard_time_minutes: 1.0,
        };

        let ok = importer
            .group_and_validate(vec![step("B", 20), step("A", 10), step("B", 10)])
            .unwrap();
        assert_eq!(ok[0].0, "A");
        assert_eq!(ok[1].1.iter().map(|s| s.sequence_number).collect::<Vec<_>>(), vec![10, 20]);

        let err = importer
            .group_and_validate(vec![step("A", 10), step("A", 10)])
            .unwrap_err();
        assert!(matches!(
            err,
            ImportError::InvalidRouting(EngineError::InvalidRouting { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_source_rejected() {
        let importer = RoutingImporter::new(":memory:");
        let err = importer.import(&JsonRecordSource::new("[]")).await.unwrap_err();
        assert!(matches!(err, ImportError::EmptyInput(_)));
    }
}
