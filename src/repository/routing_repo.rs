// ==========================================
// 车间执行追踪系统 - 工艺路线数据仓储
// ==========================================
// 说明: 工艺路线为外部主数据, 本核心只读;
//       replace_steps 供主数据同步使用
// ==========================================

use crate::domain::master_data::RoutingStep;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

// ==========================================
// RoutingCatalogRepository - 工艺路线仓储
// ==========================================
pub struct RoutingCatalogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl RoutingCatalogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 按料号查询工步 (工序号升序)
    pub fn find_by_part_number(&self, part_number: &str) -> RepositoryResult<Vec<RoutingStep>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT part_number, sequence_number, process_code, process_name,
                      work_center, standard_time_minutes
               FROM routing_step
               WHERE part_number = ?
               ORDER BY sequence_number ASC"#,
        )?;

        let steps = stmt
            .query_map(params![part_number], |row| {
                Ok(RoutingStep {
                    part_number: row.get(0)?,
                    sequence_number: row.get(1)?,
                    process_code: row.get(2)?,
                    process_name: row.get(3)?,
                    work_center: row.get(4)?,
                    standard_time_minutes: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<RoutingStep>, _>>()?;

        Ok(steps)
    }

    /// 整体替换某料号的工艺路线
    ///
    /// # 红线
    /// - 必须在事务中完成 (先删后插)
    /// - 已生成的流转卡不受影响 (工序为快照)
    pub fn replace_steps(&self, part_number: &str, steps: &[RoutingStep]) -> RepositoryResult<usize> {
        self.replace_parts(&[(part_number.to_string(), steps.to_vec())])
    }

    /// 批量替换多个料号的工艺路线 (单一事务, 全部成功或全部回滚)
    pub fn replace_parts(&self, parts: &[(String, Vec<RoutingStep>)]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let mut count = 0;
        for (part_number, steps) in parts {
            tx.execute(
                "DELETE FROM routing_step WHERE part_number = ?",
                params![part_number],
            )?;

            for step in steps {
                tx.execute(
                    r#"INSERT INTO routing_step (
                        part_number, sequence_number, process_code, process_name,
                        work_center, standard_time_minutes
                    ) VALUES (?, ?, ?, ?, ?, ?)"#,
                    params![
                        part_number,
                        step.sequence_number,
                        &step.process_code,
                        &step.process_name,
                        &step.work_center,
                        step.standard_time_minutes,
                    ],
                )?;
                count += 1;
            }
        }

        tx.commit()?;
        Ok(count)
    }
}
