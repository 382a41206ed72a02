// ==========================================
// 车间执行追踪系统 - 车间执行 API
// ==========================================
// 职责: 编排 解析 -> 校验 -> 变更 -> 提交 -> 发布事件
// 并发:
// - 每个请求独立连接 (UnitOfWork)
// - 同一流转卡/订单经实体锁串行
// - 写操作在 BEGIN IMMEDIATE 事务内完成, 行级更新为比较并交换
// 红线: 任一步失败整体回滚, 不产生部分状态
// ==========================================

use crate::api::dto::{CompletionResponse, ScanResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, RiskPolicy, TravelSheetPolicy};
use crate::domain::master_data::Operator;
use crate::domain::operation::{Operation, QuantitySubmission};
use crate::domain::production_order::ProductionOrder;
use crate::domain::risk::RiskAssessment;
use crate::domain::scan::{ScanEvent, ScanOutcome};
use crate::domain::travel_sheet::TravelSheet;
use crate::domain::types::{OrderStatus, TravelSheetStatus};
use crate::engine::entity_lock::{order_key, EntityLockRegistry};
use crate::engine::error::{EngineError, ErrorCategory};
use crate::engine::events::{OptionalEventPublisher, ShopFloorEvent, ShopFloorEventType};
use crate::engine::{
    CheckpointResolver, ExistingSheets, OperationStateMachine, OrderWorkload, ReconciliationEngine,
    RiskEngine, TravelSheetGenerator,
};
use crate::perf::{PerfGuard, TrackerOp};
use crate::repository::error::RepositoryError;
use crate::repository::UnitOfWork;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

// ==========================================
// ShopFloorApi - 车间执行 API
// ==========================================
pub struct ShopFloorApi {
    db_path: String,
    locks: Arc<EntityLockRegistry>,
    config: Arc<ConfigManager>,
    publisher: OptionalEventPublisher,
    generator: TravelSheetGenerator,
    resolver: CheckpointResolver,
    state_machine: OperationStateMachine,
    reconciliation: ReconciliationEngine,
    risk_engine: RiskEngine,
}

impl ShopFloorApi {
    /// 创建 API 实例
    ///
    /// # 参数
    /// - `db_path`: 数据库路径 (每个请求据此打开独立连接)
    /// - `locks`: 进程内共享的实体锁注册表
    /// - `config`: 配置管理器
    /// - `publisher`: 事件发布者
    pub fn new(
        db_path: impl Into<String>,
        locks: Arc<EntityLockRegistry>,
        config: Arc<ConfigManager>,
        publisher: OptionalEventPublisher,
    ) -> Self {
        Self {
            db_path: db_path.into(),
            locks,
            config,
            publisher,
            generator: TravelSheetGenerator::new(),
            resolver: CheckpointResolver::new(),
            state_machine: OperationStateMachine::new(),
            reconciliation: ReconciliationEngine::new(),
            risk_engine: RiskEngine::new(),
        }
    }

    // ==========================================
    // 流转卡生成
    // ==========================================

    /// 为订单生成流转卡 (分配订单剩余未分配数量)
    ///
    /// # 参数
    /// - `order_id`: 订单ID (须为 Created / Released)
    /// - `batch_id`: 批次号 (可选)
    ///
    /// # 返回
    /// 新生成的流转卡 (含全部工序与检查点令牌)
    pub fn generate_travel_sheet(
        &self,
        order_id: &str,
        batch_id: Option<String>,
    ) -> ApiResult<TravelSheet> {
        self.generate_split_travel_sheet(order_id, batch_id, None)
    }

    /// 为订单生成流转卡 (指定分配数量, 用于分批)
    ///
    /// # 参数
    /// - `quantity`: 分配数量, 缺省为订单剩余未分配数量
    pub fn generate_split_travel_sheet(
        &self,
        order_id: &str,
        batch_id: Option<String>,
        quantity: Option<u32>,
    ) -> ApiResult<TravelSheet> {
        let _perf = PerfGuard::new(TrackerOp::GenerateTravelSheet);
        let result = self.generate_travel_sheet_inner(order_id, batch_id, quantity);
        observe(TrackerOp::GenerateTravelSheet, result)
    }

    fn generate_travel_sheet_inner(
        &self,
        order_id: &str,
        batch_id: Option<String>,
        quantity: Option<u32>,
    ) -> ApiResult<TravelSheet> {
        let policy = self.travel_sheet_policy()?;
        let uow = self.open_uow()?;
        let _lock = self.locks.acquire(&[order_key(order_id)])?;
        let tx = uow.begin_immediate()?;

        let order = uow
            .orders
            .find_by_id(order_id)?
            .ok_or_else(|| not_found("ProductionOrder", order_id))?;
        let routing = uow.routing.find_by_part_number(&order.part_number)?;
        let existing = ExistingSheets {
            generated: uow.sheets.count_by_order(order_id)?,
            active: uow
                .sheets
                .count_by_order_and_status(order_id, TravelSheetStatus::Active)?,
            allocated: uow.sheets.sum_allocated_by_order(order_id)?,
        };

        let now = now();
        let (sheet, released) =
            self.generator
                .generate(&order, &routing, existing, &policy, batch_id, quantity, now)?;

        uow.sheets.insert(&sheet)?;
        if released != order {
            uow.orders.update_progress(&released)?;
        }
        tx.commit()?;

        info!(
            order_id = %order.order_id,
            sheet_id = %sheet.sheet_id,
            sheet_no = %sheet.sheet_no,
            allocated_quantity = sheet.allocated_quantity,
            operations = sheet.operations.len(),
            "流转卡生成完成"
        );
        self.publisher.publish(ShopFloorEvent::for_sheet(
            ShopFloorEventType::TravelSheetGenerated,
            &sheet.order_id,
            &sheet.sheet_id,
        ));

        Ok(sheet)
    }

    // ==========================================
    // 扫码
    // ==========================================

    /// 处理一次扫码 (工牌 + 检查点)
    ///
    /// # 返回
    /// - `started`: 工序已开工
    /// - `awaiting_completion`: 同一操作员再次扫码, 等待报工数量
    pub fn process_scan(&self, badge_token: &str, checkpoint_token: &str) -> ApiResult<ScanResponse> {
        let _perf = PerfGuard::new(TrackerOp::ProcessScan);
        let event = ScanEvent::new(badge_token, checkpoint_token, now());
        let result = self.process_scan_inner(&event);
        observe(TrackerOp::ProcessScan, result)
    }

    fn process_scan_inner(&self, event: &ScanEvent) -> ApiResult<ScanResponse> {
        let uow = self.open_uow()?;
        let keys = self
            .resolver
            .lock_keys_for_checkpoint(&uow, &event.checkpoint_token)?;
        let _lock = self.locks.acquire(&keys)?;
        let tx = uow.begin_immediate()?;

        let snapshot = self.resolver.resolve(&uow, event)?;
        let outcome = self.state_machine.evaluate_scan(&snapshot)?;

        if outcome == ScanOutcome::Started {
            let operator_id = &snapshot.operator.operator_id;
            if let Err(e) =
                uow.operations
                    .mark_started(&snapshot.operation, operator_id, event.scanned_at)
            {
                return Err(self.lost_race(&uow, &snapshot.operation, &snapshot.operator, e));
            }
            if let Some(order) = self
                .state_machine
                .order_after_start(&snapshot.order, event.scanned_at)
            {
                uow.orders.update_progress(&order)?;
            }
            tx.commit()?;

            let started =
                self.state_machine
                    .started(&snapshot.operation, &snapshot.operator, event.scanned_at);
            info!(
                operation_id = %started.operation_id,
                sequence_number = started.sequence_number,
                operator_id = %operator_id,
                revision = started.revision,
                "工序开工"
            );
            self.publisher.publish(ShopFloorEvent::for_operation(
                ShopFloorEventType::OperationStarted,
                &snapshot.order.order_id,
                &snapshot.sheet.sheet_id,
                &snapshot.operation.operation_id,
                operator_id,
            ));
        } else {
            tx.rollback()?;
        }

        Ok(ScanResponse {
            status: outcome,
            operation_id: snapshot.operation.operation_id.clone(),
            process_name: snapshot.operation.process_name.clone(),
            sheet_id: snapshot.sheet.sheet_id.clone(),
            sequence_number: snapshot.operation.sequence_number,
        })
    }

    // ==========================================
    // 报工
    // ==========================================

    /// 工序报工 (数量核算 + 订单汇总)
    ///
    /// # 参数
    /// - `operation_id`: 工序ID
    /// - `badge_token`: 报工操作员工牌 (须与开工操作员一致)
    /// - `submission`: 合格/报废/待处理数量 (缺省视为 0)
    /// - `notes`: 备注
    pub fn complete_operation(
        &self,
        operation_id: &str,
        badge_token: &str,
        submission: QuantitySubmission,
        notes: Option<String>,
    ) -> ApiResult<CompletionResponse> {
        let _perf = PerfGuard::new(TrackerOp::CompleteOperation);
        let result = self.complete_operation_inner(operation_id, badge_token, &submission, notes);
        observe(TrackerOp::CompleteOperation, result)
    }

    fn complete_operation_inner(
        &self,
        operation_id: &str,
        badge_token: &str,
        submission: &QuantitySubmission,
        notes: Option<String>,
    ) -> ApiResult<CompletionResponse> {
        let operation_id = operation_id.trim();
        if operation_id.is_empty() {
            return Err(EngineError::InvalidInput("工序ID为空".to_string()).into());
        }

        let uow = self.open_uow()?;
        let keys = self.resolver.lock_keys_for_operation(&uow, operation_id)?;
        let _lock = self.locks.acquire(&keys)?;
        let tx = uow.begin_immediate()?;

        let operator = self.resolver.resolve_operator(&uow, badge_token)?;
        let (operation, sheet, order) = self.resolver.resolve_operation(&uow, operation_id)?;
        self.state_machine.check_completion(&operation, &operator)?;

        let now = now();
        let plan = self
            .reconciliation
            .reconcile(&sheet, &operation, &order, submission, now)?;

        let notes = notes.as_deref().map(str::trim).filter(|n| !n.is_empty());
        if let Err(e) = uow.operations.mark_completed(
            &operation,
            &operator.operator_id,
            &plan.quantities,
            now,
            notes,
        ) {
            return Err(self.lost_race(&uow, &operation, &operator, e));
        }

        for downstream in &plan.closed_downstream {
            uow.operations.close_without_intake(downstream, now)?;
        }

        if plan.order_changed {
            uow.orders.update_progress(&plan.order)?;
        }

        let sheet_status = if plan.sheet_completed {
            uow.sheets
                .update_status(&sheet, TravelSheetStatus::Completed, Some(now))?;
            TravelSheetStatus::Completed
        } else {
            sheet.status
        };

        tx.commit()?;

        info!(
            operation_id = %operation.operation_id,
            operator_id = %operator.operator_id,
            good = plan.quantities.good,
            scrap = plan.quantities.scrap,
            pending = plan.quantities.pending,
            intake = plan.intake,
            closed_downstream = plan.closed_downstream.len(),
            order_status = %plan.order.status,
            "工序报工完成"
        );

        self.publisher.publish(
            ShopFloorEvent::for_operation(
                ShopFloorEventType::OperationCompleted,
                &order.order_id,
                &sheet.sheet_id,
                &operation.operation_id,
                &operator.operator_id,
            )
            .with_detail(plan.reason.clone()),
        );
        if plan.sheet_completed {
            self.publisher.publish(ShopFloorEvent::for_sheet(
                ShopFloorEventType::TravelSheetCompleted,
                &order.order_id,
                &sheet.sheet_id,
            ));
        }
        if plan.order.status == OrderStatus::Completed && order.status != OrderStatus::Completed {
            self.publisher.publish(ShopFloorEvent::for_sheet(
                ShopFloorEventType::OrderCompleted,
                &order.order_id,
                &sheet.sheet_id,
            ));
        }

        Ok(CompletionResponse {
            success: true,
            operation_id: operation.operation_id,
            order_id: order.order_id,
            sheet_id: sheet.sheet_id,
            updated_order_status: plan.order.status,
            sheet_status,
            quantity_completed: plan.order.quantity_completed,
            quantity_scrapped: plan.order.quantity_scrapped,
        })
    }

    // ==========================================
    // 流转卡维护 / 查询
    // ==========================================

    /// 作废流转卡 (仅限尚无工序开工的流转卡)
    ///
    /// 订单已无其他有效流转卡时, 订单退回 Created
    pub fn cancel_travel_sheet(&self, sheet_id: &str) -> ApiResult<TravelSheet> {
        let _perf = PerfGuard::new(TrackerOp::CancelTravelSheet);
        let result = self.cancel_travel_sheet_inner(sheet_id);
        observe(TrackerOp::CancelTravelSheet, result)
    }

    fn cancel_travel_sheet_inner(&self, sheet_id: &str) -> ApiResult<TravelSheet> {
        let uow = self.open_uow()?;
        let keys = self.resolver.lock_keys_for_sheet(&uow, sheet_id)?;
        let _lock = self.locks.acquire(&keys)?;
        let tx = uow.begin_immediate()?;

        let mut sheet = uow
            .sheets
            .find_by_id(sheet_id)?
            .ok_or_else(|| not_found("TravelSheet", sheet_id))?;

        if !sheet.is_active() {
            return Err(EngineError::SheetNotActive {
                sheet_id: sheet.sheet_id.clone(),
                status: sheet.status,
            }
            .into());
        }
        if sheet.has_started_operations() {
            return Err(ApiError::BusinessRuleViolation(format!(
                "流转卡 {} 已有工序开工，不能作废",
                sheet.sheet_no
            )));
        }

        let now = now();
        sheet.revision = uow
            .sheets
            .update_status(&sheet, TravelSheetStatus::Cancelled, Some(now))?;
        sheet.status = TravelSheetStatus::Cancelled;
        sheet.closed_at = Some(now);

        if uow.sheets.count_referencing_order(&sheet.order_id)? == 0 {
            if let Some(mut order) = uow.orders.find_by_id(&sheet.order_id)? {
                if order.status == OrderStatus::Released {
                    order.status = OrderStatus::Created;
                    order.updated_at = now;
                    uow.orders.update_progress(&order)?;
                }
            }
        }

        tx.commit()?;

        info!(sheet_id = %sheet.sheet_id, sheet_no = %sheet.sheet_no, "流转卡已作废");
        self.publisher.publish(ShopFloorEvent::for_sheet(
            ShopFloorEventType::TravelSheetCancelled,
            &sheet.order_id,
            &sheet.sheet_id,
        ));

        Ok(sheet)
    }

    /// 查询流转卡 (含工序及其检查点令牌)
    pub fn get_travel_sheet(&self, sheet_id: &str) -> ApiResult<TravelSheet> {
        let _perf = PerfGuard::new(TrackerOp::GetTravelSheet);
        let uow = self.open_uow()?;
        uow.sheets
            .find_by_id(sheet_id)?
            .ok_or_else(|| not_found("TravelSheet", sheet_id))
    }

    /// 查询订单下全部流转卡
    pub fn list_travel_sheets(&self, order_id: &str) -> ApiResult<Vec<TravelSheet>> {
        let _perf = PerfGuard::new(TrackerOp::ListTravelSheets);
        let uow = self.open_uow()?;
        if uow.orders.find_by_id(order_id)?.is_none() {
            return Err(not_found("ProductionOrder", order_id));
        }
        Ok(uow.sheets.find_by_order(order_id)?)
    }

    // ==========================================
    // 交期风险
    // ==========================================

    /// 评估订单交期风险 (按当天日期)
    pub fn assess_order_risk(&self, order_id: &str) -> ApiResult<RiskAssessment> {
        self.assess_order_risk_on(order_id, today())
    }

    /// 评估订单交期风险 (指定评估日期)
    pub fn assess_order_risk_on(&self, order_id: &str, today: NaiveDate) -> ApiResult<RiskAssessment> {
        let _perf = PerfGuard::new(TrackerOp::AssessOrderRisk);
        let policy = self.risk_policy()?;
        let uow = self.open_uow()?;

        let order = uow
            .orders
            .find_by_id(order_id)?
            .ok_or_else(|| not_found("ProductionOrder", order_id))?;
        let workload = self.workload(&uow, order)?;

        Ok(self.risk_engine.assess(&workload, &policy, today))
    }

    /// 未结订单风险看板 (RED 优先)
    pub fn risk_board(&self) -> ApiResult<Vec<RiskAssessment>> {
        self.risk_board_on(today())
    }

    /// 未结订单风险看板 (指定评估日期)
    pub fn risk_board_on(&self, today: NaiveDate) -> ApiResult<Vec<RiskAssessment>> {
        let _perf = PerfGuard::new(TrackerOp::RiskBoard);
        let policy = self.risk_policy()?;
        let uow = self.open_uow()?;

        let mut workloads = Vec::new();
        for order in uow.orders.list_open()? {
            workloads.push(self.workload(&uow, order)?);
        }

        let board = self.risk_engine.assess_board(&workloads, &policy, today);
        info!(
            orders = board.len(),
            attention = board.iter().filter(|a| a.needs_attention()).count(),
            "风险看板已生成"
        );
        Ok(board)
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    fn open_uow(&self) -> ApiResult<UnitOfWork> {
        Ok(UnitOfWork::open(&self.db_path)?)
    }

    fn travel_sheet_policy(&self) -> ApiResult<TravelSheetPolicy> {
        self.config
            .get_travel_sheet_policy()
            .map_err(|e| ApiError::InternalError(format!("读取流转卡策略失败: {}", e)))
    }

    fn risk_policy(&self) -> ApiResult<RiskPolicy> {
        self.config
            .get_risk_policy()
            .map_err(|e| ApiError::InternalError(format!("读取风险阈值失败: {}", e)))
    }

    /// 风险评估输入: 订单 + 未作废流转卡 + 料号工艺路线
    fn workload(&self, uow: &UnitOfWork, order: ProductionOrder) -> ApiResult<OrderWorkload> {
        let sheets = uow
            .sheets
            .find_by_order(&order.order_id)?
            .into_iter()
            .filter(|s| s.status != TravelSheetStatus::Cancelled)
            .collect();
        let routing = uow.routing.find_by_part_number(&order.part_number)?;
        Ok(OrderWorkload {
            order,
            sheets,
            routing,
        })
    }

    /// 比较并交换失败: 重读工序并给出确定的拒绝原因
    fn lost_race(
        &self,
        uow: &UnitOfWork,
        operation: &Operation,
        operator: &Operator,
        err: RepositoryError,
    ) -> ApiError {
        if !matches!(err, RepositoryError::OptimisticLockFailure { .. }) {
            return err.into();
        }
        match uow.operations.find_by_id(&operation.operation_id) {
            Ok(Some(current)) => self.state_machine.classify_conflict(&current, operator).into(),
            Ok(None) => not_found("Operation", &operation.operation_id),
            Err(e) => e.into(),
        }
    }
}

/// 记录失败请求: 守卫/输入 -> warn, 一致性/基础设施 -> error
fn observe<T>(op: TrackerOp, result: ApiResult<T>) -> ApiResult<T> {
    if let Err(e) = &result {
        let op = op.as_str();
        match e.category() {
            ErrorCategory::Input | ErrorCategory::Guard => {
                warn!(op, code = e.error_code(), category = %e.category(), "请求被拒绝: {}", e)
            }
            ErrorCategory::Consistency | ErrorCategory::Infrastructure => {
                error!(op, code = e.error_code(), category = %e.category(), "请求失败: {}", e)
            }
        }
    }
    result
}

fn not_found(entity: &str, id: &str) -> ApiError {
    EngineError::NotFound {
        entity: entity.to_string(),
        id: id.to_string(),
    }
    .into()
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}
