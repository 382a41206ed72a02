// ==========================================
// 车间执行追踪系统 - 主数据 API
// ==========================================
// 职责: 订单 / 操作员 / 工艺路线目录的维护
// 红线:
// - 存在未作废流转卡的订单不可删除
// - 已有工序开工的订单不可取消
// - 工艺路线整体替换, 校验失败不落库
// ==========================================

use crate::api::dto::{NewOperatorRequest, NewOrderRequest, RoutingStepInput};
use crate::api::error::{ApiError, ApiResult};
use crate::domain::master_data::Operator;
use crate::domain::production_order::ProductionOrder;
use crate::domain::types::{OrderStatus, TravelSheetStatus};
use crate::engine::entity_lock::{order_key, sheet_key, EntityLockRegistry};
use crate::engine::error::EngineError;
use crate::engine::events::{OptionalEventPublisher, ShopFloorEvent, ShopFloorEventType};
use crate::engine::token::new_entity_id;
use crate::engine::TravelSheetGenerator;
use crate::importer::{RoutingImportReport, RoutingImporter, RoutingSource};
use crate::perf::{PerfGuard, TrackerOp};
use crate::repository::UnitOfWork;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

// ==========================================
// MasterDataApi - 主数据 API
// ==========================================
pub struct MasterDataApi {
    db_path: String,
    locks: Arc<EntityLockRegistry>,
    publisher: OptionalEventPublisher,
    generator: TravelSheetGenerator,
}

impl MasterDataApi {
    pub fn new(
        db_path: impl Into<String>,
        locks: Arc<EntityLockRegistry>,
        publisher: OptionalEventPublisher,
    ) -> Self {
        Self {
            db_path: db_path.into(),
            locks,
            publisher,
            generator: TravelSheetGenerator::new(),
        }
    }

    // ==========================================
    // 订单
    // ==========================================

    /// 录入订单 (状态 Created)
    pub fn register_order(&self, request: NewOrderRequest) -> ApiResult<ProductionOrder> {
        let _perf = PerfGuard::new(TrackerOp::RegisterOrder);

        let order_no = request.order_no.trim();
        let part_number = request.part_number.trim();
        if order_no.is_empty() || part_number.is_empty() {
            return Err(EngineError::InvalidInput("订单号和料号不能为空".to_string()).into());
        }

        let uow = self.open_uow()?;
        if uow.orders.find_by_order_no(order_no)?.is_some() {
            return Err(ApiError::BusinessRuleViolation(format!(
                "订单号已存在: {}",
                order_no
            )));
        }

        let now = Utc::now().naive_utc();
        let order = ProductionOrder {
            order_id: new_entity_id(),
            order_no: order_no.to_string(),
            part_number: part_number.to_string(),
            quantity: request.quantity,
            quantity_completed: 0,
            quantity_scrapped: 0,
            status: OrderStatus::Created,
            due_date: request.due_date,
            priority: request.priority,
            created_at: now,
            updated_at: now,
            revision: 0,
        };
        uow.orders.create(&order)?;

        info!(order_id = %order.order_id, order_no = %order.order_no, quantity = order.quantity, "订单已录入");
        Ok(order)
    }

    /// 查询订单
    pub fn get_order(&self, order_id: &str) -> ApiResult<ProductionOrder> {
        let uow = self.open_uow()?;
        uow.orders.find_by_id(order_id)?.ok_or_else(|| {
            EngineError::NotFound {
                entity: "ProductionOrder".to_string(),
                id: order_id.to_string(),
            }
            .into()
        })
    }

    /// 未结订单 (Created / Released / InProgress)
    pub fn list_open_orders(&self) -> ApiResult<Vec<ProductionOrder>> {
        let uow = self.open_uow()?;
        Ok(uow.orders.list_open()?)
    }

    /// 取消订单
    ///
    /// 规则: 有效流转卡一并作废; 任一工序已开工则拒绝
    pub fn cancel_order(&self, order_id: &str) -> ApiResult<ProductionOrder> {
        let _perf = PerfGuard::new(TrackerOp::CancelOrder);
        let uow = self.open_uow()?;

        let sheets = uow.sheets.find_by_order(order_id)?;
        let mut keys: Vec<String> = sheets.iter().map(|s| sheet_key(&s.sheet_id)).collect();
        keys.push(order_key(order_id));
        let _lock = self.locks.acquire(&keys)?;
        let tx = uow.begin_immediate()?;

        let mut order = uow.orders.find_by_id(order_id)?.ok_or_else(|| EngineError::NotFound {
            entity: "ProductionOrder".to_string(),
            id: order_id.to_string(),
        })?;
        if order.is_terminal() {
            return Err(EngineError::InvalidOrderState {
                order_id: order.order_id.clone(),
                status: order.status,
            }
            .into());
        }

        let active: Vec<_> = uow
            .sheets
            .find_by_order(order_id)?
            .into_iter()
            .filter(|s| s.is_active())
            .collect();
        if let Some(started) = active.iter().find(|s| s.has_started_operations()) {
            return Err(ApiError::BusinessRuleViolation(format!(
                "流转卡 {} 已有工序开工，订单不能取消",
                started.sheet_no
            )));
        }

        let now = Utc::now().naive_utc();
        for sheet in &active {
            uow.sheets
                .update_status(sheet, TravelSheetStatus::Cancelled, Some(now))?;
        }

        order.status = OrderStatus::Cancelled;
        order.updated_at = now;
        order.revision = uow.orders.update_progress(&order)?;
        tx.commit()?;

        info!(order_id = %order.order_id, cancelled_sheets = active.len(), "订单已取消");
        for sheet in &active {
            self.publisher.publish(ShopFloorEvent::for_sheet(
                ShopFloorEventType::TravelSheetCancelled,
                &order.order_id,
                &sheet.sheet_id,
            ));
        }

        Ok(order)
    }

    /// 删除订单
    ///
    /// 规则: 存在任何未作废流转卡时禁止删除; 已作废流转卡随订单删除
    pub fn delete_order(&self, order_id: &str) -> ApiResult<()> {
        let _perf = PerfGuard::new(TrackerOp::DeleteOrder);
        let uow = self.open_uow()?;
        let _lock = self.locks.acquire(&[order_key(order_id)])?;
        let tx = uow.begin_immediate()?;

        if uow.orders.find_by_id(order_id)?.is_none() {
            return Err(EngineError::NotFound {
                entity: "ProductionOrder".to_string(),
                id: order_id.to_string(),
            }
            .into());
        }

        let referencing = uow.sheets.count_referencing_order(order_id)?;
        if referencing > 0 {
            return Err(ApiError::BusinessRuleViolation(format!(
                "订单仍被 {} 张流转卡引用，不能删除",
                referencing
            )));
        }

        let purged = uow.sheets.delete_cancelled_by_order(order_id)?;
        uow.orders.delete(order_id)?;
        tx.commit()?;

        info!(order_id = %order_id, purged_sheets = purged, "订单已删除");
        Ok(())
    }

    // ==========================================
    // 操作员
    // ==========================================

    /// 登记操作员 (工牌令牌唯一)
    pub fn register_operator(&self, request: NewOperatorRequest) -> ApiResult<Operator> {
        let badge_token = request.badge_token.trim();
        let display_name = request.display_name.trim();
        if badge_token.is_empty() || display_name.is_empty() {
            return Err(EngineError::InvalidInput("工牌令牌和姓名不能为空".to_string()).into());
        }

        let uow = self.open_uow()?;
        if uow.operators.find_by_badge_token(badge_token)?.is_some() {
            return Err(ApiError::BusinessRuleViolation(
                "工牌令牌已被占用".to_string(),
            ));
        }

        let operator = Operator {
            operator_id: request
                .operator_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .unwrap_or_else(new_entity_id),
            badge_token: badge_token.to_string(),
            display_name: display_name.to_string(),
            active: true,
        };
        uow.operators.create(&operator)?;

        info!(operator_id = %operator.operator_id, "操作员已登记");
        Ok(operator)
    }

    /// 停用操作员 (停用后工牌扫码视为未知操作员)
    pub fn deactivate_operator(&self, operator_id: &str) -> ApiResult<Operator> {
        let uow = self.open_uow()?;
        uow.operators.set_active(operator_id, false)?;
        let operator = uow.operators.find_by_id(operator_id)?.ok_or_else(|| EngineError::NotFound {
            entity: "Operator".to_string(),
            id: operator_id.to_string(),
        })?;

        info!(operator_id = %operator_id, "操作员已停用");
        Ok(operator)
    }

    // ==========================================
    // 工艺路线
    // ==========================================

    /// 整体替换某料号的工艺路线
    ///
    /// # 返回
    /// 写入的工步数
    pub fn replace_routing(&self, part_number: &str, steps: Vec<RoutingStepInput>) -> ApiResult<usize> {
        let _perf = PerfGuard::new(TrackerOp::ReplaceRouting);
        let part_number = part_number.trim();

        let mut steps: Vec<_> = steps.into_iter().map(|s| s.into_step(part_number)).collect();
        self.generator.validate_routing(part_number, &steps)?;
        steps.sort_by_key(|s| s.sequence_number);

        let uow = self.open_uow()?;
        let written = uow.routing.replace_steps(part_number, &steps)?;

        info!(part_number = %part_number, steps = written, "工艺路线已替换");
        Ok(written)
    }

    /// 从数据源批量导入工艺路线
    pub async fn import_routing(&self, source: &dyn RoutingSource) -> ApiResult<RoutingImportReport> {
        let importer = RoutingImporter::new(self.db_path.clone());
        Ok(importer.import(source).await?)
    }

    fn open_uow(&self) -> ApiResult<UnitOfWork> {
        Ok(UnitOfWork::open(&self.db_path)?)
    }
}
