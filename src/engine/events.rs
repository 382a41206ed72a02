// ==========================================
// 车间执行追踪系统 - 引擎层事件发布
// ==========================================
// 职责: 定义车间执行事件发布 trait，实现依赖倒置
// 说明: 事件在事务提交后发布; 发布失败只记录日志, 不影响已提交的业务结果
// ==========================================

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 车间执行事件类型
// ==========================================

/// 车间执行事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShopFloorEventType {
    /// 流转卡已生成
    TravelSheetGenerated,
    /// 流转卡已作废
    TravelSheetCancelled,
    /// 流转卡全部完工
    TravelSheetCompleted,
    /// 工序已开工
    OperationStarted,
    /// 工序已完工
    OperationCompleted,
    /// 订单已完工
    OrderCompleted,
}

impl ShopFloorEventType {
    /// 转换为字符串标识
    pub fn as_str(&self) -> &str {
        match self {
            ShopFloorEventType::TravelSheetGenerated => "TravelSheetGenerated",
            ShopFloorEventType::TravelSheetCancelled => "TravelSheetCancelled",
            ShopFloorEventType::TravelSheetCompleted => "TravelSheetCompleted",
            ShopFloorEventType::OperationStarted => "OperationStarted",
            ShopFloorEventType::OperationCompleted => "OperationCompleted",
            ShopFloorEventType::OrderCompleted => "OrderCompleted",
        }
    }
}

/// 车间执行事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopFloorEvent {
    /// 事件类型
    pub event_type: ShopFloorEventType,
    /// 生产订单 ID
    pub order_id: String,
    /// 流转卡 ID
    pub sheet_id: Option<String>,
    /// 工序 ID
    pub operation_id: Option<String>,
    /// 操作员 ID
    pub operator_id: Option<String>,
    /// 附加说明 (JSON)
    pub detail: Option<String>,
}

impl ShopFloorEvent {
    /// 流转卡级事件
    pub fn for_sheet(event_type: ShopFloorEventType, order_id: &str, sheet_id: &str) -> Self {
        Self {
            event_type,
            order_id: order_id.to_string(),
            sheet_id: Some(sheet_id.to_string()),
            operation_id: None,
            operator_id: None,
            detail: None,
        }
    }

    /// 工序级事件
    pub fn for_operation(
        event_type: ShopFloorEventType,
        order_id: &str,
        sheet_id: &str,
        operation_id: &str,
        operator_id: &str,
    ) -> Self {
        Self {
            event_type,
            order_id: order_id.to_string(),
            sheet_id: Some(sheet_id.to_string()),
            operation_id: Some(operation_id.to_string()),
            operator_id: Some(operator_id.to_string()),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: String) -> Self {
        self.detail = Some(detail);
        self
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 车间执行事件发布者 Trait
///
/// 下游 (看板刷新 / MES 对接) 实现此 trait
pub trait ShopFloorEventPublisher: Send + Sync {
    /// 发布事件
    ///
    /// # 返回
    /// - `Ok(id)`: 下游生成的任务/消息 ID（如果支持）或空字符串
    /// - `Err`: 发布失败
    fn publish(&self, event: ShopFloorEvent) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
///
/// 用于不需要事件发布的场景（如单元测试）
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl ShopFloorEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: ShopFloorEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpEventPublisher: 跳过事件发布 - order_id={}, event_type={}",
            event.order_id,
            event.event_type.as_str()
        );
        Ok(String::new())
    }
}

/// 日志事件发布者: 以结构化日志输出事件 (target = shop_floor_event)
#[derive(Debug, Clone, Default)]
pub struct TracingEventPublisher;

impl ShopFloorEventPublisher for TracingEventPublisher {
    fn publish(&self, event: ShopFloorEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        tracing::info!(
            target: "shop_floor_event",
            event_type = event.event_type.as_str(),
            order_id = %event.order_id,
            sheet_id = ?event.sheet_id,
            operation_id = ?event.operation_id,
            operator_id = ?event.operator_id,
            detail = ?event.detail,
            "车间执行事件"
        );
        Ok(String::new())
    }
}

/// 可选的事件发布者包装
///
/// 简化 Option<Arc<dyn ShopFloorEventPublisher>> 的使用
#[derive(Clone)]
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn ShopFloorEventPublisher>>,
}

impl OptionalEventPublisher {
    /// 创建带发布者的实例
    pub fn with_publisher(publisher: Arc<dyn ShopFloorEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    /// 创建空实例（不发布事件）
    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发布事件; 失败只告警
    pub fn publish(&self, event: ShopFloorEvent) {
        let Some(publisher) = &self.inner else {
            return;
        };
        let event_type = event.event_type;
        if let Err(e) = publisher.publish(event) {
            tracing::warn!(event_type = event_type.as_str(), "事件发布失败: {}", e);
        }
    }

    /// 检查是否配置了发布者
    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}
