// ==========================================
// 车间执行追踪系统 - API 数据传输对象
// ==========================================
// 职责: 对外请求/响应的封闭标签联合 (serde tag = "action" / "kind")
// 说明: 进入核心前完成反序列化校验, 核心只接收强类型请求
// ==========================================

use crate::domain::master_data::{Operator, RoutingStep};
use crate::domain::operation::QuantityField;
use crate::domain::production_order::ProductionOrder;
use crate::domain::risk::RiskAssessment;
use crate::domain::scan::ScanOutcome;
use crate::domain::travel_sheet::TravelSheet;
use crate::domain::types::{OrderPriority, OrderStatus, TravelSheetStatus};
use crate::engine::error::ErrorCategory;
use crate::i18n::t_with_args_in;
use crate::importer::RoutingImportReport;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ==========================================
// 扫码 / 报工响应
// ==========================================

/// 扫码响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResponse {
    pub status: ScanOutcome,
    pub operation_id: String,
    pub process_name: String,
    pub sheet_id: String,
    pub sequence_number: u32,
}

impl ScanResponse {
    /// 工位屏提示语
    pub fn operator_message(&self, locale: &str) -> String {
        let key = match self.status {
            ScanOutcome::Started => "scan.started",
            ScanOutcome::AwaitingCompletion => "scan.awaiting_completion",
        };
        t_with_args_in(locale, key, &[("process", &self.process_name)])
    }
}

/// 报工响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub success: bool,
    pub operation_id: String,
    pub order_id: String,
    pub sheet_id: String,
    pub updated_order_status: OrderStatus,
    pub sheet_status: TravelSheetStatus,
    pub quantity_completed: u32,
    pub quantity_scrapped: u32,
}

impl CompletionResponse {
    pub fn operator_message(&self, locale: &str) -> String {
        t_with_args_in(locale, "completion.accepted", &[("operation", &self.operation_id)])
    }
}

// ==========================================
// 主数据请求
// ==========================================

/// 新订单
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrderRequest {
    pub order_no: String,
    pub part_number: String,
    pub quantity: u32,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: OrderPriority,
}

/// 新操作员
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOperatorRequest {
    #[serde(default)]
    pub operator_id: Option<String>,
    pub badge_token: String,
    pub display_name: String,
}

/// 工艺路线工步 (料号由请求给出)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingStepInput {
    pub sequence_number: u32,
    pub process_code: String,
    #[serde(default)]
    pub process_name: Option<String>,
    #[serde(default)]
    pub work_center: Option<String>,
    #[serde(default)]
    pub standard_time_minutes: f64,
}

impl RoutingStepInput {
    pub fn into_step(self, part_number: &str) -> RoutingStep {
        RoutingStep {
            part_number: part_number.to_string(),
            sequence_number: self.sequence_number,
            process_name: self
                .process_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| self.process_code.clone()),
            process_code: self.process_code,
            work_center: self.work_center,
            standard_time_minutes: self.standard_time_minutes,
        }
    }
}

// ==========================================
// TrackerRequest - 请求联合
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TrackerRequest {
    // ----- 执行流程 -----
    GenerateTravelSheet {
        order_id: String,
        #[serde(default)]
        batch_id: Option<String>,
        #[serde(default)]
        quantity: Option<u32>,
    },
    ProcessScan {
        badge_token: String,
        checkpoint_token: String,
    },
    CompleteOperation {
        operation_id: String,
        badge_token: String,
        #[serde(default)]
        quantity_good: QuantityField,
        #[serde(default)]
        quantity_scrap: QuantityField,
        #[serde(default)]
        quantity_pending: QuantityField,
        #[serde(default)]
        notes: Option<String>,
    },
    CancelTravelSheet {
        sheet_id: String,
    },

    // ----- 查询 -----
    GetTravelSheet {
        sheet_id: String,
    },
    ListTravelSheets {
        order_id: String,
    },
    AssessOrderRisk {
        order_id: String,
    },
    RiskBoard,

    // ----- 主数据 -----
    RegisterOrder(NewOrderRequest),
    CancelOrder {
        order_id: String,
    },
    DeleteOrder {
        order_id: String,
    },
    RegisterOperator(NewOperatorRequest),
    DeactivateOperator {
        operator_id: String,
    },
    ReplaceRouting {
        part_number: String,
        steps: Vec<RoutingStepInput>,
    },
    ImportRoutingCsv {
        path: String,
    },
    ImportRoutingJson {
        records: serde_json::Value,
    },
}

impl TrackerRequest {
    /// 动作名 (日志用)
    pub fn action(&self) -> &'static str {
        match self {
            TrackerRequest::GenerateTravelSheet { .. } => "generate_travel_sheet",
            TrackerRequest::ProcessScan { .. } => "process_scan",
            TrackerRequest::CompleteOperation { .. } => "complete_operation",
            TrackerRequest::CancelTravelSheet { .. } => "cancel_travel_sheet",
            TrackerRequest::GetTravelSheet { .. } => "get_travel_sheet",
            TrackerRequest::ListTravelSheets { .. } => "list_travel_sheets",
            TrackerRequest::AssessOrderRisk { .. } => "assess_order_risk",
            TrackerRequest::RiskBoard => "risk_board",
            TrackerRequest::RegisterOrder(_) => "register_order",
            TrackerRequest::CancelOrder { .. } => "cancel_order",
            TrackerRequest::DeleteOrder { .. } => "delete_order",
            TrackerRequest::RegisterOperator(_) => "register_operator",
            TrackerRequest::DeactivateOperator { .. } => "deactivate_operator",
            TrackerRequest::ReplaceRouting { .. } => "replace_routing",
            TrackerRequest::ImportRoutingCsv { .. } => "import_routing_csv",
            TrackerRequest::ImportRoutingJson { .. } => "import_routing_json",
        }
    }
}

/// 请求信封 (JSON lines 每行一个)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(flatten)]
    pub request: TrackerRequest,
}

// ==========================================
// TrackerResponse - 响应联合
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackerResponse {
    TravelSheet {
        sheet: TravelSheet,
    },
    TravelSheets {
        sheets: Vec<TravelSheet>,
    },
    Scan {
        #[serde(flatten)]
        scan: ScanResponse,
        message: String,
    },
    Completion {
        #[serde(flatten)]
        completion: CompletionResponse,
        message: String,
    },
    Risk {
        assessment: RiskAssessment,
    },
    RiskBoard {
        assessments: Vec<RiskAssessment>,
    },
    Order {
        order: ProductionOrder,
    },
    Operator {
        operator: Operator,
    },
    Routing {
        part_number: String,
        steps_imported: usize,
    },
    RoutingImport {
        report: RoutingImportReport,
    },
    Ack {
        message: String,
    },
    Error(ErrorResponse),
}

/// 错误响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub category: ErrorCategory,
    /// 面向操作员的提示语 (已本地化)
    pub message: String,
    /// 技术细节
    pub detail: String,
}

/// 响应信封
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub request_id: Option<String>,
    pub ok: bool,
    #[serde(flatten)]
    pub response: TrackerResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_operation_defaults_quantities_to_unset() {
        let envelope: RequestEnvelope = serde_json::from_str(
            r#"{"request_id": "r1", "action": "complete_operation",
                "operation_id": "OP-1", "badge_token": "B-1", "quantity_good": 5}"#,
        )
        .unwrap();
        assert_eq!(envelope.request_id.as_deref(), Some("r1"));
        match envelope.request {
            TrackerRequest::CompleteOperation {
                quantity_good,
                quantity_scrap,
                quantity_pending,
                ..
            } => {
                assert_eq!(quantity_good, QuantityField::Value(5));
                assert_eq!(quantity_scrap, QuantityField::Unset);
                assert_eq!(quantity_pending, QuantityField::Unset);
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let result: Result<TrackerRequest, _> =
            serde_json::from_str(r#"{"action": "drop_tables"}"#);
        assert!(result.is_err());

        let result: Result<TrackerRequest, _> =
            serde_json::from_str(r#"{"action": "process_scan", "badge_token": "B"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_register_order_payload() {
        let request: TrackerRequest = serde_json::from_str(
            r#"{"action": "register_order", "order_no": "MO-1", "part_number": "P-1",
                "quantity": 50, "due_date": "2026-05-01", "priority": "URGENT"}"#,
        )
        .unwrap();
        assert_eq!(request.action(), "register_order");
        match request {
            TrackerRequest::RegisterOrder(new_order) => {
                assert_eq!(new_order.priority, OrderPriority::Urgent);
                assert_eq!(new_order.due_date, NaiveDate::from_ymd_opt(2026, 5, 1));
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_scan_response_is_flattened_on_the_wire() {
        let envelope = ResponseEnvelope {
            request_id: None,
            ok: true,
            response: TrackerResponse::Scan {
                scan: ScanResponse {
                    status: ScanOutcome::Started,
                    operation_id: "OP-1".to_string(),
                    process_name: "CUT".to_string(),
                    sheet_id: "S-1".to_string(),
                    sequence_number: 10,
                },
                message: "ok".to_string(),
            },
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["kind"], "scan");
        assert_eq!(value["status"], "started");
        assert_eq!(value["sequence_number"], 10);
    }
}
