// ==========================================
// 车间执行追踪系统 - 请求分发
// ==========================================
// 职责: JSON 请求 -> 强类型请求 -> API 调用 -> 响应信封
// 说明:
// - 同步 API 调用放入 spawn_blocking, 不阻塞运行时
// - 一批请求并发处理, 响应顺序与请求顺序一致
// - 错误统一转为 kind = "error" 的响应, 不中断服务
// ==========================================

use crate::api::dto::{
    ErrorResponse, RequestEnvelope, ResponseEnvelope, TrackerRequest, TrackerResponse,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::master_data_api::MasterDataApi;
use crate::api::shop_floor_api::ShopFloorApi;
use crate::domain::operation::QuantitySubmission;
use crate::engine::error::ErrorCategory;
use crate::i18n::t_with_args_in;
use crate::importer::{CsvRoutingSource, JsonRecordSource};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info_span, Instrument};

/// 默认终端语言
pub const DEFAULT_LOCALE: &str = "zh-CN";

// ==========================================
// TrackerService - 请求分发服务
// ==========================================
#[derive(Clone)]
pub struct TrackerService {
    shop_floor: Arc<ShopFloorApi>,
    master_data: Arc<MasterDataApi>,
}

impl TrackerService {
    pub fn new(shop_floor: Arc<ShopFloorApi>, master_data: Arc<MasterDataApi>) -> Self {
        Self {
            shop_floor,
            master_data,
        }
    }

    /// 处理一行 JSON 请求 (解析失败同样返回错误响应)
    pub async fn handle_line(&self, line: &str) -> ResponseEnvelope {
        match serde_json::from_str::<RequestEnvelope>(line) {
            Ok(envelope) => self.handle(envelope).await,
            Err(e) => ResponseEnvelope {
                request_id: extract_request_id(line),
                ok: false,
                response: TrackerResponse::Error(ErrorResponse {
                    code: "INVALID_REQUEST".to_string(),
                    category: ErrorCategory::Input,
                    message: t_with_args_in(
                        DEFAULT_LOCALE,
                        "errors.invalid_input",
                        &[("detail", &e.to_string())],
                    ),
                    detail: e.to_string(),
                }),
            },
        }
    }

    /// 并发处理一批请求, 响应按请求顺序返回
    pub async fn handle_batch(&self, lines: Vec<String>) -> Vec<ResponseEnvelope> {
        join_all(lines.iter().map(|line| self.handle_line(line))).await
    }

    /// 处理单个请求信封
    pub async fn handle(&self, envelope: RequestEnvelope) -> ResponseEnvelope {
        let locale = envelope
            .locale
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(DEFAULT_LOCALE)
            .to_string();
        let span = info_span!(
            "request",
            request_id = envelope.request_id.as_deref().unwrap_or("-"),
            action = envelope.request.action()
        );

        let result = self
            .dispatch(envelope.request, &locale)
            .instrument(span)
            .await;

        match result {
            Ok(response) => ResponseEnvelope {
                request_id: envelope.request_id,
                ok: true,
                response,
            },
            Err(e) => ResponseEnvelope {
                request_id: envelope.request_id,
                ok: false,
                response: TrackerResponse::Error(ErrorResponse {
                    code: e.error_code().to_string(),
                    category: e.category(),
                    message: e.operator_message(&locale),
                    detail: e.to_string(),
                }),
            },
        }
    }

    async fn dispatch(&self, request: TrackerRequest, locale: &str) -> ApiResult<TrackerResponse> {
        match request {
            TrackerRequest::ImportRoutingCsv { path } => {
                let report = self
                    .master_data
                    .import_routing(&CsvRoutingSource::new(path))
                    .await?;
                Ok(TrackerResponse::RoutingImport { report })
            }
            TrackerRequest::ImportRoutingJson { records } => {
                let payload = serde_json::to_string(&records)
                    .map_err(|e| ApiError::InvalidInput(format!("records 序列化失败: {}", e)))?;
                let report = self
                    .master_data
                    .import_routing(&JsonRecordSource::new(payload))
                    .await?;
                Ok(TrackerResponse::RoutingImport { report })
            }
            other => {
                let shop_floor = self.shop_floor.clone();
                let master_data = self.master_data.clone();
                let locale = locale.to_string();
                let span = tracing::Span::current();
                tokio::task::spawn_blocking(move || {
                    let _entered = span.enter();
                    execute_blocking(&shop_floor, &master_data, other, &locale)
                })
                .await
                .map_err(|e| ApiError::InternalError(format!("请求处理线程异常终止: {}", e)))?
            }
        }
    }
}

/// 同步请求执行 (运行于阻塞线程池)
fn execute_blocking(
    shop_floor: &ShopFloorApi,
    master_data: &MasterDataApi,
    request: TrackerRequest,
    locale: &str,
) -> ApiResult<TrackerResponse> {
    let response = match request {
        TrackerRequest::GenerateTravelSheet {
            order_id,
            batch_id,
            quantity,
        } => TrackerResponse::TravelSheet {
            sheet: shop_floor.generate_split_travel_sheet(&order_id, batch_id, quantity)?,
        },
        TrackerRequest::ProcessScan {
            badge_token,
            checkpoint_token,
        } => {
            let scan = shop_floor.process_scan(&badge_token, &checkpoint_token)?;
            let message = scan.operator_message(locale);
            TrackerResponse::Scan { scan, message }
        }
        TrackerRequest::CompleteOperation {
            operation_id,
            badge_token,
            quantity_good,
            quantity_scrap,
            quantity_pending,
            notes,
        } => {
            let submission = QuantitySubmission {
                good: quantity_good,
                scrap: quantity_scrap,
                pending: quantity_pending,
            };
            let completion =
                shop_floor.complete_operation(&operation_id, &badge_token, submission, notes)?;
            let message = completion.operator_message(locale);
            TrackerResponse::Completion {
                completion,
                message,
            }
        }
        TrackerRequest::CancelTravelSheet { sheet_id } => TrackerResponse::TravelSheet {
            sheet: shop_floor.cancel_travel_sheet(&sheet_id)?,
        },
        TrackerRequest::GetTravelSheet { sheet_id } => TrackerResponse::TravelSheet {
            sheet: shop_floor.get_travel_sheet(&sheet_id)?,
        },
        TrackerRequest::ListTravelSheets { order_id } => TrackerResponse::TravelSheets {
            sheets: shop_floor.list_travel_sheets(&order_id)?,
        },
        TrackerRequest::AssessOrderRisk { order_id } => TrackerResponse::Risk {
            assessment: shop_floor.assess_order_risk(&order_id)?,
        },
        TrackerRequest::RiskBoard => TrackerResponse::RiskBoard {
            assessments: shop_floor.risk_board()?,
        },
        TrackerRequest::RegisterOrder(request) => TrackerResponse::Order {
            order: master_data.register_order(request)?,
        },
        TrackerRequest::CancelOrder { order_id } => TrackerResponse::Order {
            order: master_data.cancel_order(&order_id)?,
        },
        TrackerRequest::DeleteOrder { order_id } => {
            master_data.delete_order(&order_id)?;
            TrackerResponse::Ack {
                message: t_with_args_in(locale, "common.success", &[]),
            }
        }
        TrackerRequest::RegisterOperator(request) => TrackerResponse::Operator {
            operator: master_data.register_operator(request)?,
        },
        TrackerRequest::DeactivateOperator { operator_id } => TrackerResponse::Operator {
            operator: master_data.deactivate_operator(&operator_id)?,
        },
        TrackerRequest::ReplaceRouting { part_number, steps } => {
            let steps_imported = master_data.replace_routing(&part_number, steps)?;
            TrackerResponse::Routing {
                part_number,
                steps_imported,
            }
        }
        TrackerRequest::ImportRoutingCsv { .. } | TrackerRequest::ImportRoutingJson { .. } => {
            return Err(ApiError::InternalError(
                "导入请求须经异步通道处理".to_string(),
            ))
        }
    };
    Ok(response)
}

/// 尽力从无法解析的请求中取回 request_id, 便于调用方对账
fn extract_request_id(line: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()?
        .get("request_id")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_request_id_from_malformed_request() {
        assert_eq!(
            extract_request_id(r#"{"request_id": "r-9", "action": "nope"}"#).as_deref(),
            Some("r-9")
        );
        assert_eq!(extract_request_id("not json"), None);
        assert_eq!(extract_request_id(r#"{"request_id": 5}"#), None);
    }
}
