use crate::api::pages;
use crate::application::*;
use crate::domain::errors::DomainError;
use axum::{
    extract::{Form, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Redirect, Response},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub checkout: Arc<CheckoutService>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// 领域错误转换为HTTP状态码
pub fn status_for(e: &DomainError) -> StatusCode {
    match e {
        DomainError::InvalidRequest(_) | DomainError::SerializationError(_) => {
            StatusCode::BAD_REQUEST
        }
        DomainError::NotFound => StatusCode::NOT_FOUND,
        DomainError::Expired => StatusCode::GONE,
        DomainError::AlreadyConsumed | DomainError::ChargeInProgress => StatusCode::CONFLICT,
        DomainError::UpstreamFailure(_) | DomainError::HttpError(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(code: &str, e: DomainError) -> ApiError {
    let status = status_for(&e);
    if status.is_server_error() {
        error!("{} error: {}", code, e);
    } else {
        warn!("{} rejected: {}", code, e);
    }

    let message = match &e {
        DomainError::InvalidRequest(message) | DomainError::UpstreamFailure(message) => {
            message.clone()
        }
        _ => e.user_message().to_string(),
    };
    (status, Json(ErrorResponse::new(code.to_string(), message)))
}

/// CRM挂件回调
#[derive(Debug, Deserialize)]
pub struct CrmPlacementRequest {
    #[serde(rename = "PLACEMENT_OPTIONS")]
    pub placement_options: Option<Value>,
}

/// CRM挂件回调：PLACEMENT_OPTIONS 可以是JSON对象或JSON字符串
pub async fn crm_webhook(
    State(state): State<AppState>,
    Json(request): Json<CrmPlacementRequest>,
) -> Result<impl IntoResponse, ApiError> {
    info!("Received CRM placement webhook");

    let options = match request.placement_options {
        Some(Value::String(raw)) => serde_json::from_str::<PlacementOptions>(&raw),
        Some(value @ Value::Object(_)) => serde_json::from_value::<PlacementOptions>(value),
        _ => {
            return Err(api_error(
                "INVALID_REQUEST",
                DomainError::InvalidRequest("PLACEMENT_OPTIONS not found".to_string()),
            ))
        }
    }
    .map_err(|e| {
        api_error(
            "INVALID_REQUEST",
            DomainError::InvalidRequest(format!("PLACEMENT_OPTIONS is not valid JSON: {}", e)),
        )
    })?;

    state
        .checkout
        .create_link_session(options.into())
        .await
        .map(|response| (StatusCode::CREATED, Json(response)).into_response())
        .map_err(|e| api_error("SESSION_ERROR", e))
}

/// 创建付款链接
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    info!("Received session creation request: entity={}", request.entity_id);

    state
        .checkout
        .create_link_session(request)
        .await
        .map(|response| (StatusCode::CREATED, Json(response)).into_response())
        .map_err(|e| api_error("SESSION_ERROR", e))
}

/// 发送付款邮件
pub async fn send_payment_email(
    State(state): State<AppState>,
    Json(request): Json<SendPaymentEmailRequest>,
) -> Result<impl IntoResponse, ApiError> {
    info!("Received payment email request: entity={}", request.entity_id);

    state
        .checkout
        .send_payment_email(request)
        .await
        .map(|response| (StatusCode::OK, Json(response)).into_response())
        .map_err(|e| api_error("EMAIL_ERROR", e))
}

/// 网站直接付款
pub async fn pay_direct(
    State(state): State<AppState>,
    Query(query): Query<DirectPaymentQuery>,
) -> Response {
    info!("Received direct web payment request");

    match state.checkout.start_web_payment(query).await {
        Ok(token) => Redirect::to(&format!("/payment/{}", token)).into_response(),
        Err(e) => {
            error!("Direct payment error: {}", e);
            pages::error_page(&e).into_response()
        }
    }
}

/// 付款页面
pub async fn payment_page(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Response {
    match state.checkout.view_session(&token).await {
        Ok(page) => pages::payment_page(&page).into_response(),
        Err(e) => {
            if !e.is_session_error() {
                error!("Payment page error: {}", e);
            }
            pages::error_page(&e).into_response()
        }
    }
}

/// 生成托管支付页
pub async fn generate_hosted_payment(
    State(state): State<AppState>,
    Json(request): Json<HostedPaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .checkout
        .prepare_hosted_payment(request)
        .await
        .map(|response| (StatusCode::OK, Json(response)).into_response())
        .map_err(|e| api_error("PAYMENT_ERROR", e))
}

/// 直接扣款
pub async fn process_payment(
    State(state): State<AppState>,
    Json(request): Json<ProcessPaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .checkout
        .charge_card(request)
        .await
        .map(|response| (StatusCode::OK, Json(response)).into_response())
        .map_err(|e| api_error("PAYMENT_ERROR", e))
}

/// 托管支付页回跳（GET）
pub async fn hosted_return(
    State(state): State<AppState>,
    Query(params): Query<HostedReturnParams>,
) -> Redirect {
    complete_return(&state, params).await
}

/// 托管支付页回跳（POST表单）
pub async fn hosted_return_form(
    State(state): State<AppState>,
    Form(params): Form<HostedReturnParams>,
) -> Redirect {
    complete_return(&state, params).await
}

async fn complete_return(state: &AppState, params: HostedReturnParams) -> Redirect {
    let (Some(token), Some(transaction_id)) = (params.session, params.trans_id) else {
        warn!("Hosted payment return without session or transaction id");
        return Redirect::to("/payment-failed");
    };

    match state
        .checkout
        .complete_hosted_payment(&token, &transaction_id)
        .await
    {
        Ok(result) => Redirect::to(&format!(
            "/payment-success?amount={}&transId={}",
            result.amount, result.transaction_id
        )),
        Err(e) => {
            warn!("Hosted payment return failed: {}", e);
            Redirect::to("/payment-failed")
        }
    }
}

/// 付款人在托管支付页取消
pub async fn hosted_cancel() -> Redirect {
    info!("Payer cancelled hosted payment");
    Redirect::to("/payment-cancelled")
}

/// 支付网关Webhook
pub async fn processor_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<impl IntoResponse, ApiError> {
    info!("Received processor webhook");

    let signature = headers
        .get("X-ANET-Signature")
        .and_then(|h| h.to_str().ok());

    state
        .checkout
        .handle_processor_notification(&body, signature)
        .await
        .map(|_| (StatusCode::OK, Json(serde_json::json!({ "received": true }))).into_response())
        .map_err(|e| api_error("WEBHOOK_ERROR", e))
}

#[derive(Debug, Default, Deserialize)]
pub struct SuccessQuery {
    pub amount: Option<String>,
    #[serde(rename = "transId")]
    pub trans_id: Option<String>,
}

pub async fn payment_success(Query(query): Query<SuccessQuery>) -> Html<String> {
    pages::success_page(query.amount.as_deref(), query.trans_id.as_deref())
}

pub async fn payment_failed() -> Html<String> {
    pages::failed_page()
}

pub async fn payment_cancelled() -> Html<String> {
    pages::cancelled_page()
}

/// 健康检查
pub async fn health_check(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let active_sessions = state
        .checkout
        .sessions()
        .active_sessions()
        .await
        .map_err(|e| api_error("HEALTH_ERROR", e))?;

    Ok((
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            base_url: state.checkout.base_url().to_string(),
            processor: state.checkout.processor_name().to_string(),
            processor_environment: state.checkout.processor_environment().to_string(),
            active_sessions,
        }),
    ))
}
