use super::handlers::*;
use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub fn create_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/webhook/crm", post(crm_webhook))
        .route("/api/sessions", post(create_session))
        .route("/api/send-payment-email", post(send_payment_email))
        .route("/api/generate-authorize-link", post(generate_hosted_payment))
        .route("/api/process-payment", post(process_payment))
        .route("/api/webhooks/authorize", post(processor_webhook))
        .route("/pay-direct", get(pay_direct))
        .route("/payment/:token", get(payment_page))
        .route("/authorize/return", get(hosted_return).post(hosted_return_form))
        .route("/authorize/cancel", get(hosted_cancel))
        .route("/payment-success", get(payment_success))
        .route("/payment-failed", get(payment_failed))
        .route("/payment-cancelled", get(payment_cancelled))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 未配置来源时允许任意来源（CRM挂件嵌入在iframe中）
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(AllowOrigin::list(origins))
    }
}
