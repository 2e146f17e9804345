mod api;
mod application;
mod domain;
mod infrastructure;
mod ports;

#[cfg(test)]
mod test_support;

use api::AppState;
use application::{CheckoutService, CheckoutSettings, PaymentSessionService};
use infrastructure::{
    AppConfig, AuthorizeNetAdapter, Bitrix24CrmAdapter, HttpMailerAdapter, InMemorySessionStore,
    LogOnlyMailer, SystemClock,
};
use ports::MailerPort;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载环境变量
    dotenvy::dotenv().ok();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Starting CRM payment relay...");

    let config = AppConfig::from_env()?;
    info!(
        "Configuration loaded: base_url={} processor_environment={}",
        config.base_url,
        config.authorize_net.environment()
    );

    // 创建适配器
    let crm = Arc::new(Bitrix24CrmAdapter::new(Arc::new(config.bitrix24.clone()))?);
    let processor = Arc::new(AuthorizeNetAdapter::new(Arc::new(
        config.authorize_net.clone(),
    ))?);
    let mailer: Arc<dyn MailerPort> = match &config.mail.relay_url {
        Some(relay_url) => Arc::new(HttpMailerAdapter::new(
            relay_url.clone(),
            Arc::new(config.mail.clone()),
        )?),
        None => {
            warn!("MAIL_RELAY_URL not set, emails will only be logged");
            Arc::new(LogOnlyMailer)
        }
    };
    let clock = Arc::new(SystemClock);

    // 创建服务
    let sessions = Arc::new(PaymentSessionService::new(
        Arc::new(InMemorySessionStore::new()),
        clock.clone(),
    ));
    let checkout = Arc::new(CheckoutService::new(
        sessions.clone(),
        crm,
        processor,
        mailer,
        clock,
        CheckoutSettings {
            base_url: config.base_url.clone(),
            default_amount: config.default_amount,
            web_payer_email: config.web_payer_email.clone(),
        },
    ));

    // 定期清理过期会话
    let sweep_interval = Duration::from_secs(config.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            if let Err(e) = sessions.sweep_expired().await {
                error!("Session sweep failed: {}", e);
            }
        }
    });

    let app_state = AppState { checkout };
    let app = api::create_router(app_state, &config.cors_allowed_origins);

    let addr = config.bind_address();
    info!("Server listening on {}", addr);
    info!("Available endpoints:");
    info!("  GET  /health - Health check");
    info!("  POST /webhook/crm - CRM widget placement");
    info!("  POST /api/sessions - Create payment link");
    info!("  POST /api/send-payment-email - Email payment link");
    info!("  GET  /pay-direct - Direct web payment");
    info!("  GET  /payment/:token - Payment page");
    info!("  POST /api/generate-authorize-link - Hosted payment page");
    info!("  POST /api/process-payment - Direct card charge");
    info!("  GET  /authorize/return - Hosted payment return");
    info!("  GET  /authorize/cancel - Hosted payment cancelled");
    info!("  POST /api/webhooks/authorize - Processor webhook");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
