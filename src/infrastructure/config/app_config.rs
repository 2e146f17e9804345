use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::Money;
use crate::infrastructure::config::authorize_net_config::AuthorizeNetConfig;

/// Bitrix24 配置
#[derive(Debug, Clone)]
pub struct Bitrix24Config {
    /// 入站Webhook地址（crm.deal.*, crm.contact.*）
    pub webhook_url: String,
    /// 商品行查询使用的Webhook地址，缺省与 `webhook_url` 相同
    pub product_webhook_url: String,
}

/// 邮件中继配置
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// 未配置时只记录日志，不实际发送
    pub relay_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
}

/// 应用配置
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// 服务对外地址，用于生成付款链接
    pub base_url: String,
    /// 未指定金额时的默认金额
    pub default_amount: Money,
    /// 网站直接付款使用的通用邮箱
    pub web_payer_email: String,
    pub sweep_interval_secs: u64,
    pub cors_allowed_origins: Vec<String>,
    pub bitrix24: Bitrix24Config,
    pub authorize_net: AuthorizeNetConfig,
    pub mail: MailConfig,
}

impl AppConfig {
    pub fn from_env() -> DomainResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> DomainResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let port = get_or("SERVER_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| DomainError::ConfigurationError(format!("SERVER_PORT: {}", e)))?;
        let sweep_interval_secs = get_or("SESSION_SWEEP_INTERVAL_SECS", "300")
            .parse::<u64>()
            .map_err(|e| {
                DomainError::ConfigurationError(format!("SESSION_SWEEP_INTERVAL_SECS: {}", e))
            })?;
        let default_amount: Money = get_or("DEFAULT_AMOUNT", "20.80")
            .parse()
            .map_err(|e| DomainError::ConfigurationError(format!("DEFAULT_AMOUNT: {}", e)))?;

        let base_url = get_or("BASE_URL", &format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();

        let webhook_url = get("BITRIX24_WEBHOOK_URL").ok_or_else(|| {
            DomainError::ConfigurationError("BITRIX24_WEBHOOK_URL must be set".to_string())
        })?;
        let webhook_url = webhook_url.trim_end_matches('/').to_string();
        let product_webhook_url = get("BITRIX24_PRODUCT_WEBHOOK_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| webhook_url.clone());

        let cors_allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .map(|value| {
                value
                    .split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let authorize_net = AuthorizeNetConfig::from_lookup(&get, &base_url)?;

        Ok(Self {
            host: get_or("SERVER_HOST", "0.0.0.0"),
            port,
            default_amount,
            web_payer_email: get_or("WEB_PAYER_EMAIL", "webpayment@example.com"),
            sweep_interval_secs,
            cors_allowed_origins,
            bitrix24: Bitrix24Config {
                webhook_url,
                product_webhook_url,
            },
            authorize_net,
            mail: MailConfig {
                relay_url: get("MAIL_RELAY_URL"),
                api_key: get("MAIL_RELAY_API_KEY"),
                from: get_or("MAIL_FROM", "payments@example.com"),
            },
            base_url,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
