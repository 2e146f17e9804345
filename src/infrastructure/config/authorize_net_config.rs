use crate::domain::errors::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};

/// Authorize.Net 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeNetConfig {
    /// API Login ID
    pub api_login_id: String,

    /// Transaction Key
    pub transaction_key: String,

    /// Webhook签名密钥（十六进制），未配置时不校验签名
    pub signature_key: Option<String>,

    /// 是否使用沙箱环境
    pub use_sandbox: bool,

    /// 服务对外地址（托管页回跳地址）
    pub return_base_url: String,
}

impl AuthorizeNetConfig {
    pub fn from_lookup<F>(lookup: F, return_base_url: &str) -> DomainResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| DomainError::ConfigurationError(format!("{} must be set", key)))
        };

        Ok(Self {
            api_login_id: required("AUTHORIZE_API_LOGIN_ID")?,
            transaction_key: required("AUTHORIZE_TRANSACTION_KEY")?,
            signature_key: lookup("AUTHORIZE_SIGNATURE_KEY").filter(|key| !key.trim().is_empty()),
            use_sandbox: lookup("AUTHORIZE_USE_SANDBOX")
                .map(|value| value.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            return_base_url: return_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// API 地址
    pub fn api_url(&self) -> &'static str {
        if self.use_sandbox {
            "https://apitest.authorize.net/xml/v1/request.api"
        } else {
            "https://api.authorize.net/xml/v1/request.api"
        }
    }

    /// 托管支付页表单提交地址
    pub fn hosted_page_url(&self) -> &'static str {
        if self.use_sandbox {
            "https://test.authorize.net/payment/payment"
        } else {
            "https://accept.authorize.net/payment/payment"
        }
    }

    pub fn environment(&self) -> &'static str {
        if self.use_sandbox {
            "sandbox"
        } else {
            "production"
        }
    }
}
