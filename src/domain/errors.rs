use thiserror::Error;

/// 领域层错误类型
#[derive(Error, Debug)]
pub enum DomainError {
    /// 请求参数缺失或格式错误
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// 支付会话不存在
    #[error("Payment session not found")]
    NotFound,

    /// 支付会话已过期
    #[error("Payment session expired")]
    Expired,

    /// 支付会话已被使用
    #[error("Payment session already consumed")]
    AlreadyConsumed,

    /// 同一会话已有扣款请求在处理中
    #[error("A charge is already in progress for this payment session")]
    ChargeInProgress,

    /// 外部服务（CRM、支付网关、邮件）调用失败
    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// HTTP请求错误
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl DomainError {
    /// 会话生命周期相关的错误（由调用方转换为用户可见页面）
    pub fn is_session_error(&self) -> bool {
        matches!(
            self,
            DomainError::NotFound
                | DomainError::Expired
                | DomainError::AlreadyConsumed
                | DomainError::ChargeInProgress
        )
    }

    /// 面向付款人的提示，不包含内部标识
    pub fn user_message(&self) -> &'static str {
        match self {
            DomainError::InvalidRequest(_) => "The request is missing required information.",
            DomainError::NotFound => {
                "This payment link is invalid or has expired. Please request a new payment link."
            }
            DomainError::Expired => {
                "This payment link has expired. Please request a new payment link."
            }
            DomainError::AlreadyConsumed => "This payment link has already been used.",
            DomainError::ChargeInProgress => {
                "A payment for this link is already being processed. Please wait a moment."
            }
            DomainError::UpstreamFailure(_) | DomainError::HttpError(_) => {
                "We could not reach the payment service. Please try again later."
            }
            _ => "An error occurred processing your request.",
        }
    }
}

/// 领域结果类型
pub type DomainResult<T> = Result<T, DomainError>;
