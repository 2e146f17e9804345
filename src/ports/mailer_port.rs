use crate::domain::errors::DomainResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 邮件模板
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailTemplate {
    /// 付款链接
    PaymentLink,
    /// 付款确认
    PaymentConfirmation,
}

impl EmailTemplate {
    pub fn subject(&self) -> &'static str {
        match self {
            EmailTemplate::PaymentLink => "Secure Payment Link",
            EmailTemplate::PaymentConfirmation => "Payment Confirmation",
        }
    }
}

impl fmt::Display for EmailTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmailTemplate::PaymentLink => write!(f, "payment_link"),
            EmailTemplate::PaymentConfirmation => write!(f, "payment_confirmation"),
        }
    }
}

/// 邮件发送端口接口
#[async_trait]
pub trait MailerPort: Send + Sync {
    async fn send(&self, to: &str, template: EmailTemplate, data: Value) -> DomainResult<()>;
}
