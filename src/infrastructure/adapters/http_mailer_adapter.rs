use crate::domain::errors::{DomainError, DomainResult};
use crate::infrastructure::config::MailConfig;
use crate::ports::mailer_port::{EmailTemplate, MailerPort};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// 通过HTTP邮件中继发送模板邮件
#[derive(Clone)]
pub struct HttpMailerAdapter {
    relay_url: String,
    config: Arc<MailConfig>,
    client: Client,
}

impl HttpMailerAdapter {
    pub fn new(relay_url: String, config: Arc<MailConfig>) -> DomainResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            relay_url,
            config,
            client,
        })
    }

    fn message(&self, to: &str, template: EmailTemplate, data: Value) -> Value {
        json!({
            "from": self.config.from,
            "to": to,
            "subject": template.subject(),
            "template": template.to_string(),
            "data": data,
        })
    }
}

#[async_trait]
impl MailerPort for HttpMailerAdapter {
    async fn send(&self, to: &str, template: EmailTemplate, data: Value) -> DomainResult<()> {
        let mut request = self
            .client
            .post(&self.relay_url)
            .json(&self.message(to, template, data));
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Mail relay error: {} - {}", status, error_text);
            return Err(DomainError::UpstreamFailure(format!(
                "Mail relay returned {}",
                status
            )));
        }

        info!("Email sent: template={} to={}", template, to);
        Ok(())
    }
}

/// 未配置邮件中继时使用：只记录日志
#[derive(Debug, Clone, Default)]
pub struct LogOnlyMailer;

#[async_trait]
impl MailerPort for LogOnlyMailer {
    async fn send(&self, to: &str, template: EmailTemplate, data: Value) -> DomainResult<()> {
        info!("Mail relay not configured, email not sent: template={} to={}", template, to);
        debug!("Email data: {}", data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_shape() {
        let mailer = HttpMailerAdapter::new(
            "https://mail.example.com/send".to_string(),
            Arc::new(MailConfig {
                relay_url: Some("https://mail.example.com/send".to_string()),
                api_key: None,
                from: "payments@example.com".to_string(),
            }),
        )
        .unwrap();

        let message = mailer.message(
            "ana@example.com",
            EmailTemplate::PaymentConfirmation,
            json!({ "amount": "20.80" }),
        );

        assert_eq!(message["template"], "payment_confirmation");
        assert_eq!(message["subject"], "Payment Confirmation");
        assert_eq!(message["data"]["amount"], "20.80");
    }

    #[tokio::test]
    async fn test_log_only_mailer_succeeds() {
        let result = LogOnlyMailer
            .send("ana@example.com", EmailTemplate::PaymentLink, json!({}))
            .await;
        assert!(result.is_ok());
    }
}
