use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::{ChargeReceipt, FlowKind, HostedPage, Money};
use crate::infrastructure::config::AuthorizeNetConfig;
use crate::ports::payment_processor_port::*;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::{json, Value};
use sha2::Sha512;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

type HmacSha512 = Hmac<Sha512>;

const PROCESSOR_NAME: &str = "Authorize.Net";

/// 订单描述最大长度
const MAX_DESCRIPTION_LEN: usize = 255;

/// Authorize.Net 适配器实现
#[derive(Clone)]
pub struct AuthorizeNetAdapter {
    config: Arc<AuthorizeNetConfig>,
    client: Client,
}

impl AuthorizeNetAdapter {
    pub fn new(config: Arc<AuthorizeNetConfig>) -> DomainResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        info!(
            "Authorize.Net configured: environment={} api={}",
            config.environment(),
            config.api_url()
        );
        Ok(Self { config, client })
    }

    fn merchant_authentication(&self) -> Value {
        json!({
            "name": self.config.api_login_id,
            "transactionKey": self.config.transaction_key,
        })
    }

    /// 发送请求；响应体可能带有 UTF-8 BOM
    async fn post(&self, payload: &Value) -> DomainResult<Value> {
        let response = self
            .client
            .post(self.config.api_url())
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            error!("Authorize.Net API error: {} - {}", status, text);
            return Err(DomainError::UpstreamFailure(format!(
                "Payment processor returned {}",
                status
            )));
        }

        Ok(serde_json::from_str(text.trim_start_matches('\u{feff}'))?)
    }
}

/// 发票号格式 EX000XL00TX：实体ID补齐三位，计数取当前秒数后两位
pub fn build_invoice_number(entity_id: &str, unix_seconds: i64) -> String {
    let numeric_id = entity_id.trim().parse::<u64>().unwrap_or(0);
    format!("EX{:03}XL{:02}TX", numeric_id, unix_seconds.rem_euclid(100))
}

/// 订单描述：优先使用商品名称
pub fn order_description(order: &ProcessorOrder) -> String {
    let names: Vec<&str> = order
        .line_items
        .iter()
        .map(|item| item.name.trim())
        .filter(|name| !name.is_empty())
        .take(2)
        .collect();

    let description = if !order.line_items.is_empty() && !names.is_empty() {
        let more = if order.line_items.len() > 2 { "..." } else { "" };
        format!("Payment for: {}{}", names.join(", "), more)
    } else if !order.line_items.is_empty() || order.flow == FlowKind::Email {
        format!("Payment for {}", order.payer.name)
    } else if let Some(text) = order.description.as_deref().filter(|d| !d.trim().is_empty()) {
        text.trim().to_string()
    } else {
        format!("Payment for {} {}", order.entity.kind, order.entity.id)
    };

    if description.chars().count() > MAX_DESCRIPTION_LEN {
        let truncated: String = description.chars().take(MAX_DESCRIPTION_LEN - 3).collect();
        format!("{}...", truncated)
    } else {
        description
    }
}

fn generate_reference_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "AUTH{}{}",
        chrono::Utc::now().timestamp_millis(),
        &suffix[..6]
    )
}

/// 提取网关返回的错误信息
fn error_message(result: &Value) -> String {
    let transaction_errors = &result["transactionResponse"]["errors"];
    let transaction_error = transaction_errors[0]["errorText"]
        .as_str()
        .or_else(|| transaction_errors["error"][0]["errorText"].as_str());

    transaction_error
        .or_else(|| result["messages"]["message"][0]["text"].as_str())
        .unwrap_or("Transaction failed in payment processor")
        .to_string()
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn value_money(value: &Value) -> Option<Money> {
    let amount = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }?;
    Some(Money::from_cents((amount * 100.0).round() as i64))
}

fn parse_hosted_page_response(result: &Value, post_url: &str) -> DomainResult<HostedPage> {
    match result["token"].as_str().filter(|token| !token.is_empty()) {
        Some(token) => Ok(HostedPage {
            post_url: post_url.to_string(),
            form_token: token.to_string(),
        }),
        None => Err(DomainError::UpstreamFailure(error_message(result))),
    }
}

fn parse_charge_response(result: &Value, invoice_number: &str) -> DomainResult<ChargeReceipt> {
    let transaction = &result["transactionResponse"];
    if value_text(&transaction["responseCode"]).as_deref() != Some("1") {
        return Err(DomainError::UpstreamFailure(error_message(result)));
    }

    let transaction_id = value_text(&transaction["transId"])
        .ok_or_else(|| DomainError::UpstreamFailure("Missing transaction id".to_string()))?;

    Ok(ChargeReceipt {
        transaction_id,
        auth_code: value_text(&transaction["authCode"]),
        reference_id: Some(generate_reference_id()),
        invoice_number: Some(invoice_number.to_string()),
        processor: PROCESSOR_NAME.to_string(),
    })
}

fn parse_transaction_details(result: &Value, transaction_id: &str) -> DomainResult<TransactionStatus> {
    let transaction = &result["transaction"];
    if transaction.is_null() {
        return Err(DomainError::UpstreamFailure(error_message(result)));
    }

    Ok(TransactionStatus {
        transaction_id: value_text(&transaction["transId"])
            .unwrap_or_else(|| transaction_id.to_string()),
        approved: value_text(&transaction["responseCode"]).as_deref() == Some("1"),
        amount: value_money(&transaction["authAmount"])
            .or_else(|| value_money(&transaction["settleAmount"])),
        auth_code: value_text(&transaction["authCode"]),
        invoice_number: value_text(&transaction["order"]["invoiceNumber"]),
    })
}

/// 校验 X-ANET-Signature（格式 `sha512=<HEX>`）
fn verify_signature(signature_key: &str, body: &str, header: &str) -> bool {
    let provided = header
        .trim()
        .strip_prefix("sha512=")
        .or_else(|| header.trim().strip_prefix("SHA512="))
        .unwrap_or(header.trim());

    let Ok(expected) = hex::decode(provided) else {
        return false;
    };
    let Ok(mut mac) = HmacSha512::new_from_slice(signature_key.as_bytes()) else {
        return false;
    };

    mac.update(body.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

#[async_trait]
impl PaymentProcessorPort for AuthorizeNetAdapter {
    fn name(&self) -> &'static str {
        PROCESSOR_NAME
    }

    fn environment(&self) -> &'static str {
        self.config.environment()
    }

    /// 创建托管支付页（Accept Hosted）
    async fn create_hosted_page(&self, request: HostedPageRequest) -> DomainResult<HostedPageResult> {
        let order = &request.order;
        let invoice_number = build_invoice_number(&order.entity.id, chrono::Utc::now().timestamp());
        let description = order_description(order);
        let base = &self.config.return_base_url;

        let return_options = json!({
            "showReceipt": true,
            "url": format!("{}/authorize/return?session={}", base, request.session_token),
            "urlText": "Continue",
            "cancelUrl": format!("{}/authorize/cancel", base),
            "cancelUrlText": "Cancel",
        });

        let payload = json!({
            "getHostedPaymentPageRequest": {
                "merchantAuthentication": self.merchant_authentication(),
                "transactionRequest": {
                    "transactionType": "authCaptureTransaction",
                    "amount": order.amount.to_string(),
                    "order": {
                        "invoiceNumber": invoice_number,
                        "description": description,
                    },
                    "customer": { "email": order.payer.email },
                },
                "hostedPaymentSettings": {
                    "setting": [
                        {
                            "settingName": "hostedPaymentReturnOptions",
                            "settingValue": return_options.to_string(),
                        },
                    ],
                },
            },
        });

        debug!(
            "Hosted page request: invoice={} amount={} entity={}",
            invoice_number, order.amount, order.entity
        );

        let result = self.post(&payload).await?;
        let hosted_page = parse_hosted_page_response(&result, self.config.hosted_page_url())?;
        let reference_id = generate_reference_id();

        info!("Hosted payment page generated: reference={}", reference_id);
        Ok(HostedPageResult {
            hosted_page,
            reference_id,
            invoice_number,
        })
    }

    /// 直接扣款（authCaptureTransaction）
    async fn charge(&self, request: ChargeRequest) -> DomainResult<ChargeReceipt> {
        let order = &request.order;
        let invoice_number = build_invoice_number(&order.entity.id, chrono::Utc::now().timestamp());
        let description = order_description(order);

        let payload = json!({
            "createTransactionRequest": {
                "merchantAuthentication": self.merchant_authentication(),
                "transactionRequest": {
                    "transactionType": "authCaptureTransaction",
                    "amount": order.amount.to_string(),
                    "payment": {
                        "creditCard": {
                            "cardNumber": request.card.number.trim(),
                            "expirationDate": request.card.expiry.trim(),
                            "cardCode": request.card.cvv.trim(),
                        },
                    },
                    "order": {
                        "invoiceNumber": invoice_number,
                        "description": description,
                    },
                    "customer": { "email": order.payer.email },
                    "billTo": {
                        "firstName": order.payer.first_name(),
                        "lastName": order.payer.last_name(),
                        "email": order.payer.email,
                    },
                    "userFields": {
                        "userField": [
                            { "name": "entityType", "value": order.entity.kind.to_string() },
                            { "name": "entityId", "value": order.entity.id },
                        ],
                    },
                },
            },
        });

        debug!(
            "Charge request: invoice={} amount={} card={:?}",
            invoice_number, order.amount, request.card
        );

        let result = self.post(&payload).await?;
        let receipt = parse_charge_response(&result, &invoice_number).inspect_err(|e| {
            warn!("Charge declined: {}", e);
        })?;

        info!("Charge approved: transaction={}", receipt.transaction_id);
        Ok(receipt)
    }

    /// 查询交易详情
    async fn transaction_status(&self, transaction_id: &str) -> DomainResult<TransactionStatus> {
        let payload = json!({
            "getTransactionDetailsRequest": {
                "merchantAuthentication": self.merchant_authentication(),
                "transId": transaction_id,
            },
        });

        let result = self.post(&payload).await?;
        parse_transaction_details(&result, transaction_id)
    }

    /// 校验Webhook签名，未配置签名密钥时跳过
    async fn verify_notification(&self, body: &str, signature: Option<&str>) -> DomainResult<bool> {
        match (self.config.signature_key.as_deref(), signature) {
            (None, _) => {
                debug!("Webhook signature key not configured, skipping verification");
                Ok(true)
            }
            (Some(_), None) => Ok(false),
            (Some(key), Some(header)) => Ok(verify_signature(key, body, header)),
        }
    }
}
