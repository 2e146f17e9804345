use crate::domain::value_objects::deserialize_optional_money;
use crate::domain::{HostedPage, LineItem, Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// 商品行输入：兼容 Bitrix24 商品行字段名
#[derive(Debug, Clone, Deserialize)]
pub struct ProductInput {
    #[serde(alias = "PRODUCT_NAME", default)]
    pub name: String,

    #[serde(alias = "QUANTITY", default = "default_quantity", deserialize_with = "flexible_f64")]
    pub quantity: f64,

    #[serde(alias = "unitPrice", alias = "PRICE", default, deserialize_with = "deserialize_optional_money")]
    pub unit_price: Option<Money>,
}

fn default_quantity() -> f64 {
    1.0
}

fn flexible_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl From<ProductInput> for LineItem {
    fn from(input: ProductInput) -> Self {
        LineItem {
            name: input.name,
            quantity: input.quantity,
            unit_price: input.unit_price.unwrap_or(Money::from_cents(0)),
        }
    }
}

/// 创建支付会话请求
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// CRM实体ID
    #[serde(default)]
    pub entity_id: String,

    /// CRM实体类型（deal / contact / web）
    pub entity_type: Option<String>,

    pub contact_name: Option<String>,

    pub contact_email: Option<String>,

    /// 建议金额
    #[serde(default, deserialize_with = "deserialize_optional_money")]
    pub amount: Option<Money>,

    #[serde(default)]
    pub products: Vec<ProductInput>,

    pub description: Option<String>,
}

/// CRM挂件回调中的 PLACEMENT_OPTIONS
#[derive(Debug, Clone, Deserialize)]
pub struct PlacementOptions {
    #[serde(rename = "ENTITY_ID", default, deserialize_with = "flexible_string")]
    pub entity_id: String,

    #[serde(rename = "ENTITY_TYPE")]
    pub entity_type: Option<String>,

    #[serde(rename = "CONTACT_EMAIL")]
    pub contact_email: Option<String>,

    #[serde(rename = "CONTACT_NAME")]
    pub contact_name: Option<String>,

    #[serde(rename = "DEAL_AMOUNT", default, deserialize_with = "deserialize_optional_money")]
    pub deal_amount: Option<Money>,

    #[serde(rename = "PRODUCTS", default)]
    pub products: Vec<ProductInput>,
}

fn flexible_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(text)) => text,
        Some(Raw::Number(number)) => number.to_string(),
        None => String::new(),
    })
}

impl From<PlacementOptions> for CreateSessionRequest {
    fn from(options: PlacementOptions) -> Self {
        Self {
            entity_id: options.entity_id,
            entity_type: options.entity_type,
            contact_name: options.contact_name,
            contact_email: options.contact_email,
            amount: options.deal_amount,
            products: options.products,
            description: None,
        }
    }
}

/// 创建支付会话响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub success: bool,
    pub token: String,
    pub payment_link: String,
    pub entity_id: String,
    pub entity_type: String,
    pub contact_email: String,
    pub products_count: usize,
    pub flow_type: String,
    pub expires_at: DateTime<Utc>,
    pub message: String,
}

/// 发送付款邮件请求
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPaymentEmailRequest {
    #[serde(default, deserialize_with = "flexible_string")]
    pub entity_id: String,
    pub entity_type: Option<String>,
    #[serde(default)]
    pub client_email: String,
    pub client_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_money")]
    pub amount: Option<Money>,
    #[serde(default)]
    pub products: Vec<ProductInput>,
}

/// 发送付款邮件响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPaymentEmailResponse {
    pub success: bool,
    pub message: String,
    pub client_email: String,
    pub client_name: String,
    pub entity_id: String,
    pub amount: Option<Money>,
    pub products_count: usize,
    pub flow_type: String,
}

/// 网站直接付款参数
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectPaymentQuery {
    pub amount: Option<String>,
    pub name: Option<String>,
    pub reference: Option<String>,
    pub description: Option<String>,
}

/// 生成托管支付页请求
#[derive(Debug, Clone, Deserialize)]
pub struct HostedPaymentRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default, deserialize_with = "deserialize_optional_money")]
    pub amount: Option<Money>,
}

/// 托管支付页响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostedPaymentResponse {
    pub success: bool,
    pub post_url: String,
    /// 网关表单令牌
    pub token: String,
    pub reference_id: String,
    pub amount: Money,
    pub flow_type: String,
    pub message: String,
}

/// 直接扣款请求
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPaymentRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default, deserialize_with = "deserialize_optional_money")]
    pub amount: Option<Money>,
    #[serde(default)]
    pub card_number: String,
    #[serde(default)]
    pub expiry: String,
    #[serde(default)]
    pub cvv: String,
    pub card_name: Option<String>,
}

/// 付款结果
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResultResponse {
    pub success: bool,
    pub message: String,
    pub transaction_id: String,
    pub auth_code: Option<String>,
    pub reference_id: Option<String>,
    pub invoice_number: Option<String>,
    pub amount: Money,
    pub client_email: String,
}

/// 托管支付页回跳参数
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostedReturnParams {
    pub session: Option<String>,
    #[serde(rename = "transId", alias = "x_trans_id")]
    pub trans_id: Option<String>,
}

/// 付款页面模型
#[derive(Debug, Clone)]
pub enum PaymentPage {
    /// 自动提交到网关托管页
    AutoRedirect { hosted_page: HostedPage },
    /// 显示付款表单
    Form(PaymentForm),
}

#[derive(Debug, Clone)]
pub struct PaymentForm {
    pub token: String,
    pub payer_name: String,
    pub amount: Money,
    pub amount_editable: bool,
    pub products_summary: String,
    pub line_items: Vec<LineItem>,
}

/// 健康检查响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub base_url: String,
    pub processor: String,
    pub processor_environment: String,
    pub active_sessions: usize,
}

/// 错误响应
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: String, message: String) -> Self {
        Self { error, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placement_options_from_widget() {
        let options: PlacementOptions = serde_json::from_str(
            r#"{
                "ENTITY_ID": 42,
                "ENTITY_TYPE": "deal",
                "CONTACT_EMAIL": "ana@example.com",
                "DEAL_AMOUNT": "",
                "PRODUCTS": [{ "PRODUCT_NAME": "Tax return", "PRICE": 15.5, "QUANTITY": "2" }]
            }"#,
        )
        .unwrap();

        let request = CreateSessionRequest::from(options);
        assert_eq!(request.entity_id, "42");
        assert_eq!(request.amount, None);
        assert_eq!(request.products.len(), 1);

        let item = LineItem::from(request.products[0].clone());
        assert_eq!(item.quantity, 2.0);
        assert_eq!(item.unit_price, Money::from_cents(1550));
    }

    #[test]
    fn test_process_payment_request_camel_case() {
        let request: ProcessPaymentRequest = serde_json::from_str(
            r#"{ "token": "t", "amount": "20.80", "cardNumber": "4111", "expiry": "12/30", "cvv": "123" }"#,
        )
        .unwrap();

        assert_eq!(request.amount, Some(Money::from_cents(2080)));
        assert_eq!(request.card_number, "4111");
        assert!(request.card_name.is_none());
    }
}
