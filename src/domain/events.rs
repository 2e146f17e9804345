use crate::domain::entities::PaymentSession;
use crate::domain::value_objects::{
    products_summary, EntityReference, FlowKind, Money, PayerContact,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// 领域事件trait
pub trait DomainEvent {
    fn event_type(&self) -> &'static str;
    fn occurred_at(&self) -> DateTime<Utc>;
}

/// 支付会话创建事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSessionCreated {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub entity: EntityReference,
    pub flow: FlowKind,
    pub products_count: usize,
    pub expires_at: DateTime<Utc>,
}

impl DomainEvent for PaymentSessionCreated {
    fn event_type(&self) -> &'static str {
        "PaymentSessionCreated"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

impl PaymentSessionCreated {
    pub fn from_session(session: &PaymentSession) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: session.created_at,
            entity: session.entity.clone(),
            flow: session.flow,
            products_count: session.line_items.len(),
            expires_at: session.expires_at,
        }
    }
}

/// 支付网关确认的交易信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeReceipt {
    pub transaction_id: String,
    pub auth_code: Option<String>,
    pub reference_id: Option<String>,
    pub invoice_number: Option<String>,
    pub processor: String,
}

/// 支付完成事件（会话已被消费）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCompleted {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub entity: EntityReference,
    pub payer: PayerContact,
    pub amount: Money,
    pub flow: FlowKind,
    pub products_count: usize,
    pub products_summary: String,
    pub receipt: ChargeReceipt,
}

impl DomainEvent for PaymentCompleted {
    fn event_type(&self) -> &'static str {
        "PaymentCompleted"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

impl PaymentCompleted {
    pub fn new(
        session: &PaymentSession,
        amount: Money,
        receipt: ChargeReceipt,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at,
            entity: session.entity.clone(),
            payer: session.payer.clone(),
            amount,
            flow: session.flow,
            products_count: session.line_items.len(),
            products_summary: products_summary(&session.line_items),
            receipt,
        }
    }

    /// 回写到CRM交易的付款状态字段
    pub fn crm_status_fields(&self) -> Map<String, Value> {
        let fields = json!({
            "UF_CRM_PAYMENT_STATUS": "completed",
            "UF_CRM_PAYMENT_AMOUNT": self.amount.to_string(),
            "UF_CRM_PAYMENT_DATE": self.occurred_at.to_rfc3339(),
            "UF_CRM_TRANSACTION_ID": self.receipt.transaction_id,
            "UF_CRM_AUTH_CODE": self.receipt.auth_code,
            "UF_CRM_REFERENCE_ID": self.receipt.reference_id,
            "UF_CRM_PAYMENT_PROCESSOR": self.receipt.processor,
            "UF_CRM_INVOICE_NUMBER": self.receipt.invoice_number,
            "UF_CRM_PAYMENT_FLOW": self.flow.to_string(),
            "UF_CRM_PRODUCTS_COUNT": self.products_count,
        });

        match fields {
            Value::Object(map) => map
                .into_iter()
                .filter(|(_, value)| !value.is_null())
                .collect(),
            _ => Map::new(),
        }
    }

    /// 确认邮件模板数据
    pub fn confirmation_email_data(&self) -> Value {
        json!({
            "client_name": self.payer.name,
            "amount": self.amount.to_string(),
            "transaction_id": self.receipt.transaction_id,
            "auth_code": self.receipt.auth_code,
            "invoice_number": self.receipt.invoice_number.as_deref().unwrap_or("N/A"),
            "products_summary": self.products_summary,
            "entity": self.entity.to_string(),
            "date": self.occurred_at.format("%Y-%m-%d").to_string(),
            "time": self.occurred_at.format("%H:%M:%S UTC").to_string(),
        })
    }
}
