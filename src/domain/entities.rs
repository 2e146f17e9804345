use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::{
    EntityReference, FlowKind, HostedPage, LineItem, Money, PayerContact,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 支付会话有效期（小时）
pub const SESSION_TTL_HOURS: i64 = 24;

/// 创建支付会话所需的数据
#[derive(Debug, Clone)]
pub struct NewPaymentSession {
    pub entity: EntityReference,
    pub payer: PayerContact,
    pub requested_amount: Option<Money>,
    pub line_items: Vec<LineItem>,
    pub description: Option<String>,
    pub flow: FlowKind,
}

/// 支付会话实体
///
/// 存储层只对外返回快照，修改快照不会影响已存储的会话。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSession {
    /// 不透明的令牌（主键）
    pub token: String,

    /// 关联的CRM记录
    pub entity: EntityReference,

    /// 付款人
    pub payer: PayerContact,

    /// 建议金额
    pub requested_amount: Option<Money>,

    /// 商品行快照
    pub line_items: Vec<LineItem>,

    /// 订单描述
    pub description: Option<String>,

    /// 发起方式
    pub flow: FlowKind,

    /// 创建时间
    pub created_at: DateTime<Utc>,

    /// 过期时间
    pub expires_at: DateTime<Utc>,

    /// 支付网关流水引用
    pub processor_reference: Option<String>,

    /// 发送给支付网关的发票号，用于核对回跳交易
    pub processor_invoice: Option<String>,

    /// 托管支付页
    pub hosted_page: Option<HostedPage>,

    /// 锁定的扣款金额
    pub final_amount: Option<Money>,

    /// 直接扣款进行中
    pub charge_in_flight: bool,

    /// 是否已完成扣款
    pub consumed: bool,
}

impl PaymentSession {
    /// 创建新的支付会话
    pub fn new(token: String, request: NewPaymentSession, now: DateTime<Utc>) -> DomainResult<Self> {
        if request.entity.id.trim().is_empty() {
            return Err(DomainError::InvalidRequest(
                "Entity reference id must not be empty".to_string(),
            ));
        }

        Ok(Self {
            token,
            entity: request.entity,
            payer: request.payer,
            requested_amount: request.requested_amount,
            line_items: request.line_items,
            description: request.description,
            flow: request.flow,
            created_at: now,
            expires_at: now + Duration::hours(SESSION_TTL_HOURS),
            processor_reference: None,
            processor_invoice: None,
            hosted_page: None,
            final_amount: None,
            charge_in_flight: false,
            consumed: false,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// 记录支付网关引用，可重复调用（以最后一次为准）
    pub fn attach_processor_reference(
        &mut self,
        reference: String,
        invoice_number: Option<String>,
        final_amount: Money,
        hosted_page: Option<HostedPage>,
    ) {
        self.processor_reference = Some(reference);
        self.processor_invoice = invoice_number;
        self.final_amount = Some(final_amount);
        self.hosted_page = hosted_page;
    }

    /// 标记直接扣款开始
    pub fn begin_charge(&mut self) -> DomainResult<()> {
        if self.consumed {
            return Err(DomainError::AlreadyConsumed);
        }
        if self.charge_in_flight {
            return Err(DomainError::ChargeInProgress);
        }

        self.charge_in_flight = true;
        Ok(())
    }

    pub fn release_charge(&mut self) {
        self.charge_in_flight = false;
    }

    /// 标记为已完成扣款
    pub fn mark_as_consumed(&mut self) -> DomainResult<()> {
        if self.consumed {
            return Err(DomainError::AlreadyConsumed);
        }

        self.consumed = true;
        self.charge_in_flight = false;
        Ok(())
    }

    /// 实际扣款金额：锁定金额优先，其次建议金额
    pub fn effective_amount(&self) -> Option<Money> {
        self.final_amount.or(self.requested_amount)
    }

    /// 付款人是否可以修改金额
    pub fn amount_is_editable(&self) -> bool {
        match self.flow {
            FlowKind::DirectLink => true,
            FlowKind::Email => self.requested_amount.is_none(),
            FlowKind::WebDirect => false,
        }
    }

    /// 日志中使用的令牌前缀
    pub fn token_prefix(&self) -> &str {
        token_prefix(&self.token)
    }
}

/// 已完成会话留下的记录
///
/// 会话内容在完成后删除，只保留令牌和交易号，直到原定过期时间后被清理。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// 完成该会话的网关交易号
    pub transaction_id: Option<String>,
}

impl ConsumedToken {
    pub fn from_session(session: &PaymentSession, transaction_id: Option<&str>) -> Self {
        Self {
            token: session.token.clone(),
            expires_at: session.expires_at,
            transaction_id: transaction_id.map(str::to_string),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// 令牌只记录前10个字符
pub fn token_prefix(token: &str) -> &str {
    token.get(..10).unwrap_or(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_request(entity_id: &str) -> NewPaymentSession {
        NewPaymentSession {
            entity: EntityReference::deal(entity_id),
            payer: PayerContact::new("Ana Lopez", "ana@example.com"),
            requested_amount: Some(Money::from_cents(2080)),
            line_items: Vec::new(),
            description: None,
            flow: FlowKind::DirectLink,
        }
    }

    #[test]
    fn test_create_payment_session() {
        let now = Utc::now();
        let session = PaymentSession::new("tok".to_string(), new_request("42"), now).unwrap();

        assert_eq!(session.expires_at - session.created_at, Duration::hours(24));
        assert!(!session.consumed);
        assert!(!session.is_expired(now));
        assert!(session.is_expired(now + Duration::hours(24)));
        assert!(session.processor_reference.is_none());
    }

    #[test]
    fn test_empty_entity_id_is_rejected() {
        let result = PaymentSession::new("tok".to_string(), new_request("  "), Utc::now());
        assert!(matches!(result, Err(DomainError::InvalidRequest(_))));
    }

    #[test]
    fn test_consume_only_once() {
        let mut session = PaymentSession::new("tok".to_string(), new_request("42"), Utc::now()).unwrap();

        session.mark_as_consumed().unwrap();
        assert!(matches!(
            session.mark_as_consumed(),
            Err(DomainError::AlreadyConsumed)
        ));
    }

    #[test]
    fn test_begin_charge_guards_concurrent_attempts() {
        let mut session = PaymentSession::new("tok".to_string(), new_request("42"), Utc::now()).unwrap();

        session.begin_charge().unwrap();
        assert!(matches!(
            session.begin_charge(),
            Err(DomainError::ChargeInProgress)
        ));
        session.release_charge();
        assert!(session.begin_charge().is_ok());
    }

    #[test]
    fn test_effective_amount_prefers_final_amount() {
        let mut session = PaymentSession::new("tok".to_string(), new_request("42"), Utc::now()).unwrap();
        assert_eq!(session.effective_amount(), Some(Money::from_cents(2080)));

        session.attach_processor_reference(
            "REF1".to_string(),
            Some("EX042XL07TX".to_string()),
            Money::from_cents(5000),
            None,
        );
        assert_eq!(session.effective_amount(), Some(Money::from_cents(5000)));
    }

    #[test]
    fn test_amount_editability_by_flow() {
        let mut request = new_request("42");
        request.flow = FlowKind::Email;
        let fixed = PaymentSession::new("a".to_string(), request.clone(), Utc::now()).unwrap();
        assert!(!fixed.amount_is_editable());

        request.requested_amount = None;
        let open = PaymentSession::new("b".to_string(), request, Utc::now()).unwrap();
        assert!(open.amount_is_editable());
    }

    #[test]
    fn test_token_prefix() {
        assert_eq!(token_prefix("abcdefghijklmnop"), "abcdefghij");
        assert_eq!(token_prefix("short"), "short");
    }
}
