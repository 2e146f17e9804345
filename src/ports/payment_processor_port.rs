use crate::domain::errors::DomainResult;
use crate::domain::{ChargeReceipt, EntityReference, FlowKind, HostedPage, LineItem, Money, PayerContact};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 发送给支付网关的订单信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorOrder {
    pub entity: EntityReference,
    pub payer: PayerContact,
    pub amount: Money,
    pub line_items: Vec<LineItem>,
    pub description: Option<String>,
    pub flow: FlowKind,
}

/// 托管支付页请求
#[derive(Debug, Clone)]
pub struct HostedPageRequest {
    pub order: ProcessorOrder,
    /// 支付完成后回跳时携带的会话令牌
    pub session_token: String,
}

/// 托管支付页结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedPageResult {
    pub hosted_page: HostedPage,
    pub reference_id: String,
    pub invoice_number: String,
}

/// 银行卡信息（不落盘，不记录日志）
#[derive(Clone, Deserialize)]
pub struct CardDetails {
    pub number: String,
    /// MM/YY 或 YYYY-MM
    pub expiry: String,
    pub cvv: String,
    pub name_on_card: Option<String>,
}

impl CardDetails {
    pub fn last_four(&self) -> &str {
        let digits = self.number.trim();
        digits.get(digits.len().saturating_sub(4)..).unwrap_or("")
    }
}

impl fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardDetails")
            .field("number", &format_args!("****{}", self.last_four()))
            .field("expiry", &"**/**")
            .field("cvv", &"***")
            .field("name_on_card", &self.name_on_card)
            .finish()
    }
}

/// 直接扣款请求
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub order: ProcessorOrder,
    pub card: CardDetails,
}

/// 交易状态查询结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionStatus {
    pub transaction_id: String,
    pub approved: bool,
    pub amount: Option<Money>,
    pub auth_code: Option<String>,
    pub invoice_number: Option<String>,
}

/// 支付网关端口接口
#[async_trait]
pub trait PaymentProcessorPort: Send + Sync {
    /// 网关名称（回写到CRM）
    fn name(&self) -> &'static str;

    /// 运行环境（sandbox / production）
    fn environment(&self) -> &'static str;

    /// 创建托管支付页
    async fn create_hosted_page(&self, request: HostedPageRequest) -> DomainResult<HostedPageResult>;

    /// 直接扣款，拒付时返回 `UpstreamFailure`
    async fn charge(&self, request: ChargeRequest) -> DomainResult<ChargeReceipt>;

    /// 查询交易状态
    async fn transaction_status(&self, transaction_id: &str) -> DomainResult<TransactionStatus>;

    /// 验证回调通知签名
    async fn verify_notification(&self, body: &str, signature: Option<&str>) -> DomainResult<bool>;
}
