//! Test doubles for the collaborator ports.

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::{ChargeReceipt, EntityReference, HostedPage, LineItem, Money};
use crate::ports::*;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// 手动推进的时钟
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[derive(Default)]
pub struct FakeCrm {
    pub deals: Mutex<Vec<CrmDeal>>,
    pub contacts: Mutex<Vec<CrmContact>>,
    pub products: Mutex<Vec<LineItem>>,
    pub updates: Mutex<Vec<(EntityReference, Map<String, Value>)>>,
    pub fail_updates: bool,
    pub fail_reads: bool,
}

#[async_trait]
impl CrmPort for FakeCrm {
    async fn get_deal(&self, deal_id: &str) -> DomainResult<Option<CrmDeal>> {
        if self.fail_reads {
            return Err(DomainError::UpstreamFailure("crm down".to_string()));
        }
        Ok(self.deals.lock().unwrap().iter().find(|d| d.id == deal_id).cloned())
    }

    async fn get_contact(&self, contact_id: &str) -> DomainResult<Option<CrmContact>> {
        if self.fail_reads {
            return Err(DomainError::UpstreamFailure("crm down".to_string()));
        }
        Ok(self.contacts.lock().unwrap().iter().find(|c| c.id == contact_id).cloned())
    }

    async fn get_deal_products(&self, _deal_id: &str) -> DomainResult<Vec<LineItem>> {
        if self.fail_reads {
            return Err(DomainError::UpstreamFailure("crm down".to_string()));
        }
        Ok(self.products.lock().unwrap().clone())
    }

    async fn update_entity(
        &self,
        entity: &EntityReference,
        fields: Map<String, Value>,
    ) -> DomainResult<()> {
        if self.fail_updates {
            return Err(DomainError::UpstreamFailure("crm update failed".to_string()));
        }
        self.updates.lock().unwrap().push((entity.clone(), fields));
        Ok(())
    }
}

/// 可配置结果的支付网关
///
/// 交易在首次查询时绑定到最近生成的托管支付页（发票号与金额）。
#[derive(Default)]
pub struct FakeProcessor {
    pub decline: bool,
    pub approve_lookups: bool,
    pub charge_delay: Option<std::time::Duration>,
    pub charges: AtomicUsize,
    pub hosted_pages: AtomicUsize,
    pub last_order: Mutex<Option<ProcessorOrder>>,
    pub transactions: Mutex<HashMap<String, TransactionStatus>>,
}

impl FakeProcessor {
    pub fn approving() -> Self {
        Self {
            approve_lookups: true,
            ..Self::default()
        }
    }

    pub fn charge_count(&self) -> usize {
        self.charges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProcessorPort for FakeProcessor {
    fn name(&self) -> &'static str {
        "FakePay"
    }

    fn environment(&self) -> &'static str {
        "sandbox"
    }

    async fn create_hosted_page(&self, request: HostedPageRequest) -> DomainResult<HostedPageResult> {
        let n = self.hosted_pages.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_order.lock().unwrap() = Some(request.order);
        Ok(HostedPageResult {
            hosted_page: HostedPage {
                post_url: "https://pay.example.com/payment".to_string(),
                form_token: format!("FORM{}", n),
            },
            reference_id: format!("REF{}", n),
            invoice_number: format!("INV{}", n),
        })
    }

    async fn charge(&self, request: ChargeRequest) -> DomainResult<ChargeReceipt> {
        if let Some(delay) = self.charge_delay {
            tokio::time::sleep(delay).await;
        }
        let n = self.charges.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_order.lock().unwrap() = Some(request.order);
        if self.decline {
            return Err(DomainError::UpstreamFailure(
                "This transaction has been declined.".to_string(),
            ));
        }
        Ok(ChargeReceipt {
            transaction_id: format!("TX{}", n),
            auth_code: Some("AUTH01".to_string()),
            reference_id: Some(format!("REF{}", n)),
            invoice_number: Some("EX042XL00TX".to_string()),
            processor: "FakePay".to_string(),
        })
    }

    async fn transaction_status(&self, transaction_id: &str) -> DomainResult<TransactionStatus> {
        let n = self.hosted_pages.load(Ordering::SeqCst);
        let amount = self
            .last_order
            .lock()
            .unwrap()
            .as_ref()
            .map(|order| order.amount)
            .unwrap_or(Money::from_cents(2080));

        let mut transactions = self.transactions.lock().unwrap();
        let status = transactions
            .entry(transaction_id.to_string())
            .or_insert_with(|| TransactionStatus {
                transaction_id: transaction_id.to_string(),
                approved: self.approve_lookups,
                amount: Some(amount),
                auth_code: Some("AUTH01".to_string()),
                invoice_number: (n > 0).then(|| format!("INV{}", n)),
            });
        Ok(status.clone())
    }

    async fn verify_notification(&self, _body: &str, signature: Option<&str>) -> DomainResult<bool> {
        Ok(signature != Some("bad"))
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<(String, EmailTemplate, Value)>>,
    pub fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn templates(&self) -> Vec<EmailTemplate> {
        self.sent.lock().unwrap().iter().map(|(_, t, _)| *t).collect()
    }
}

#[async_trait]
impl MailerPort for RecordingMailer {
    async fn send(&self, to: &str, template: EmailTemplate, data: Value) -> DomainResult<()> {
        if self.fail {
            return Err(DomainError::UpstreamFailure("smtp down".to_string()));
        }
        self.sent.lock().unwrap().push((to.to_string(), template, data));
        Ok(())
    }
}
