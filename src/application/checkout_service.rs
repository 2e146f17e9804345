use crate::application::dto::*;
use crate::application::session_service::PaymentSessionService;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::products_summary;
use crate::domain::{
    token_prefix, ChargeReceipt, DomainEvent, EntityKind, EntityReference, FlowKind, LineItem,
    Money, NewPaymentSession, PayerContact, PaymentCompleted, PaymentSession,
};
use crate::ports::{
    CardDetails, ChargeRequest, Clock, CrmContact, CrmPort, EmailTemplate, HostedPageRequest,
    MailerPort, PaymentProcessorPort, ProcessorOrder, TransactionStatus,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 结账流程配置
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// 服务对外地址
    pub base_url: String,
    /// 默认金额
    pub default_amount: Money,
    /// 网站直接付款的通用邮箱
    pub web_payer_email: String,
}

/// 结账服务：编排会话存储、CRM、支付网关和邮件
pub struct CheckoutService {
    sessions: Arc<PaymentSessionService>,
    crm: Arc<dyn CrmPort>,
    processor: Arc<dyn PaymentProcessorPort>,
    mailer: Arc<dyn MailerPort>,
    clock: Arc<dyn Clock>,
    settings: CheckoutSettings,
}

impl CheckoutService {
    pub fn new(
        sessions: Arc<PaymentSessionService>,
        crm: Arc<dyn CrmPort>,
        processor: Arc<dyn PaymentProcessorPort>,
        mailer: Arc<dyn MailerPort>,
        clock: Arc<dyn Clock>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            sessions,
            crm,
            processor,
            mailer,
            clock,
            settings,
        }
    }

    pub fn sessions(&self) -> &PaymentSessionService {
        &self.sessions
    }

    pub fn processor_name(&self) -> &'static str {
        self.processor.name()
    }

    pub fn processor_environment(&self) -> &'static str {
        self.processor.environment()
    }

    pub fn base_url(&self) -> &str {
        &self.settings.base_url
    }

    fn payment_link(&self, token: &str) -> String {
        format!("{}/payment/{}", self.settings.base_url, token)
    }

    /// CRM挂件创建付款链接（付款人可修改金额）
    pub async fn create_link_session(
        &self,
        request: CreateSessionRequest,
    ) -> DomainResult<CreateSessionResponse> {
        let entity_id = request.entity_id.trim().to_string();
        if entity_id.is_empty() {
            return Err(DomainError::InvalidRequest("Entity ID not found".to_string()));
        }

        let kind = EntityKind::from_crm(request.entity_type.as_deref().unwrap_or("deal"));
        let entity = EntityReference::new(kind, entity_id);
        info!("Creating payment link for {}", entity);

        let mut payer = PayerContact::new(
            request.contact_name.unwrap_or_default(),
            request.contact_email.unwrap_or_default(),
        );
        if payer.email.trim().is_empty() {
            if let Some(contact) = self.lookup_contact(&entity).await {
                if payer.name.trim().is_empty() {
                    payer.name = contact.name;
                }
                payer.email = contact.email.unwrap_or_default();
            }
        }

        let requested_amount = match request.amount {
            Some(amount) => Some(amount),
            None => self.lookup_deal_amount(&entity).await,
        };

        let session = self
            .sessions
            .create(NewPaymentSession {
                entity,
                payer,
                requested_amount,
                line_items: request.products.into_iter().map(LineItem::from).collect(),
                description: request.description,
                flow: FlowKind::DirectLink,
            })
            .await?;

        Ok(CreateSessionResponse {
            success: true,
            payment_link: self.payment_link(&session.token),
            entity_id: session.entity.id.clone(),
            entity_type: session.entity.kind.to_string(),
            contact_email: session.payer.email.clone(),
            products_count: session.line_items.len(),
            flow_type: session.flow.to_string(),
            expires_at: session.expires_at,
            message: "Payment link generated successfully - Client can modify amount".to_string(),
            token: session.token,
        })
    }

    /// 创建邮件付款会话并发送付款链接
    pub async fn send_payment_email(
        &self,
        request: SendPaymentEmailRequest,
    ) -> DomainResult<SendPaymentEmailResponse> {
        let entity_id = request.entity_id.trim().to_string();
        let client_email = request.client_email.trim().to_string();
        if entity_id.is_empty() || client_email.is_empty() {
            return Err(DomainError::InvalidRequest(
                "Incomplete data to send email".to_string(),
            ));
        }

        let kind = EntityKind::from_crm(request.entity_type.as_deref().unwrap_or("deal"));
        let entity = EntityReference::new(kind, entity_id);

        let mut line_items: Vec<LineItem> =
            request.products.into_iter().map(LineItem::from).collect();
        if line_items.is_empty() && kind == EntityKind::Deal {
            line_items = self.crm.get_deal_products(&entity.id).await.unwrap_or_else(|e| {
                warn!("Could not load products for {}: {}", entity, e);
                Vec::new()
            });
        }

        let requested_amount = match request.amount {
            Some(amount) => Some(amount),
            None => self.lookup_deal_amount(&entity).await,
        };

        let client_name = request
            .client_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| "Customer".to_string());

        let session = self
            .sessions
            .create(NewPaymentSession {
                entity,
                payer: PayerContact::new(client_name, client_email),
                requested_amount,
                line_items,
                description: None,
                flow: FlowKind::Email,
            })
            .await?;

        let items: Vec<_> = session
            .line_items
            .iter()
            .map(|item| {
                json!({
                    "name": item.name,
                    "quantity": item.quantity,
                    "unit_price": item.unit_price.to_string(),
                })
            })
            .collect();
        let data = json!({
            "client_name": session.payer.name,
            "payment_link": self.payment_link(&session.token),
            "amount": session.requested_amount.map(|amount| amount.to_string()),
            "products_summary": products_summary(&session.line_items),
            "products": items,
            "expires_at": session.expires_at.to_rfc3339(),
        });

        self.mailer
            .send(&session.payer.email, EmailTemplate::PaymentLink, data)
            .await
            .map_err(|e| {
                error!("Payment link email failed for {}: {}", session.entity, e);
                DomainError::UpstreamFailure(format!("Error sending email: {}", e))
            })?;

        info!("Payment link emailed for {}", session.entity);
        Ok(SendPaymentEmailResponse {
            success: true,
            message: "Email sent successfully".to_string(),
            client_email: session.payer.email.clone(),
            client_name: session.payer.name.clone(),
            entity_id: session.entity.id.clone(),
            amount: session.requested_amount,
            products_count: session.line_items.len(),
            flow_type: session.flow.to_string(),
        })
    }

    /// 网站直接付款：创建会话并立即生成托管支付页，返回会话令牌
    pub async fn start_web_payment(&self, query: DirectPaymentQuery) -> DomainResult<String> {
        let amount = Money::parse_optional(query.amount.as_deref())
            .ok()
            .flatten()
            .filter(Money::is_positive)
            .unwrap_or(self.settings.default_amount);
        let name = query
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| "Web Customer".to_string());
        let reference = query
            .reference
            .filter(|reference| !reference.trim().is_empty())
            .unwrap_or_else(|| "WEB_PAYMENT".to_string());

        let session = self
            .sessions
            .create(NewPaymentSession {
                entity: EntityReference::new(EntityKind::Web, reference),
                payer: PayerContact::new(name, self.settings.web_payer_email.clone()),
                requested_amount: Some(amount),
                line_items: Vec::new(),
                description: query.description.filter(|d| !d.trim().is_empty()),
                flow: FlowKind::WebDirect,
            })
            .await?;

        let hosted = self
            .processor
            .create_hosted_page(HostedPageRequest {
                order: order_for(&session, amount),
                session_token: session.token.clone(),
            })
            .await?;

        self.sessions
            .attach_processor_reference(
                &session.token,
                hosted.reference_id,
                Some(hosted.invoice_number),
                amount,
                Some(hosted.hosted_page),
            )
            .await?;

        Ok(session.token)
    }

    /// 付款人打开付款链接
    pub async fn view_session(&self, token: &str) -> DomainResult<PaymentPage> {
        let session = self.sessions.resolve(token).await?;

        if session.flow == FlowKind::WebDirect {
            if let Some(hosted_page) = session.hosted_page.clone() {
                return Ok(PaymentPage::AutoRedirect { hosted_page });
            }
        }

        info!(
            "Token valid for {} ({}) - products: {}",
            session.payer.name,
            session.entity,
            session.line_items.len()
        );

        Ok(PaymentPage::Form(PaymentForm {
            amount: session
                .effective_amount()
                .unwrap_or(self.settings.default_amount),
            amount_editable: session.amount_is_editable(),
            products_summary: products_summary(&session.line_items),
            payer_name: session.payer.name.clone(),
            line_items: session.line_items,
            token: session.token,
        }))
    }

    /// 生成托管支付页并记录网关引用
    pub async fn prepare_hosted_payment(
        &self,
        request: HostedPaymentRequest,
    ) -> DomainResult<HostedPaymentResponse> {
        if request.token.trim().is_empty() {
            return Err(DomainError::InvalidRequest("Token not provided".to_string()));
        }

        let session = self.sessions.resolve(&request.token).await?;
        let amount = charge_amount(&session, request.amount)?;

        let hosted = self
            .processor
            .create_hosted_page(HostedPageRequest {
                order: order_for(&session, amount),
                session_token: session.token.clone(),
            })
            .await?;

        let session = self
            .sessions
            .attach_processor_reference(
                &request.token,
                hosted.reference_id.clone(),
                Some(hosted.invoice_number.clone()),
                amount,
                Some(hosted.hosted_page.clone()),
            )
            .await?;

        Ok(HostedPaymentResponse {
            success: true,
            post_url: hosted.hosted_page.post_url,
            token: hosted.hosted_page.form_token,
            reference_id: hosted.reference_id,
            amount,
            flow_type: session.flow.to_string(),
            message: "Payment link generated successfully".to_string(),
        })
    }

    /// 直接扣款：同一令牌最多成功扣款一次
    ///
    /// 扣款在独立任务中完成，客户端断开时任务仍会消费会话或释放令牌。
    pub async fn charge_card(
        self: &Arc<Self>,
        request: ProcessPaymentRequest,
    ) -> DomainResult<PaymentResultResponse> {
        if request.token.trim().is_empty() {
            return Err(DomainError::InvalidRequest("Token not provided".to_string()));
        }
        if request.card_number.trim().is_empty()
            || request.expiry.trim().is_empty()
            || request.cvv.trim().is_empty()
        {
            return Err(DomainError::InvalidRequest(
                "Card number, expiry and CVV are required".to_string(),
            ));
        }

        let session = self.sessions.begin_charge(&request.token).await?;
        let card = CardDetails {
            number: request.card_number,
            expiry: request.expiry,
            cvv: request.cvv,
            name_on_card: request.card_name,
        };

        let service = Arc::clone(self);
        let requested = request.amount;
        tokio::spawn(async move { service.settle_charge(session, requested, card).await })
            .await
            .map_err(|e| DomainError::InternalError(format!("Charge task failed: {}", e)))?
    }

    async fn settle_charge(
        &self,
        session: PaymentSession,
        requested: Option<Money>,
        card: CardDetails,
    ) -> DomainResult<PaymentResultResponse> {
        let token = session.token.clone();
        let amount = match charge_amount(&session, requested) {
            Ok(amount) => amount,
            Err(e) => {
                self.release(&token).await;
                return Err(e);
            }
        };

        info!(
            "Processing charge for {} amount={} token={}",
            session.entity,
            amount,
            token_prefix(&token)
        );

        let charge = self
            .processor
            .charge(ChargeRequest {
                order: order_for(&session, amount),
                card,
            })
            .await;

        let receipt = match charge {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!("Charge failed for {}: {}", session.entity, e);
                self.release(&token).await;
                return Err(match e {
                    DomainError::HttpError(http) => DomainError::UpstreamFailure(http.to_string()),
                    other => other,
                });
            }
        };

        // 网关已确认扣款，会话状态异常时仍以扣款结果为准
        let consumed = match self
            .sessions
            .consume_with_transaction(&token, &receipt.transaction_id)
            .await
        {
            Ok(consumed) => consumed,
            Err(e) => {
                error!(
                    "Charge {} succeeded but session could not be consumed: {}",
                    receipt.transaction_id, e
                );
                session
            }
        };

        self.finish(consumed, amount, receipt).await
    }

    /// 托管支付页回跳：交易必须属于该会话生成的托管支付页
    pub async fn complete_hosted_payment(
        &self,
        token: &str,
        transaction_id: &str,
    ) -> DomainResult<PaymentResultResponse> {
        if transaction_id.trim().is_empty() {
            return Err(DomainError::InvalidRequest(
                "Missing transaction ID".to_string(),
            ));
        }

        let session = self.sessions.resolve_pending(token).await?;
        if session.processor_reference.is_none() {
            return Err(DomainError::InvalidRequest(
                "No hosted payment was prepared for this payment link".to_string(),
            ));
        }

        let status = self.processor.transaction_status(transaction_id).await?;
        if !status.approved {
            warn!("Transaction {} was not approved", transaction_id);
            return Err(DomainError::UpstreamFailure(
                "Transaction was not approved".to_string(),
            ));
        }
        verify_transaction(&session, &status)?;

        let session = self
            .sessions
            .consume_with_transaction(token, &status.transaction_id)
            .await?;
        let amount = status
            .amount
            .or(session.effective_amount())
            .unwrap_or(self.settings.default_amount);

        let receipt = ChargeReceipt {
            transaction_id: status.transaction_id,
            auth_code: status.auth_code,
            reference_id: session.processor_reference.clone(),
            invoice_number: status.invoice_number,
            processor: self.processor.name().to_string(),
        };

        self.finish(session, amount, receipt).await
    }

    /// 处理支付网关Webhook通知（仅校验并记录）
    pub async fn handle_processor_notification(
        &self,
        body: &str,
        signature: Option<&str>,
    ) -> DomainResult<()> {
        if !self.processor.verify_notification(body, signature).await? {
            return Err(DomainError::InvalidRequest(
                "Invalid notification signature".to_string(),
            ));
        }

        let notification: serde_json::Value = serde_json::from_str(body)?;
        let event_type = notification["eventType"].as_str().unwrap_or("unknown");
        let payload = &notification["payload"];

        info!(
            "Processor notification: event={} transaction={} response_code={} invoice={}",
            event_type,
            payload["id"],
            payload["responseCode"],
            payload["invoiceNumber"]
        );
        Ok(())
    }

    async fn finish(
        &self,
        session: PaymentSession,
        amount: Money,
        receipt: ChargeReceipt,
    ) -> DomainResult<PaymentResultResponse> {
        let event = PaymentCompleted::new(&session, amount, receipt, self.clock.now());
        self.notify_completion(&event).await;

        Ok(PaymentResultResponse {
            success: true,
            message: "Payment processed successfully".to_string(),
            transaction_id: event.receipt.transaction_id.clone(),
            auth_code: event.receipt.auth_code.clone(),
            reference_id: event.receipt.reference_id.clone(),
            invoice_number: event.receipt.invoice_number.clone(),
            amount,
            client_email: event.payer.email.clone(),
        })
    }

    /// 付款完成后的邮件与CRM回写，失败只记录日志
    async fn notify_completion(&self, event: &PaymentCompleted) {
        info!(
            "{}: {} amount={} transaction={}",
            event.event_type(),
            event.entity,
            event.amount,
            event.receipt.transaction_id
        );

        let email = async {
            if event.payer.email.trim().is_empty() {
                debug!("No payer email, confirmation skipped");
                return;
            }
            if let Err(e) = self
                .mailer
                .send(
                    &event.payer.email,
                    EmailTemplate::PaymentConfirmation,
                    event.confirmation_email_data(),
                )
                .await
            {
                warn!("Confirmation email failed for {}: {}", event.entity, e);
            }
        };

        let crm = async {
            if !event.entity.is_crm_record() {
                return;
            }
            match self
                .crm
                .update_entity(&event.entity, event.crm_status_fields())
                .await
            {
                Ok(()) => info!("CRM updated for {}", event.entity),
                Err(e) => warn!("CRM write-back failed for {}: {}", event.entity, e),
            }
        };

        tokio::join!(email, crm);
    }

    async fn release(&self, token: &str) {
        if let Err(e) = self.sessions.release_charge(token).await {
            error!("Could not release charge for {}: {}", token_prefix(token), e);
        }
    }

    async fn lookup_contact(&self, entity: &EntityReference) -> Option<CrmContact> {
        let result = match entity.kind {
            EntityKind::Deal => self.crm.get_contact_for_deal(&entity.id).await,
            EntityKind::Contact => self.crm.get_contact(&entity.id).await,
            EntityKind::Web => return None,
        };

        result.unwrap_or_else(|e| {
            warn!("Contact lookup failed for {}: {}", entity, e);
            None
        })
    }

    async fn lookup_deal_amount(&self, entity: &EntityReference) -> Option<Money> {
        if entity.kind != EntityKind::Deal {
            return None;
        }

        match self.crm.get_deal(&entity.id).await {
            Ok(deal) => deal.and_then(|deal| deal.amount).filter(Money::is_positive),
            Err(e) => {
                warn!("Deal lookup failed for {}: {}", entity, e);
                None
            }
        }
    }
}

/// 确定扣款金额：固定金额的链接不接受其他金额
fn charge_amount(session: &PaymentSession, requested: Option<Money>) -> DomainResult<Money> {
    let invalid = || DomainError::InvalidRequest("Invalid amount. Must be greater than 0".to_string());

    if !session.amount_is_editable() {
        let fixed = session.effective_amount().ok_or_else(invalid)?;
        return match requested {
            Some(amount) if amount != fixed => Err(DomainError::InvalidRequest(format!(
                "Amount is fixed at {} for this payment link",
                fixed
            ))),
            _ => Ok(fixed),
        };
    }

    requested.filter(Money::is_positive).ok_or_else(invalid)
}

/// 核对网关交易与会话的发票号和金额
fn verify_transaction(session: &PaymentSession, status: &TransactionStatus) -> DomainResult<()> {
    let invoice_matches = match session.processor_invoice.as_deref() {
        Some(expected) => status.invoice_number.as_deref() == Some(expected),
        None => false,
    };
    let amount_matches = match (session.final_amount, status.amount) {
        (Some(expected), Some(charged)) => expected == charged,
        _ => true,
    };

    if !invoice_matches || !amount_matches {
        warn!(
            "Transaction {} does not match session {} (invoice={:?} amount={:?})",
            status.transaction_id,
            session.token_prefix(),
            status.invoice_number,
            status.amount
        );
        return Err(DomainError::InvalidRequest(
            "Transaction does not belong to this payment link".to_string(),
        ));
    }

    Ok(())
}

fn order_for(session: &PaymentSession, amount: Money) -> ProcessorOrder {
    ProcessorOrder {
        entity: session.entity.clone(),
        payer: session.payer.clone(),
        amount,
        line_items: session.line_items.clone(),
        description: session.description.clone(),
        flow: session.flow,
    }
}
