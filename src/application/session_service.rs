use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::{
    ConsumedToken, DomainEvent, HostedPage, Money, NewPaymentSession, PaymentSession,
    PaymentSessionCreated, token_prefix,
};
use crate::ports::{Clock, SessionStorePort};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// 令牌随机字节数（256位）
const TOKEN_BYTES: usize = 32;

/// 生成不可猜测的会话令牌
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// 支付会话服务
///
/// 所有"检查后修改"的操作都在同一把锁内完成，锁内只访问会话存储，
/// 不调用CRM、支付网关或邮件服务。
pub struct PaymentSessionService {
    store: Arc<dyn SessionStorePort>,
    clock: Arc<dyn Clock>,
    lock: Mutex<()>,
}

impl PaymentSessionService {
    pub fn new(store: Arc<dyn SessionStorePort>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            lock: Mutex::new(()),
        }
    }

    /// 创建支付会话
    pub async fn create(&self, request: NewPaymentSession) -> DomainResult<PaymentSession> {
        let now = self.clock.now();
        let _guard = self.lock.lock().await;

        let mut token = generate_token();
        while self.store.get(&token).await?.is_some() {
            warn!("Session token collision, regenerating");
            token = generate_token();
        }

        let session = PaymentSession::new(token, request, now)?;
        self.store.set(session.clone()).await?;

        let event = PaymentSessionCreated::from_session(&session);
        info!(
            event = event.event_type(),
            token = session.token_prefix(),
            entity = %event.entity,
            flow = %event.flow,
            products = event.products_count,
            "Payment session created"
        );

        Ok(session)
    }

    /// 查询支付会话（只读），已完成的令牌与未知令牌一样返回 `NotFound`
    pub async fn resolve(&self, token: &str) -> DomainResult<PaymentSession> {
        match self.resolve_pending(token).await {
            Err(DomainError::AlreadyConsumed) => Err(DomainError::NotFound),
            other => other,
        }
    }

    /// 查询尚未完成的会话，已完成的令牌返回 `AlreadyConsumed`
    pub async fn resolve_pending(&self, token: &str) -> DomainResult<PaymentSession> {
        let now = self.clock.now();
        let _guard = self.lock.lock().await;

        let session = self.load_live(token, now).await?;
        debug!(token = token_prefix(token), "Payment session resolved");
        Ok(session)
    }

    /// 记录支付网关引用和锁定金额，重复调用时以最后一次为准
    pub async fn attach_processor_reference(
        &self,
        token: &str,
        reference: String,
        invoice_number: Option<String>,
        final_amount: Money,
        hosted_page: Option<HostedPage>,
    ) -> DomainResult<PaymentSession> {
        let now = self.clock.now();
        let _guard = self.lock.lock().await;

        let mut session = self.load_live(token, now).await?;
        session.attach_processor_reference(reference, invoice_number, final_amount, hosted_page);
        self.store.set(session.clone()).await?;

        info!(
            token = token_prefix(token),
            reference = session.processor_reference.as_deref().unwrap_or_default(),
            amount = %final_amount,
            "Processor reference attached"
        );
        Ok(session)
    }

    /// 标记直接扣款开始，防止同一令牌并发扣款
    pub async fn begin_charge(&self, token: &str) -> DomainResult<PaymentSession> {
        let now = self.clock.now();
        let _guard = self.lock.lock().await;

        let mut session = self.load_live(token, now).await?;
        session.begin_charge()?;
        self.store.set(session.clone()).await?;

        debug!(token = token_prefix(token), "Charge started");
        Ok(session)
    }

    /// 扣款失败后释放令牌，允许付款人重试
    pub async fn release_charge(&self, token: &str) -> DomainResult<()> {
        let _guard = self.lock.lock().await;

        if let Some(mut session) = self.store.get(token).await? {
            session.release_charge();
            self.store.set(session).await?;
            debug!(token = token_prefix(token), "Charge released");
        }

        Ok(())
    }

    /// 消费支付会话：标记完成、返回快照并删除，令牌留下完成记录
    pub async fn consume(&self, token: &str) -> DomainResult<PaymentSession> {
        let now = self.clock.now();
        let _guard = self.lock.lock().await;

        self.consume_locked(token, None, now).await
    }

    /// 用网关交易消费会话，同一交易只能完成一个会话
    pub async fn consume_with_transaction(
        &self,
        token: &str,
        transaction_id: &str,
    ) -> DomainResult<PaymentSession> {
        let now = self.clock.now();
        let _guard = self.lock.lock().await;

        if self.store.transaction_consumed(transaction_id).await? {
            self.load_live(token, now).await?;
            warn!(
                token = token_prefix(token),
                transaction = transaction_id,
                "Transaction already completed another payment session"
            );
            return Err(DomainError::InvalidRequest(
                "Transaction already completed another payment".to_string(),
            ));
        }

        self.consume_locked(token, Some(transaction_id), now).await
    }

    async fn consume_locked(
        &self,
        token: &str,
        transaction_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> DomainResult<PaymentSession> {
        let mut session = self.load_live(token, now).await?;
        session.mark_as_consumed()?;
        self.store
            .set_consumed(ConsumedToken::from_session(&session, transaction_id))
            .await?;
        self.store.delete(token).await?;

        info!(
            token = token_prefix(token),
            entity = %session.entity,
            transaction = transaction_id.unwrap_or_default(),
            "Payment session consumed"
        );
        Ok(session)
    }

    /// 清理所有过期会话
    pub async fn sweep_expired(&self) -> DomainResult<usize> {
        let now = self.clock.now();
        let _guard = self.lock.lock().await;

        let removed = self.store.delete_expired(now).await?;
        if removed > 0 {
            info!(removed, "Expired payment sessions swept");
        }
        Ok(removed)
    }

    /// 当前存活的会话数量
    pub async fn active_sessions(&self) -> DomainResult<usize> {
        self.store.len().await
    }

    /// 读取会话，过期则删除（调用方必须持有锁）
    async fn load_live(&self, token: &str, now: DateTime<Utc>) -> DomainResult<PaymentSession> {
        let Some(session) = self.store.get(token).await? else {
            return match self.store.get_consumed(token).await? {
                Some(_) => Err(DomainError::AlreadyConsumed),
                None => Err(DomainError::NotFound),
            };
        };

        if session.is_expired(now) {
            self.store.delete(token).await?;
            info!(token = token_prefix(token), "Payment session expired");
            return Err(DomainError::Expired);
        }

        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EntityKind, EntityReference, FlowKind, PayerContact};
    use crate::infrastructure::adapters::InMemorySessionStore;
    use crate::test_support::ManualClock;
    use chrono::Duration;

    fn service() -> (Arc<PaymentSessionService>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let service = PaymentSessionService::new(Arc::new(InMemorySessionStore::new()), clock.clone());
        (Arc::new(service), clock)
    }

    fn deal_request(id: &str, amount: &str) -> NewPaymentSession {
        NewPaymentSession {
            entity: EntityReference::deal(id),
            payer: PayerContact::new("Ana Lopez", "ana@example.com"),
            requested_amount: Some(amount.parse().unwrap()),
            line_items: Vec::new(),
            description: None,
            flow: FlowKind::DirectLink,
        }
    }

    #[test]
    fn test_generated_tokens_are_256_bit_hex() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let (service, _) = service();

        let created = service.create(deal_request("42", "20.80")).await.unwrap();
        let resolved = service.resolve(&created.token).await.unwrap();
        assert_eq!(resolved.entity.kind, EntityKind::Deal);
        assert_eq!(resolved.requested_amount.unwrap().to_string(), "20.80");

        service
            .attach_processor_reference(&created.token, "REF123".to_string(), None, "20.80".parse().unwrap(), None)
            .await
            .unwrap();
        let resolved = service.resolve(&created.token).await.unwrap();
        assert_eq!(resolved.processor_reference.as_deref(), Some("REF123"));
        assert_eq!(resolved.final_amount.unwrap().to_string(), "20.80");

        let consumed = service.consume(&created.token).await.unwrap();
        assert!(consumed.consumed);
        assert!(matches!(
            service.resolve(&created.token).await,
            Err(DomainError::NotFound)
        ));
        assert_eq!(service.active_sessions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_attach_is_last_write_wins() {
        let (service, _) = service();
        let created = service.create(deal_request("42", "20.80")).await.unwrap();

        service
            .attach_processor_reference(&created.token, "REF1".to_string(), None, Money::from_cents(1000), None)
            .await
            .unwrap();
        service
            .attach_processor_reference(&created.token, "REF2".to_string(), None, Money::from_cents(2000), None)
            .await
            .unwrap();

        let resolved = service.resolve(&created.token).await.unwrap();
        assert_eq!(resolved.processor_reference.as_deref(), Some("REF2"));
        assert_eq!(resolved.final_amount, Some(Money::from_cents(2000)));
    }

    #[tokio::test]
    async fn test_unknown_token_is_not_found() {
        let (service, _) = service();

        assert!(matches!(service.resolve("missing").await, Err(DomainError::NotFound)));
        assert!(matches!(service.consume("missing").await, Err(DomainError::NotFound)));
        assert!(matches!(
            service
                .attach_processor_reference("missing", "R".to_string(), None, Money::from_cents(1), None)
                .await,
            Err(DomainError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_session_resolves_until_expiry() {
        let (service, clock) = service();
        let created = service.create(deal_request("42", "20.80")).await.unwrap();

        clock.advance(Duration::hours(24) - Duration::seconds(1));
        assert!(service.resolve(&created.token).await.is_ok());

        clock.advance(Duration::seconds(1));
        assert!(matches!(service.resolve(&created.token).await, Err(DomainError::Expired)));
        assert!(matches!(service.resolve(&created.token).await, Err(DomainError::NotFound)));
    }

    #[tokio::test]
    async fn test_expired_session_cannot_be_consumed() {
        let (service, clock) = service();
        let first = service.create(deal_request("42", "20.80")).await.unwrap();
        let second = service.create(deal_request("43", "20.80")).await.unwrap();

        clock.advance(Duration::hours(25));
        assert!(matches!(service.resolve(&first.token).await, Err(DomainError::Expired)));
        assert!(matches!(service.consume(&second.token).await, Err(DomainError::Expired)));
    }

    #[tokio::test]
    async fn test_consume_twice_fails() {
        let (service, _) = service();
        let created = service.create(deal_request("42", "20.80")).await.unwrap();

        assert!(service.consume(&created.token).await.is_ok());
        assert!(matches!(
            service.consume(&created.token).await,
            Err(DomainError::AlreadyConsumed)
        ));
    }

    #[tokio::test]
    async fn test_consumed_token_rejects_further_mutations() {
        let (service, _) = service();
        let created = service.create(deal_request("42", "20.80")).await.unwrap();
        service.consume(&created.token).await.unwrap();

        assert!(matches!(
            service.begin_charge(&created.token).await,
            Err(DomainError::AlreadyConsumed)
        ));
        assert!(matches!(
            service
                .attach_processor_reference(&created.token, "REF9".to_string(), None, Money::from_cents(1), None)
                .await,
            Err(DomainError::AlreadyConsumed)
        ));
        assert!(matches!(
            service.resolve_pending(&created.token).await,
            Err(DomainError::AlreadyConsumed)
        ));
        assert!(matches!(service.resolve(&created.token).await, Err(DomainError::NotFound)));
    }

    #[tokio::test]
    async fn test_transaction_completes_only_one_session() {
        let (service, _) = service();
        let first = service.create(deal_request("42", "20.80")).await.unwrap();
        let second = service.create(deal_request("43", "20.80")).await.unwrap();

        service.consume_with_transaction(&first.token, "6001").await.unwrap();

        assert!(matches!(
            service.consume_with_transaction(&second.token, "6001").await,
            Err(DomainError::InvalidRequest(_))
        ));
        assert!(matches!(
            service.consume_with_transaction(&first.token, "6001").await,
            Err(DomainError::AlreadyConsumed)
        ));
        assert!(service.resolve(&second.token).await.is_ok());
        assert!(service.consume_with_transaction(&second.token, "6002").await.is_ok());
    }

    #[tokio::test]
    async fn test_consumed_record_is_swept_with_expiry() {
        let (service, clock) = service();
        let created = service.create(deal_request("42", "20.80")).await.unwrap();
        service.consume(&created.token).await.unwrap();

        clock.advance(Duration::hours(25));
        service.sweep_expired().await.unwrap();
        assert!(matches!(service.consume(&created.token).await, Err(DomainError::NotFound)));
    }

    #[tokio::test]
    async fn test_empty_entity_id_is_rejected_and_not_stored() {
        let (service, _) = service();

        let result = service.create(deal_request("", "20.80")).await;
        assert!(matches!(result, Err(DomainError::InvalidRequest(_))));
        assert_eq!(service.active_sessions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_begin_and_release_charge() {
        let (service, _) = service();
        let created = service.create(deal_request("42", "20.80")).await.unwrap();

        service.begin_charge(&created.token).await.unwrap();
        assert!(matches!(
            service.begin_charge(&created.token).await,
            Err(DomainError::ChargeInProgress)
        ));

        service.release_charge(&created.token).await.unwrap();
        assert!(service.begin_charge(&created.token).await.is_ok());
        assert!(service.consume(&created.token).await.is_ok());

        // 会话已完成，释放操作应静默忽略
        assert!(service.release_charge(&created.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_sweep_expired_removes_only_stale_sessions() {
        let (service, clock) = service();
        service.create(deal_request("1", "10")).await.unwrap();
        service.create(deal_request("2", "10")).await.unwrap();

        clock.advance(Duration::hours(12));
        let fresh = service.create(deal_request("3", "10")).await.unwrap();

        clock.advance(Duration::hours(13));
        assert_eq!(service.sweep_expired().await.unwrap(), 2);
        assert_eq!(service.active_sessions().await.unwrap(), 1);
        assert!(service.resolve(&fresh.token).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consume_succeeds_once() {
        let (service, _) = service();
        let created = service.create(deal_request("42", "20.80")).await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let service = service.clone();
                let token = created.token.clone();
                tokio::spawn(async move { service.consume(&token).await })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(DomainError::AlreadyConsumed) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(successes, 1);
    }
}
