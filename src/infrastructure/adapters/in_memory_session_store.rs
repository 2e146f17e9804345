use crate::domain::errors::DomainResult;
use crate::domain::{ConsumedToken, PaymentSession};
use crate::ports::session_store_port::SessionStorePort;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// 内存会话存储（进程重启后会话全部丢失）
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, PaymentSession>>,
    consumed: RwLock<HashMap<String, ConsumedToken>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStorePort for InMemorySessionStore {
    async fn get(&self, token: &str) -> DomainResult<Option<PaymentSession>> {
        Ok(self.sessions.read().await.get(token).cloned())
    }

    async fn set(&self, session: PaymentSession) -> DomainResult<()> {
        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session);
        Ok(())
    }

    async fn delete(&self, token: &str) -> DomainResult<bool> {
        Ok(self.sessions.write().await.remove(token).is_some())
    }

    async fn set_consumed(&self, record: ConsumedToken) -> DomainResult<()> {
        self.consumed
            .write()
            .await
            .insert(record.token.clone(), record);
        Ok(())
    }

    async fn get_consumed(&self, token: &str) -> DomainResult<Option<ConsumedToken>> {
        Ok(self.consumed.read().await.get(token).cloned())
    }

    async fn transaction_consumed(&self, transaction_id: &str) -> DomainResult<bool> {
        Ok(self
            .consumed
            .read()
            .await
            .values()
            .any(|record| record.transaction_id.as_deref() == Some(transaction_id)))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> DomainResult<usize> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now));
        let removed = before - sessions.len();

        let mut consumed = self.consumed.write().await;
        consumed.retain(|_, record| !record.is_expired(now));

        debug!(
            removed,
            remaining = sessions.len(),
            consumed = consumed.len(),
            "In-memory sweep finished"
        );
        Ok(removed)
    }

    async fn len(&self) -> DomainResult<usize> {
        Ok(self.sessions.read().await.len())
    }
}
