use crate::domain::errors::DomainResult;
use crate::domain::{ConsumedToken, PaymentSession};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 支付会话存储端口接口
///
/// 只负责按令牌存取，生命周期规则由 `PaymentSessionService` 维护。
#[async_trait]
pub trait SessionStorePort: Send + Sync {
    /// 根据令牌查找会话快照
    async fn get(&self, token: &str) -> DomainResult<Option<PaymentSession>>;

    /// 写入或覆盖会话
    async fn set(&self, session: PaymentSession) -> DomainResult<()>;

    /// 删除会话，返回是否存在
    async fn delete(&self, token: &str) -> DomainResult<bool>;

    /// 记录已完成的令牌
    async fn set_consumed(&self, record: ConsumedToken) -> DomainResult<()>;

    /// 查找已完成令牌的记录
    async fn get_consumed(&self, token: &str) -> DomainResult<Option<ConsumedToken>>;

    /// 该网关交易是否已完成过某个会话
    async fn transaction_consumed(&self, transaction_id: &str) -> DomainResult<bool>;

    /// 删除所有在 `now` 时已过期的会话和完成记录，返回删除的会话数量
    async fn delete_expired(&self, now: DateTime<Utc>) -> DomainResult<usize>;

    /// 当前未完成的会话数量
    async fn len(&self) -> DomainResult<usize>;
}
