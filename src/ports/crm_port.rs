use crate::domain::errors::DomainResult;
use crate::domain::{EntityReference, LineItem, Money};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// CRM交易
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrmDeal {
    pub id: String,
    pub title: Option<String>,
    /// 关联联系人ID（"0" 表示未关联）
    pub contact_id: Option<String>,
    pub stage_id: Option<String>,
    pub amount: Option<Money>,
}

/// CRM联系人
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrmContact {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// CRM端口接口
#[async_trait]
pub trait CrmPort: Send + Sync {
    /// 查询交易
    async fn get_deal(&self, deal_id: &str) -> DomainResult<Option<CrmDeal>>;

    /// 查询联系人
    async fn get_contact(&self, contact_id: &str) -> DomainResult<Option<CrmContact>>;

    /// 查询交易的商品行
    async fn get_deal_products(&self, deal_id: &str) -> DomainResult<Vec<LineItem>>;

    /// 更新CRM记录字段
    async fn update_entity(
        &self,
        entity: &EntityReference,
        fields: Map<String, Value>,
    ) -> DomainResult<()>;

    /// 查询交易关联的联系人
    async fn get_contact_for_deal(&self, deal_id: &str) -> DomainResult<Option<CrmContact>> {
        let contact_id = self
            .get_deal(deal_id)
            .await?
            .and_then(|deal| deal.contact_id)
            .filter(|id| !id.is_empty() && id != "0");

        match contact_id {
            Some(id) => self.get_contact(&id).await,
            None => Ok(None),
        }
    }
}
