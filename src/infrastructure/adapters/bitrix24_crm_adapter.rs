use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::{EntityKind, EntityReference, LineItem, Money};
use crate::infrastructure::config::Bitrix24Config;
use crate::ports::crm_port::{CrmContact, CrmDeal, CrmPort};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Bitrix24 REST 适配器
#[derive(Clone)]
pub struct Bitrix24CrmAdapter {
    config: Arc<Bitrix24Config>,
    client: Client,
}

impl Bitrix24CrmAdapter {
    pub fn new(config: Arc<Bitrix24Config>) -> DomainResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { config, client })
    }

    /// 调用 REST 方法，返回 `result` 字段；记录不存在时返回 None
    async fn call_get(&self, base_url: &str, method: &str, id: &str) -> DomainResult<Option<Value>> {
        let url = format!("{}/{}", base_url, method);
        debug!("Bitrix24 request: {} id={}", method, id);

        let response = self.client.get(&url).query(&[("id", id)]).send().await?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let description = body["error_description"].as_str().unwrap_or_default();
            if description.to_ascii_lowercase().contains("not found") {
                return Ok(None);
            }
            error!("Bitrix24 API error: {} - {}", status, body);
            return Err(DomainError::UpstreamFailure(format!(
                "CRM {} returned {}: {}",
                method, status, description
            )));
        }

        Ok(match body.get("result") {
            None | Some(Value::Null) | Some(Value::Bool(false)) => None,
            Some(result) => Some(result.clone()),
        })
    }
}

/// CRM字段可能是数字也可能是字符串
fn text_field(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn number_field(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn money_field(value: &Value) -> Option<Money> {
    number_field(value)
        .filter(|amount| *amount >= 0.0)
        .map(|amount| Money::from_cents((amount * 100.0).round() as i64))
}

/// 多值字段（EMAIL、PHONE）取第一个值
fn first_multi_value(value: &Value) -> Option<String> {
    value
        .as_array()
        .and_then(|values| values.first())
        .and_then(|entry| text_field(&entry["VALUE"]))
}

fn parse_deal(id: &str, raw: &Value) -> CrmDeal {
    CrmDeal {
        id: text_field(&raw["ID"]).unwrap_or_else(|| id.to_string()),
        title: text_field(&raw["TITLE"]),
        contact_id: text_field(&raw["CONTACT_ID"]),
        stage_id: text_field(&raw["STAGE_ID"]),
        amount: money_field(&raw["OPPORTUNITY"]),
    }
}

fn parse_contact(id: &str, raw: &Value) -> CrmContact {
    let name = [&raw["NAME"], &raw["LAST_NAME"]]
        .into_iter()
        .filter_map(text_field)
        .collect::<Vec<_>>()
        .join(" ");

    CrmContact {
        id: text_field(&raw["ID"]).unwrap_or_else(|| id.to_string()),
        name,
        email: first_multi_value(&raw["EMAIL"]),
        phone: first_multi_value(&raw["PHONE"]),
    }
}

fn parse_product_rows(raw: &Value) -> Vec<LineItem> {
    raw.as_array()
        .map(|rows| {
            rows.iter()
                .map(|row| LineItem {
                    name: text_field(&row["PRODUCT_NAME"]).unwrap_or_default(),
                    quantity: number_field(&row["QUANTITY"]).unwrap_or(1.0),
                    unit_price: money_field(&row["PRICE"]).unwrap_or(Money::from_cents(0)),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl CrmPort for Bitrix24CrmAdapter {
    async fn get_deal(&self, deal_id: &str) -> DomainResult<Option<CrmDeal>> {
        let deal = self
            .call_get(&self.config.webhook_url, "crm.deal.get", deal_id)
            .await?
            .map(|raw| parse_deal(deal_id, &raw));

        if let Some(deal) = &deal {
            debug!(
                "Deal obtained: id={} contact={:?} stage={:?} amount={:?}",
                deal.id, deal.contact_id, deal.stage_id, deal.amount
            );
        }
        Ok(deal)
    }

    async fn get_contact(&self, contact_id: &str) -> DomainResult<Option<CrmContact>> {
        Ok(self
            .call_get(&self.config.webhook_url, "crm.contact.get", contact_id)
            .await?
            .map(|raw| parse_contact(contact_id, &raw)))
    }

    async fn get_deal_products(&self, deal_id: &str) -> DomainResult<Vec<LineItem>> {
        let products = self
            .call_get(
                &self.config.product_webhook_url,
                "crm.deal.productrows.get",
                deal_id,
            )
            .await?
            .map(|raw| parse_product_rows(&raw))
            .unwrap_or_default();

        debug!("Found {} products for deal {}", products.len(), deal_id);
        Ok(products)
    }

    async fn update_entity(
        &self,
        entity: &EntityReference,
        fields: Map<String, Value>,
    ) -> DomainResult<()> {
        let method = match entity.kind {
            EntityKind::Deal => "crm.deal.update",
            EntityKind::Contact => "crm.contact.update",
            EntityKind::Web => {
                return Err(DomainError::InvalidRequest(
                    "Web payments have no CRM record to update".to_string(),
                ));
            }
        };

        let url = format!("{}/{}", self.config.webhook_url, method);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "id": entity.id, "fields": fields }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Bitrix24 update error: {} - {}", status, error_text);
            return Err(DomainError::UpstreamFailure(format!(
                "CRM update returned {}: {}",
                status, error_text
            )));
        }

        info!("CRM record updated: {}", entity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_deal() {
        let raw = json!({
            "ID": "42",
            "TITLE": "Tax filing",
            "CONTACT_ID": "7",
            "STAGE_ID": "NEW",
            "OPPORTUNITY": "20.80"
        });

        let deal = parse_deal("42", &raw);
        assert_eq!(deal.title.as_deref(), Some("Tax filing"));
        assert_eq!(deal.contact_id.as_deref(), Some("7"));
        assert_eq!(deal.amount, Some(Money::from_cents(2080)));
    }

    #[test]
    fn test_parse_contact() {
        let raw = json!({
            "ID": 7,
            "NAME": "Ana",
            "LAST_NAME": "Lopez",
            "EMAIL": [{ "VALUE": "ana@example.com", "VALUE_TYPE": "WORK" }],
            "PHONE": []
        });

        let contact = parse_contact("7", &raw);
        assert_eq!(contact.id, "7");
        assert_eq!(contact.name, "Ana Lopez");
        assert_eq!(contact.email.as_deref(), Some("ana@example.com"));
        assert_eq!(contact.phone, None);
    }

    #[test]
    fn test_parse_product_rows() {
        let raw = json!([
            { "PRODUCT_NAME": "Tax return", "PRICE": 15.5, "QUANTITY": 2 },
            { "PRODUCT_NAME": "Notary", "PRICE": "5.30", "QUANTITY": "1.00" }
        ]);

        let items = parse_product_rows(&raw);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].unit_price, Money::from_cents(1550));
        assert_eq!(items[0].quantity, 2.0);
        assert_eq!(items[1].unit_price, Money::from_cents(530));
        assert!(parse_product_rows(&Value::Null).is_empty());
    }
}
