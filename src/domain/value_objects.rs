use crate::domain::errors::{DomainError, DomainResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// CRM实体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// 联系人
    Contact,
    /// 交易
    Deal,
    /// 网站直接付款（无CRM记录）
    Web,
}

impl EntityKind {
    /// 解析CRM挂件传入的实体类型（如 "CRM_DEAL"、"contact"），未知值按交易处理
    pub fn from_crm(value: &str) -> Self {
        let value = value.to_ascii_lowercase();
        if value.contains("contact") {
            EntityKind::Contact
        } else if value.contains("web") {
            EntityKind::Web
        } else {
            EntityKind::Deal
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Contact => write!(f, "contact"),
            EntityKind::Deal => write!(f, "deal"),
            EntityKind::Web => write!(f, "web"),
        }
    }
}

/// 支付会话关联的CRM记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityReference {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityReference {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn deal(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Deal, id)
    }

    /// 是否为可回写的CRM记录
    pub fn is_crm_record(&self) -> bool {
        self.kind != EntityKind::Web
    }
}

impl fmt::Display for EntityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.id)
    }
}

/// 付款人联系方式（创建会话时的快照）
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PayerContact {
    pub name: String,
    pub email: String,
}

impl PayerContact {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// 名（第一个空格之前）
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or("Customer")
    }

    /// 姓（其余部分），缺省为 "Customer"
    pub fn last_name(&self) -> String {
        let rest: Vec<&str> = self.name.split_whitespace().skip(1).collect();
        if rest.is_empty() {
            "Customer".to_string()
        } else {
            rest.join(" ")
        }
    }
}

/// 会话发起方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    /// CRM挂件生成的链接，付款人可修改金额
    DirectLink,
    /// 通过邮件发送的链接
    Email,
    /// 网站直接付款，自动跳转到支付页
    WebDirect,
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowKind::DirectLink => write!(f, "direct_link"),
            FlowKind::Email => write!(f, "email"),
            FlowKind::WebDirect => write!(f, "web_direct"),
        }
    }
}

/// 货币金额（美分为单位，避免浮点数精度问题）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money {
    /// 金额（分）
    amount_cents: i64,
}

impl Money {
    /// 创建新的金额对象（单位：分）
    pub fn from_cents(cents: i64) -> Self {
        Self {
            amount_cents: cents,
        }
    }

    /// 转换为分
    pub fn to_cents(&self) -> i64 {
        self.amount_cents
    }

    pub fn is_positive(&self) -> bool {
        self.amount_cents > 0
    }

    /// 解析可选金额，空字符串视为未提供
    pub fn parse_optional(value: Option<&str>) -> DomainResult<Option<Self>> {
        match value.map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => text.parse().map(Some),
        }
    }
}

impl FromStr for Money {
    type Err = DomainError;

    /// 接受 "20"、"20.8"、"20.80"，拒绝负数和超过两位的小数
    fn from_str(s: &str) -> DomainResult<Self> {
        let text = s.trim();
        let invalid = || DomainError::InvalidRequest(format!("Invalid amount: {}", text));

        let (whole, frac) = text.split_once('.').unwrap_or((text, ""));
        if (whole.is_empty() && frac.is_empty())
            || frac.len() > 2
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let frac_cents: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
            _ => frac.parse().map_err(|_| invalid())?,
        };

        whole
            .checked_mul(100)
            .and_then(|cents| cents.checked_add(frac_cents))
            .map(Money::from_cents)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:02}",
            self.amount_cents / 100,
            (self.amount_cents % 100).abs()
        )
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// CRM和表单中的金额既可能是字符串也可能是数字
#[derive(Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Text(String),
    Number(serde_json::Number),
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawAmount::deserialize(deserializer)? {
            RawAmount::Text(text) => text.parse(),
            RawAmount::Number(number) => number.to_string().parse(),
        }
        .map_err(serde::de::Error::custom)
    }
}

/// 用于 `#[serde(deserialize_with)]`：null、缺失和空字符串都视为 None
pub fn deserialize_optional_money<'de, D>(deserializer: D) -> Result<Option<Money>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawAmount>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawAmount::Text(text)) => {
            Money::parse_optional(Some(&text)).map_err(serde::de::Error::custom)
        }
        Some(RawAmount::Number(number)) => number
            .to_string()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// 商品行（仅供展示，不与CRM重新校验）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: f64,
    pub unit_price: Money,
}

/// 商品摘要，用于邮件和页面展示
pub fn products_summary(items: &[LineItem]) -> String {
    let names: Vec<&str> = items
        .iter()
        .map(|item| item.name.trim())
        .filter(|name| !name.is_empty())
        .collect();

    match (items.len(), names.len()) {
        (0, _) => "Services".to_string(),
        (_, 0) => "Multiple products".to_string(),
        (_, 1..=3) => names.join(", "),
        (_, n) => format!("{} and {} more products", names[0], n - 1),
    }
}

/// 支付网关托管页面信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedPage {
    /// 表单提交地址
    pub post_url: String,
    /// 网关返回的表单令牌
    pub form_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_parse_and_display() {
        assert_eq!("20.80".parse::<Money>().unwrap().to_cents(), 2080);
        assert_eq!("20.8".parse::<Money>().unwrap().to_cents(), 2080);
        assert_eq!("20".parse::<Money>().unwrap().to_cents(), 2000);
        assert_eq!(".5".parse::<Money>().unwrap().to_cents(), 50);
        assert_eq!(Money::from_cents(2080).to_string(), "20.80");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
    }

    #[test]
    fn test_money_rejects_bad_input() {
        for input in ["", "-1", "abc", "20.805", "1.2.3", "+4", "."] {
            assert!(input.parse::<Money>().is_err(), "{input:?} should be rejected");
        }
    }

    #[test]
    fn test_money_serde_accepts_strings_and_numbers() {
        let from_text: Money = serde_json::from_str("\"20.80\"").unwrap();
        let from_number: Money = serde_json::from_str("20.8").unwrap();
        assert_eq!(from_text, from_number);
        assert_eq!(serde_json::to_string(&from_text).unwrap(), "\"20.80\"");
    }

    #[test]
    fn test_optional_money_treats_blank_as_missing() {
        #[derive(Deserialize)]
        struct Body {
            #[serde(default, deserialize_with = "deserialize_optional_money")]
            amount: Option<Money>,
        }

        let blank: Body = serde_json::from_str(r#"{"amount": ""}"#).unwrap();
        let missing: Body = serde_json::from_str("{}").unwrap();
        let set: Body = serde_json::from_str(r#"{"amount": 12}"#).unwrap();
        assert_eq!(blank.amount, None);
        assert_eq!(missing.amount, None);
        assert_eq!(set.amount, Some(Money::from_cents(1200)));
    }

    #[test]
    fn test_entity_kind_from_crm() {
        assert_eq!(EntityKind::from_crm("CRM_DEAL"), EntityKind::Deal);
        assert_eq!(EntityKind::from_crm("contact"), EntityKind::Contact);
        assert_eq!(EntityKind::from_crm("web"), EntityKind::Web);
        assert_eq!(EntityKind::from_crm(""), EntityKind::Deal);
    }

    #[test]
    fn test_products_summary() {
        let item = |name: &str| LineItem {
            name: name.to_string(),
            quantity: 1.0,
            unit_price: Money::from_cents(100),
        };

        assert_eq!(products_summary(&[]), "Services");
        assert_eq!(products_summary(&[item("Tax return")]), "Tax return");
        assert_eq!(products_summary(&[item(""), item(" ")]), "Multiple products");
        assert_eq!(
            products_summary(&[item("A"), item("B"), item("C"), item("D")]),
            "A and 3 more products"
        );
    }

    #[test]
    fn test_payer_name_split() {
        let payer = PayerContact::new("Ana Maria Lopez", "ana@example.com");
        assert_eq!(payer.first_name(), "Ana");
        assert_eq!(payer.last_name(), "Maria Lopez");
        assert_eq!(PayerContact::new("Ana", "a@b.c").last_name(), "Customer");
    }
}
