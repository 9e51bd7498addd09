use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumString};

/// Payment status recorded by the backend's webhook consumer.
///
/// Parsing is case-insensitive; anything unrecognised or missing reads as `Pending`.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Display,
    AsRefStr,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Succeeded,
    Failed,
}

impl From<String> for PaymentStatus {
    fn from(raw: String) -> Self {
        PaymentStatus::from_str(raw.trim()).unwrap_or_default()
    }
}

/// Catalog entity embedded in an order by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSummary {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUser {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Durable order written by the backend once the gateway's webhook arrives. Read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    #[serde(rename = "_id", alias = "orderId", alias = "id")]
    pub order_id: String,
    #[serde(default, rename = "paymentIntentId", alias = "authorizationId")]
    pub authorization_id: Option<String>,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub service: Option<CatalogSummary>,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub plan: Option<CatalogSummary>,
    #[serde(default)]
    pub plan_name: Option<String>,
    pub price: Decimal,
    /// Fulfilment status managed by admins (pending / completed / cancelled).
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub user: Option<OrderUser>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl OrderRecord {
    pub fn is_settled(&self) -> bool {
        self.payment_status == PaymentStatus::Succeeded
    }

    pub fn service_title(&self) -> Option<&str> {
        self.service
            .as_ref()
            .and_then(|s| s.title.as_deref())
            .or(self.service_name.as_deref())
    }

    pub fn plan_title(&self) -> Option<&str> {
        self.plan
            .as_ref()
            .and_then(|p| p.title.as_deref())
            .or(self.plan_name.as_deref())
    }

    pub fn plan_features(&self) -> &[String] {
        self.plan
            .as_ref()
            .map(|p| p.features.as_slice())
            .unwrap_or_default()
    }
}
