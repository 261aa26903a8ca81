use super::Lifecycle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Where a creditor wants to receive money.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentInfo {
    #[default]
    None,
    PromptPay {
        id: String,
    },
    BankAccount {
        bank: String,
        number: String,
        name: String,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct User {
    /// Stable identifier issued by the identity provider
    pub id: String,
    pub name: String,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub payment_info: PaymentInfo,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
