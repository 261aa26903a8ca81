use super::Lifecycle;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SplitMethod {
    Equal,
    Custom,
    Percentage,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Food,
    Transport,
    Accommodation,
    Entertainment,
    Shopping,
    Utilities,
    #[default]
    Other,
}

/// One participant's owed share of an expense.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Split {
    pub user_id: String,
    pub amount: Decimal,
    pub percentage: Option<Decimal>,
    /// True only for the payer's own share, which is pre-paid. Repayment of
    /// the other shares is tracked on their debts, never here.
    pub is_paid: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Expense {
    pub id: String,
    pub group_id: String,
    pub description: String,
    pub amount: Decimal,
    pub currency: String,
    #[serde(default)]
    pub category: Category,
    pub paid_by: String,
    pub created_by: String,
    pub split_method: SplitMethod,
    pub splits: Vec<Split>,
    /// Due date copied onto every derived debt
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }
}
