use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A proposed payment produced by balance-sheet settlement.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Transfer {
    pub debtor_id: String,
    pub creditor_id: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct UserBreakdown {
    pub user_id: String,
    /// Outstanding amount others owe this user
    pub owed: Decimal,
    /// Outstanding amount this user owes others
    pub owing: Decimal,
    pub net: Decimal,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct PendingTotals {
    pub amount: Decimal,
    pub count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct GroupSummary {
    pub group_id: String,
    pub currency: String,
    pub pending: PendingTotals,
    pub overdue_count: usize,
    pub settled_count: usize,
    pub members: Vec<UserBreakdown>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct GroupBalance {
    pub group_id: String,
    pub group_name: String,
    pub currency: String,
    pub net: Decimal,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct UserSummary {
    pub user_id: String,
    pub total_owed: Decimal,
    pub total_owing: Decimal,
    pub net: Decimal,
    pub groups: Vec<GroupBalance>,
    /// Groups whose data could not be read; the totals exclude them
    pub incomplete_groups: Vec<String>,
}
