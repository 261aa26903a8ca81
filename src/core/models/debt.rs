use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    PromptPay,
    Other,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentKind {
    Payment,
    /// Cancelled against the reverse-direction debt `counter_debt_id`
    Netting { counter_debt_id: String },
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct PaymentRecord {
    pub amount: Decimal,
    pub paid_at: DateTime<Utc>,
    pub note: Option<String>,
    pub kind: PaymentKind,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DebtStatus {
    Open,
    Paid {
        paid_at: DateTime<Utc>,
        method: Option<PaymentMethod>,
        proof: Option<String>,
    },
    Netted {
        paid_at: DateTime<Utc>,
    },
}

/// Lifecycle stage as seen by readers; `PartiallyPaid` is implied by the amounts.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DebtState {
    Pending,
    PartiallyPaid,
    Paid,
    Netted,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ReminderState {
    pub count: u32,
    pub last_sent: Option<DateTime<Utc>>,
    pub next_due: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct DebtKey {
    pub debtor_id: String,
    pub creditor_id: String,
    pub expense_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Debt {
    pub id: String,
    pub group_id: String,
    pub expense_id: String,
    pub debtor_id: String,
    pub creditor_id: String,
    pub currency: String,
    pub original_amount: Decimal,
    pub outstanding: Decimal,
    pub payments: Vec<PaymentRecord>,
    pub status: DebtStatus,
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reminder: ReminderState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Debt {
    pub fn key(&self) -> DebtKey {
        DebtKey {
            debtor_id: self.debtor_id.clone(),
            creditor_id: self.creditor_id.clone(),
            expense_id: self.expense_id.clone(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == DebtStatus::Open
    }

    /// Open and never touched by a payment or netting; safe to rebuild from expenses.
    pub fn is_pristine(&self) -> bool {
        self.is_open() && self.payments.is_empty()
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.debtor_id == user_id || self.creditor_id == user_id
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.due_date.is_some_and(|due| due < now)
    }

    pub fn state(&self) -> DebtState {
        match self.status {
            DebtStatus::Paid { .. } => DebtState::Paid,
            DebtStatus::Netted { .. } => DebtState::Netted,
            DebtStatus::Open if self.outstanding < self.original_amount => DebtState::PartiallyPaid,
            DebtStatus::Open => DebtState::Pending,
        }
    }
}
