use crate::core::errors::LedgerError;
use crate::core::models::{
    audit::GroupAudit,
    debt::{Debt, DebtKey},
    expense::Expense,
    group::Group,
    user::User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A batch of debt writes for one group that must land together.
#[derive(Clone, Debug, Default)]
pub struct DebtChangeSet {
    pub remove: Vec<String>,
    pub upsert: Vec<Debt>,
}

impl DebtChangeSet {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.upsert.is_empty()
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn upsert_user(&self, user: User) -> Result<User, LedgerError>;
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, LedgerError>;

    async fn save_group(&self, group: Group) -> Result<(), LedgerError>;
    async fn get_group(&self, group_id: &str) -> Result<Option<Group>, LedgerError>;
    /// Groups in which the user holds an active membership.
    async fn get_user_groups(&self, user_id: &str) -> Result<Vec<Group>, LedgerError>;

    async fn save_expense(&self, expense: Expense) -> Result<(), LedgerError>;
    async fn get_expense(&self, expense_id: &str) -> Result<Option<Expense>, LedgerError>;
    /// Every expense of the group, deactivated ones included, oldest first.
    async fn get_group_expenses(&self, group_id: &str) -> Result<Vec<Expense>, LedgerError>;

    /// Fails with [`LedgerError::DuplicateDebt`] when the `(debtor, creditor, expense)` key is taken.
    async fn insert_debt(&self, debt: Debt) -> Result<(), LedgerError>;
    async fn save_debt(&self, debt: Debt) -> Result<(), LedgerError>;
    async fn get_debt(&self, debt_id: &str) -> Result<Option<Debt>, LedgerError>;
    async fn find_debt_by_key(&self, key: &DebtKey) -> Result<Option<Debt>, LedgerError>;
    /// Oldest first, ties broken by id.
    async fn get_group_debts(&self, group_id: &str) -> Result<Vec<Debt>, LedgerError>;
    /// Debts where the user is debtor or creditor, oldest first.
    async fn get_user_debts(&self, user_id: &str) -> Result<Vec<Debt>, LedgerError>;
    /// Open debts whose next reminder is unset or at/before `now`.
    async fn get_debts_due_for_reminder(&self, now: DateTime<Utc>) -> Result<Vec<Debt>, LedgerError>;
    /// Applies removals and upserts atomically; nothing is written if any upsert violates the debt key.
    async fn apply_debt_changes(&self, group_id: &str, changes: DebtChangeSet) -> Result<(), LedgerError>;

    async fn save_group_audit(&self, audit: GroupAudit) -> Result<(), LedgerError>;
    async fn get_group_audits(&self, group_id: &str) -> Result<Vec<GroupAudit>, LedgerError>;
}

pub mod in_memory;
pub mod timeout;
