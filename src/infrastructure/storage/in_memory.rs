use crate::core::errors::LedgerError;
use crate::core::models::{
    audit::GroupAudit,
    debt::{Debt, DebtKey},
    expense::Expense,
    group::Group,
    user::User,
};
use crate::infrastructure::storage::{DebtChangeSet, Storage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Debts indexed by id and by their uniqueness key; both maps change under one lock.
#[derive(Default)]
struct DebtTable {
    by_id: HashMap<String, Debt>,
    by_key: HashMap<DebtKey, String>,
}

impl DebtTable {
    fn check_key(&self, debt: &Debt) -> Result<(), LedgerError> {
        match self.by_key.get(&debt.key()) {
            Some(owner) if *owner != debt.id => Err(LedgerError::DuplicateDebt {
                debtor: debt.debtor_id.clone(),
                creditor: debt.creditor_id.clone(),
                expense: debt.expense_id.clone(),
            }),
            _ => Ok(()),
        }
    }

    fn put(&mut self, debt: Debt) {
        if let Some(previous) = self.by_id.get(&debt.id) {
            let old_key = previous.key();
            if old_key != debt.key() {
                self.by_key.remove(&old_key);
            }
        }
        self.by_key.insert(debt.key(), debt.id.clone());
        self.by_id.insert(debt.id.clone(), debt);
    }

    fn remove(&mut self, debt_id: &str) {
        if let Some(debt) = self.by_id.remove(debt_id) {
            self.by_key.remove(&debt.key());
        }
    }
}

fn sorted<'a>(debts: impl Iterator<Item = &'a Debt>) -> Vec<Debt> {
    let mut out: Vec<Debt> = debts.cloned().collect();
    out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    out
}

#[derive(Clone, Default)]
pub struct InMemoryStorage {
    users: Arc<RwLock<HashMap<String, User>>>,
    groups: Arc<RwLock<HashMap<String, Group>>>,
    expenses: Arc<RwLock<HashMap<String, Expense>>>,
    debts: Arc<RwLock<DebtTable>>,
    group_audits: Arc<RwLock<HashMap<String, Vec<GroupAudit>>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn upsert_user(&self, user: User) -> Result<User, LedgerError> {
        let mut users = self.users.write().await;
        let stored = match users.get(&user.id) {
            Some(existing) => User {
                created_at: existing.created_at,
                ..user
            },
            None => user,
        };
        users.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, LedgerError> {
        let users = self.users.read().await;
        Ok(users.get(user_id).cloned())
    }

    async fn save_group(&self, group: Group) -> Result<(), LedgerError> {
        let mut groups = self.groups.write().await;
        groups.insert(group.id.clone(), group);
        Ok(())
    }

    async fn get_group(&self, group_id: &str) -> Result<Option<Group>, LedgerError> {
        let groups = self.groups.read().await;
        Ok(groups.get(group_id).cloned())
    }

    async fn get_user_groups(&self, user_id: &str) -> Result<Vec<Group>, LedgerError> {
        let groups = self.groups.read().await;
        let mut out: Vec<Group> = groups
            .values()
            .filter(|g| g.is_active_member(user_id))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn save_expense(&self, expense: Expense) -> Result<(), LedgerError> {
        let mut expenses = self.expenses.write().await;
        expenses.insert(expense.id.clone(), expense);
        Ok(())
    }

    async fn get_expense(&self, expense_id: &str) -> Result<Option<Expense>, LedgerError> {
        let expenses = self.expenses.read().await;
        Ok(expenses.get(expense_id).cloned())
    }

    async fn get_group_expenses(&self, group_id: &str) -> Result<Vec<Expense>, LedgerError> {
        let expenses = self.expenses.read().await;
        let mut out: Vec<Expense> = expenses
            .values()
            .filter(|e| e.group_id == group_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn insert_debt(&self, debt: Debt) -> Result<(), LedgerError> {
        let mut debts = self.debts.write().await;
        if debts.by_key.contains_key(&debt.key()) {
            return Err(LedgerError::DuplicateDebt {
                debtor: debt.debtor_id,
                creditor: debt.creditor_id,
                expense: debt.expense_id,
            });
        }
        debts.put(debt);
        Ok(())
    }

    async fn save_debt(&self, debt: Debt) -> Result<(), LedgerError> {
        let mut debts = self.debts.write().await;
        debts.check_key(&debt)?;
        debts.put(debt);
        Ok(())
    }

    async fn get_debt(&self, debt_id: &str) -> Result<Option<Debt>, LedgerError> {
        let debts = self.debts.read().await;
        Ok(debts.by_id.get(debt_id).cloned())
    }

    async fn find_debt_by_key(&self, key: &DebtKey) -> Result<Option<Debt>, LedgerError> {
        let debts = self.debts.read().await;
        Ok(debts.by_key.get(key).and_then(|id| debts.by_id.get(id)).cloned())
    }

    async fn get_group_debts(&self, group_id: &str) -> Result<Vec<Debt>, LedgerError> {
        let debts = self.debts.read().await;
        Ok(sorted(debts.by_id.values().filter(|d| d.group_id == group_id)))
    }

    async fn get_user_debts(&self, user_id: &str) -> Result<Vec<Debt>, LedgerError> {
        let debts = self.debts.read().await;
        Ok(sorted(debts.by_id.values().filter(|d| d.involves(user_id))))
    }

    async fn get_debts_due_for_reminder(&self, now: DateTime<Utc>) -> Result<Vec<Debt>, LedgerError> {
        let debts = self.debts.read().await;
        Ok(sorted(
            debts
                .by_id
                .values()
                .filter(|d| d.is_open() && d.reminder.next_due.is_none_or(|next| next <= now)),
        ))
    }

    async fn apply_debt_changes(&self, group_id: &str, changes: DebtChangeSet) -> Result<(), LedgerError> {
        let mut debts = self.debts.write().await;
        if let Some(foreign) = changes.upsert.iter().find(|d| d.group_id != group_id) {
            return Err(LedgerError::InternalServerError(format!(
                "debt {} does not belong to group {}",
                foreign.id, group_id
            )));
        }

        let mut staged = DebtTable {
            by_id: debts.by_id.clone(),
            by_key: debts.by_key.clone(),
        };
        for id in &changes.remove {
            staged.remove(id);
        }
        for debt in changes.upsert {
            staged.check_key(&debt)?;
            staged.put(debt);
        }
        *debts = staged;
        Ok(())
    }

    async fn save_group_audit(&self, audit: GroupAudit) -> Result<(), LedgerError> {
        let mut group_audits = self.group_audits.write().await;
        group_audits.entry(audit.group_id.clone()).or_default().push(audit);
        Ok(())
    }

    async fn get_group_audits(&self, group_id: &str) -> Result<Vec<GroupAudit>, LedgerError> {
        let group_audits = self.group_audits.read().await;
        Ok(group_audits.get(group_id).cloned().unwrap_or_default())
    }
}
