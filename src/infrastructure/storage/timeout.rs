//! Deadline decorator for any [`Storage`] backend.
//!
//! A call that outlives its deadline surfaces as
//! [`LedgerError::StorageTimeout`], which callers may retry.

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
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Clone)]
pub struct TimedStorage<S: Storage> {
    inner: S,
    timeout: Duration,
}

impl<S: Storage> TimedStorage<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        TimedStorage { inner, timeout }
    }

    async fn timed<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, LedgerError>> + Send,
    ) -> Result<T, LedgerError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation = op, timeout_ms = self.timeout.as_millis() as u64, "storage call timed out");
                Err(LedgerError::StorageTimeout(op.to_string()))
            }
        }
    }
}

#[async_trait]
impl<S: Storage> Storage for TimedStorage<S> {
    async fn upsert_user(&self, user: User) -> Result<User, LedgerError> {
        self.timed("upsert_user", self.inner.upsert_user(user)).await
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, LedgerError> {
        self.timed("get_user", self.inner.get_user(user_id)).await
    }

    async fn save_group(&self, group: Group) -> Result<(), LedgerError> {
        self.timed("save_group", self.inner.save_group(group)).await
    }

    async fn get_group(&self, group_id: &str) -> Result<Option<Group>, LedgerError> {
        self.timed("get_group", self.inner.get_group(group_id)).await
    }

    async fn get_user_groups(&self, user_id: &str) -> Result<Vec<Group>, LedgerError> {
        self.timed("get_user_groups", self.inner.get_user_groups(user_id)).await
    }

    async fn save_expense(&self, expense: Expense) -> Result<(), LedgerError> {
        self.timed("save_expense", self.inner.save_expense(expense)).await
    }

    async fn get_expense(&self, expense_id: &str) -> Result<Option<Expense>, LedgerError> {
        self.timed("get_expense", self.inner.get_expense(expense_id)).await
    }

    async fn get_group_expenses(&self, group_id: &str) -> Result<Vec<Expense>, LedgerError> {
        self.timed("get_group_expenses", self.inner.get_group_expenses(group_id))
            .await
    }

    async fn insert_debt(&self, debt: Debt) -> Result<(), LedgerError> {
        self.timed("insert_debt", self.inner.insert_debt(debt)).await
    }

    async fn save_debt(&self, debt: Debt) -> Result<(), LedgerError> {
        self.timed("save_debt", self.inner.save_debt(debt)).await
    }

    async fn get_debt(&self, debt_id: &str) -> Result<Option<Debt>, LedgerError> {
        self.timed("get_debt", self.inner.get_debt(debt_id)).await
    }

    async fn find_debt_by_key(&self, key: &DebtKey) -> Result<Option<Debt>, LedgerError> {
        self.timed("find_debt_by_key", self.inner.find_debt_by_key(key)).await
    }

    async fn get_group_debts(&self, group_id: &str) -> Result<Vec<Debt>, LedgerError> {
        self.timed("get_group_debts", self.inner.get_group_debts(group_id)).await
    }

    async fn get_user_debts(&self, user_id: &str) -> Result<Vec<Debt>, LedgerError> {
        self.timed("get_user_debts", self.inner.get_user_debts(user_id)).await
    }

    async fn get_debts_due_for_reminder(&self, now: DateTime<Utc>) -> Result<Vec<Debt>, LedgerError> {
        self.timed("get_debts_due_for_reminder", self.inner.get_debts_due_for_reminder(now))
            .await
    }

    async fn apply_debt_changes(&self, group_id: &str, changes: DebtChangeSet) -> Result<(), LedgerError> {
        self.timed("apply_debt_changes", self.inner.apply_debt_changes(group_id, changes))
            .await
    }

    async fn save_group_audit(&self, audit: GroupAudit) -> Result<(), LedgerError> {
        self.timed("save_group_audit", self.inner.save_group_audit(audit)).await
    }

    async fn get_group_audits(&self, group_id: &str) -> Result<Vec<GroupAudit>, LedgerError> {
        self.timed("get_group_audits", self.inner.get_group_audits(group_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::in_memory::InMemoryStorage;

    /// Backend whose reads never complete.
    struct StalledStorage;

    #[async_trait]
    impl Storage for StalledStorage {
        async fn upsert_user(&self, user: User) -> Result<User, LedgerError> {
            Ok(user)
        }
        async fn get_user(&self, _user_id: &str) -> Result<Option<User>, LedgerError> {
            futures::future::pending().await
        }
        async fn save_group(&self, _group: Group) -> Result<(), LedgerError> {
            Ok(())
        }
        async fn get_group(&self, _group_id: &str) -> Result<Option<Group>, LedgerError> {
            futures::future::pending().await
        }
        async fn get_user_groups(&self, _user_id: &str) -> Result<Vec<Group>, LedgerError> {
            Ok(vec![])
        }
        async fn save_expense(&self, _expense: Expense) -> Result<(), LedgerError> {
            Ok(())
        }
        async fn get_expense(&self, _expense_id: &str) -> Result<Option<Expense>, LedgerError> {
            Ok(None)
        }
        async fn get_group_expenses(&self, _group_id: &str) -> Result<Vec<Expense>, LedgerError> {
            Ok(vec![])
        }
        async fn insert_debt(&self, _debt: Debt) -> Result<(), LedgerError> {
            Ok(())
        }
        async fn save_debt(&self, _debt: Debt) -> Result<(), LedgerError> {
            Ok(())
        }
        async fn get_debt(&self, _debt_id: &str) -> Result<Option<Debt>, LedgerError> {
            Ok(None)
        }
        async fn find_debt_by_key(&self, _key: &DebtKey) -> Result<Option<Debt>, LedgerError> {
            Ok(None)
        }
        async fn get_group_debts(&self, _group_id: &str) -> Result<Vec<Debt>, LedgerError> {
            Ok(vec![])
        }
        async fn get_user_debts(&self, _user_id: &str) -> Result<Vec<Debt>, LedgerError> {
            Ok(vec![])
        }
        async fn get_debts_due_for_reminder(&self, _now: DateTime<Utc>) -> Result<Vec<Debt>, LedgerError> {
            Ok(vec![])
        }
        async fn apply_debt_changes(&self, _group_id: &str, _changes: DebtChangeSet) -> Result<(), LedgerError> {
            Ok(())
        }
        async fn save_group_audit(&self, _audit: GroupAudit) -> Result<(), LedgerError> {
            Ok(())
        }
        async fn get_group_audits(&self, _group_id: &str) -> Result<Vec<GroupAudit>, LedgerError> {
            Ok(vec![])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_call_becomes_retryable_timeout() {
        let storage = TimedStorage::new(StalledStorage, Duration::from_millis(50));
        let err = storage.get_group("g1").await.unwrap_err();
        assert!(matches!(err, LedgerError::StorageTimeout(ref op) if op == "get_group"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn fast_calls_pass_through() {
        let storage = TimedStorage::new(InMemoryStorage::new(), Duration::from_secs(1));
        assert!(storage.get_user("nobody").await.unwrap().is_none());
    }
}
