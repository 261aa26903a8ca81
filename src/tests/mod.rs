mod api_tests;
mod balance_tests;
mod group_tests;

use crate::api::handlers::AppService;
use crate::auth::jwt::IdentityProfile;
use crate::core::errors::LedgerError;
use crate::core::ledger::LedgerSettings;
use crate::core::models::{
    audit::GroupAudit,
    debt::{Debt, DebtKey},
    expense::{Category, Expense},
    group::Group,
    user::User,
};
use crate::core::rate_limit::SlidingWindowRateLimiter;
use crate::core::services::{ExpenseOutcome, LedgerService, NewExpense};
use crate::core::splits::SplitPolicy;
use crate::infrastructure::logging::in_memory::InMemoryLogging;
use crate::infrastructure::notify::in_memory::InMemoryNotifier;
use crate::infrastructure::storage::{DebtChangeSet, Storage, in_memory::InMemoryStorage, timeout::TimedStorage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEST_SECRET: &str = "test-secret";
pub const WEBHOOK_LIMIT: usize = 3;

pub fn create_test_service() -> AppService {
    create_test_service_with_notifier().0
}

pub fn create_test_service_with_notifier() -> (AppService, InMemoryNotifier) {
    let storage = TimedStorage::new(InMemoryStorage::new(), Duration::from_secs(2));
    let logging = InMemoryLogging::new();
    let notifier = InMemoryNotifier::new();
    let limiter = SlidingWindowRateLimiter::new(WEBHOOK_LIMIT, chrono::Duration::seconds(60));
    let service = LedgerService::new(
        storage,
        logging,
        notifier.clone(),
        TEST_SECRET.to_string(),
        LedgerSettings::default(),
        limiter,
    );
    (service, notifier)
}

pub async fn sign_in(service: &AppService, user_id: &str) -> User {
    service
        .sync_user(IdentityProfile {
            stable_user_id: user_id.to_string(),
            display_name: format!("User {}", user_id),
            avatar_url: None,
        })
        .await
        .unwrap()
}

/// Signs everyone in and creates a group owned by the first member.
pub async fn setup_group(service: &AppService, members: &[&str]) -> Group {
    for member in members {
        sign_in(service, member).await;
    }
    service
        .create_group(
            "Trip".to_string(),
            "THB".to_string(),
            members[1..].iter().map(|m| m.to_string()).collect(),
            members[0],
        )
        .await
        .unwrap()
}

pub fn equal_expense(group: &Group, description: &str, amount: Decimal, participants: &[&str]) -> NewExpense {
    NewExpense {
        group_id: group.id.clone(),
        description: description.to_string(),
        amount,
        category: Category::Food,
        paid_by: None,
        split: SplitPolicy::Equal {
            participants: participants.iter().map(|p| p.to_string()).collect(),
        },
        due_date: None,
    }
}

pub async fn pay_equal(
    service: &AppService,
    group: &Group,
    payer: &str,
    amount: i64,
    participants: &[&str],
) -> ExpenseOutcome {
    service
        .create_expense(equal_expense(group, "dinner", Decimal::from(amount), participants), payer)
        .await
        .unwrap()
}

/// In-memory storage whose group debt reads fail for selected groups, and
/// whose next single-debt read can be held back.
#[derive(Clone)]
pub struct FlakyStorage {
    inner: Arc<InMemoryStorage>,
    failing: Arc<Mutex<HashSet<String>>>,
    slow_debt_read: Arc<Mutex<Option<Duration>>>,
}

impl FlakyStorage {
    pub fn new() -> Self {
        FlakyStorage {
            inner: Arc::new(InMemoryStorage::new()),
            failing: Arc::new(Mutex::new(HashSet::new())),
            slow_debt_read: Arc::new(Mutex::new(None)),
        }
    }

    pub fn fail_group(&self, group_id: &str) {
        self.failing.lock().unwrap().insert(group_id.to_string());
    }

    pub fn slow_next_debt_read(&self, delay: Duration) {
        *self.slow_debt_read.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn upsert_user(&self, user: User) -> Result<User, LedgerError> {
        self.inner.upsert_user(user).await
    }
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, LedgerError> {
        self.inner.get_user(user_id).await
    }
    async fn save_group(&self, group: Group) -> Result<(), LedgerError> {
        self.inner.save_group(group).await
    }
    async fn get_group(&self, group_id: &str) -> Result<Option<Group>, LedgerError> {
        self.inner.get_group(group_id).await
    }
    async fn get_user_groups(&self, user_id: &str) -> Result<Vec<Group>, LedgerError> {
        self.inner.get_user_groups(user_id).await
    }
    async fn save_expense(&self, expense: Expense) -> Result<(), LedgerError> {
        self.inner.save_expense(expense).await
    }
    async fn get_expense(&self, expense_id: &str) -> Result<Option<Expense>, LedgerError> {
        self.inner.get_expense(expense_id).await
    }
    async fn get_group_expenses(&self, group_id: &str) -> Result<Vec<Expense>, LedgerError> {
        self.inner.get_group_expenses(group_id).await
    }
    async fn insert_debt(&self, debt: Debt) -> Result<(), LedgerError> {
        self.inner.insert_debt(debt).await
    }
    async fn save_debt(&self, debt: Debt) -> Result<(), LedgerError> {
        self.inner.save_debt(debt).await
    }
    async fn get_debt(&self, debt_id: &str) -> Result<Option<Debt>, LedgerError> {
        let delay = self.slow_debt_read.lock().unwrap().take();
        let debt = self.inner.get_debt(debt_id).await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        debt
    }
    async fn find_debt_by_key(&self, key: &DebtKey) -> Result<Option<Debt>, LedgerError> {
        self.inner.find_debt_by_key(key).await
    }
    async fn get_group_debts(&self, group_id: &str) -> Result<Vec<Debt>, LedgerError> {
        if self.failing.lock().unwrap().contains(group_id) {
            return Err(LedgerError::StorageUnavailable(format!("group {}", group_id)));
        }
        self.inner.get_group_debts(group_id).await
    }
    async fn get_user_debts(&self, user_id: &str) -> Result<Vec<Debt>, LedgerError> {
        self.inner.get_user_debts(user_id).await
    }
    async fn get_debts_due_for_reminder(&self, now: DateTime<Utc>) -> Result<Vec<Debt>, LedgerError> {
        self.inner.get_debts_due_for_reminder(now).await
    }
    async fn apply_debt_changes(&self, group_id: &str, changes: DebtChangeSet) -> Result<(), LedgerError> {
        self.inner.apply_debt_changes(group_id, changes).await
    }
    async fn save_group_audit(&self, audit: GroupAudit) -> Result<(), LedgerError> {
        self.inner.save_group_audit(audit).await
    }
    async fn get_group_audits(&self, group_id: &str) -> Result<Vec<GroupAudit>, LedgerError> {
        self.inner.get_group_audits(group_id).await
    }
}

pub type FlakyService = LedgerService<InMemoryLogging, FlakyStorage, InMemoryNotifier>;

pub fn flaky_service(storage: FlakyStorage) -> FlakyService {
    LedgerService::new(
        storage,
        InMemoryLogging::new(),
        InMemoryNotifier::new(),
        TEST_SECRET.to_string(),
        LedgerSettings::default(),
        SlidingWindowRateLimiter::new(10, chrono::Duration::seconds(60)),
    )
}
