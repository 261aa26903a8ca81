use crate::auth::jwt::{IdentityProfile, JwtService};
use crate::constants::{
    DEBT_SETTLED, DEBTS_OPTIMIZED, DEBTS_RECALCULATED, EXPENSE_ADDED, EXPENSE_DELETED, EXPENSE_UPDATED,
    GROUP_CREATED, GROUP_DEACTIVATED, MEMBER_ADDED, MEMBER_REMOVED, MEMBER_ROLE_CHANGED, PAYMENT_INFO_UPDATED,
    PAYMENT_RECORDED, REMINDERS_SWEPT, USER_SYNCED, WEBHOOK_BALANCE_COMMAND, WEBHOOK_HANDLED,
};
use crate::core::balances::BalanceAggregator;
use crate::core::errors::LedgerError;
use crate::core::ledger::{DebtLedger, LedgerSettings, NettingOutcome, RecalculationReport, minimal_transfers};
use crate::core::models::{
    Lifecycle,
    audit::{AppLog, GroupAudit},
    balance::{GroupSummary, Transfer, UserSummary},
    debt::{Debt, PaymentMethod},
    expense::{Category, Expense, SplitMethod},
    group::{Group, GroupMember, Role},
    user::{PaymentInfo, User},
};
use crate::core::money::validate_amount;
use crate::core::rate_limit::SlidingWindowRateLimiter;
use crate::core::reminders::ReminderScheduler;
use crate::core::splits::{SplitPolicy, compute_splits};
use crate::infrastructure::logging::LoggingService;
use crate::infrastructure::notify::Notifier;
use crate::infrastructure::storage::Storage;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct NewExpense {
    pub group_id: String,
    pub description: String,
    pub amount: Decimal,
    pub category: Category,
    /// Defaults to the acting user
    pub paid_by: Option<String>,
    pub split: SplitPolicy,
    pub due_date: Option<DateTime<Utc>>,
}

/// Fields left `None` keep their current value.
#[derive(Clone, Debug, Default)]
pub struct ExpenseChanges {
    pub description: Option<String>,
    pub amount: Option<Decimal>,
    pub category: Option<Category>,
    pub split: Option<SplitPolicy>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct ExpenseOutcome {
    pub expense: Expense,
    pub debts: Vec<Debt>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DebtRole {
    Debtor,
    Creditor,
    #[default]
    All,
}

#[derive(Clone, Debug, Default, Serialize, ToSchema, PartialEq, Eq)]
pub struct SweepReport {
    pub due: usize,
    pub sent: usize,
    /// Debts whose reminder could not be delivered; they stay due
    pub failed: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct WebhookEvent {
    pub source: String,
    pub user_id: Option<String>,
    pub text: String,
}

#[derive(Clone, Debug, Serialize, ToSchema, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
/// Acknowledgement only; figures travel through the notifier to the user.
pub enum WebhookOutcome {
    Replied { target_id: String },
    Ignored,
}

pub struct LedgerService<L: LoggingService, S: Storage, N: Notifier> {
    storage: Arc<S>,
    logging: L,
    notifier: N,
    ledger: DebtLedger<S>,
    balances: BalanceAggregator<S>,
    reminders: ReminderScheduler<S>,
    webhook_limiter: SlidingWindowRateLimiter,
    jwt_service: JwtService,
}

impl<L: LoggingService, S: Storage, N: Notifier> LedgerService<L, S, N> {
    pub fn new(
        storage: S,
        logging: L,
        notifier: N,
        jwt_secret: String,
        settings: LedgerSettings,
        webhook_limiter: SlidingWindowRateLimiter,
    ) -> Self {
        let storage = Arc::new(storage);
        LedgerService {
            ledger: DebtLedger::new(storage.clone(), settings),
            balances: BalanceAggregator::new(storage.clone()),
            reminders: ReminderScheduler::new(storage.clone()),
            storage,
            logging,
            notifier,
            webhook_limiter,
            jwt_service: JwtService::new(jwt_secret),
        }
    }

    pub fn verify_identity(&self, token: &str) -> Result<IdentityProfile, LedgerError> {
        self.jwt_service.verify(token)
    }

    pub fn issue_token(&self, user_id: &str, name: &str, picture: Option<&str>) -> Result<String, LedgerError> {
        self.jwt_service.generate_token(user_id, name, picture)
    }

    async fn active_user(&self, user_id: &str) -> Result<User, LedgerError> {
        self.storage
            .get_user(user_id)
            .await?
            .filter(|u| u.lifecycle.is_active())
            .ok_or_else(|| LedgerError::UserNotFound(user_id.to_string()))
    }

    async fn load_group(&self, group_id: &str) -> Result<Group, LedgerError> {
        self.storage
            .get_group(group_id)
            .await?
            .ok_or_else(|| LedgerError::GroupNotFound(group_id.to_string()))
    }

    async fn validate_group_membership(&self, group_id: &str, user_id: &str) -> Result<Group, LedgerError> {
        let group = self.load_group(group_id).await?;
        if !group.is_active_member(user_id) {
            return Err(LedgerError::NotGroupMember(user_id.to_string()));
        }
        Ok(group)
    }

    async fn validate_group_admin(&self, group_id: &str, user_id: &str) -> Result<Group, LedgerError> {
        let group = self.validate_group_membership(group_id, user_id).await?;
        if !group.is_active_admin(user_id) {
            return Err(LedgerError::NotGroupAdmin(user_id.to_string()));
        }
        Ok(group)
    }

    fn ensure_group_active(group: &Group) -> Result<(), LedgerError> {
        if group.lifecycle.is_active() {
            Ok(())
        } else {
            Err(LedgerError::GroupInactive(group.id.clone()))
        }
    }

    async fn load_expense(&self, expense_id: &str) -> Result<Expense, LedgerError> {
        self.storage
            .get_expense(expense_id)
            .await?
            .ok_or_else(|| LedgerError::ExpenseNotFound(expense_id.to_string()))
    }

    async fn load_debt(&self, debt_id: &str) -> Result<Debt, LedgerError> {
        self.storage
            .get_debt(debt_id)
            .await?
            .ok_or_else(|| LedgerError::DebtNotFound(debt_id.to_string()))
    }

    /// Only the two parties may move money on a debt.
    async fn load_debt_for_party(&self, debt_id: &str, user_id: &str) -> Result<Debt, LedgerError> {
        let debt = self.load_debt(debt_id).await?;
        if !debt.involves(user_id) {
            return Err(LedgerError::NotDebtParty(user_id.to_string()));
        }
        Ok(debt)
    }

    async fn log_and_audit(
        &self,
        group_id: Option<&str>,
        action: &str,
        log_details: serde_json::Value,
        user_id: Option<&str>,
    ) -> Result<(), LedgerError> {
        self.logging.log_action(action, log_details.clone(), user_id).await?;
        if let Some(gid) = group_id {
            self.storage
                .save_group_audit(GroupAudit {
                    id: Uuid::new_v4().to_string(),
                    group_id: gid.to_string(),
                    action: action.to_string(),
                    user_id: user_id.map(String::from),
                    details: log_details,
                    timestamp: Utc::now(),
                })
                .await?;
        }
        Ok(())
    }

    fn validate_string_input(&self, field: &str, value: &str, max_length: usize) -> Result<(), LedgerError> {
        if value.trim().is_empty() {
            return Err(LedgerError::invalid_input(
                field,
                format!("Invalid {}", field),
                format!("{} cannot be empty", field),
            ));
        }
        if value.chars().count() > max_length {
            return Err(LedgerError::invalid_input(
                field,
                format!("{} Too Long", field),
                format!("{} cannot exceed {} characters", field, max_length),
            ));
        }
        if value.chars().any(|c| c.is_control() || "<>{}[]".contains(c)) {
            return Err(LedgerError::invalid_input(
                field,
                format!("Invalid {}", field),
                format!("{} contains invalid characters", field),
            ));
        }
        Ok(())
    }

    // ---- users ----

    /// Creates the user on first sign-in, refreshes name and avatar afterwards.
    pub async fn sync_user(&self, profile: IdentityProfile) -> Result<User, LedgerError> {
        self.validate_string_input("name", &profile.display_name, 100)?;
        let now = Utc::now();
        let user = match self.storage.get_user(&profile.stable_user_id).await? {
            Some(existing) => User {
                name: profile.display_name,
                avatar_url: profile.avatar_url,
                updated_at: now,
                ..existing
            },
            None => User {
                id: profile.stable_user_id,
                name: profile.display_name,
                avatar_url: profile.avatar_url,
                payment_info: PaymentInfo::None,
                lifecycle: Lifecycle::Active,
                created_at: now,
                updated_at: now,
            },
        };
        let user = self.storage.upsert_user(user).await?;

        self.log_and_audit(None, USER_SYNCED, json!({ "user_id": user.id, "name": user.name }), Some(user.id.as_str()))
            .await?;
        Ok(user)
    }

    pub async fn get_user(&self, user_id: &str) -> Result<User, LedgerError> {
        self.storage
            .get_user(user_id)
            .await?
            .ok_or_else(|| LedgerError::UserNotFound(user_id.to_string()))
    }

    pub async fn update_payment_info(&self, user_id: &str, payment_info: PaymentInfo) -> Result<User, LedgerError> {
        match &payment_info {
            PaymentInfo::None => {}
            PaymentInfo::PromptPay { id } => self.validate_string_input("promptpay_id", id, 20)?,
            PaymentInfo::BankAccount { bank, number, name } => {
                self.validate_string_input("bank", bank, 100)?;
                self.validate_string_input("account_number", number, 30)?;
                self.validate_string_input("account_name", name, 100)?;
            }
        }
        let user = self.active_user(user_id).await?;
        let user = self
            .storage
            .upsert_user(User {
                payment_info,
                updated_at: Utc::now(),
                ..user
            })
            .await?;

        self.log_and_audit(None, PAYMENT_INFO_UPDATED, json!({ "user_id": user_id }), Some(user_id))
            .await?;
        Ok(user)
    }

    // ---- groups ----

    pub async fn create_group(
        &self,
        name: String,
        currency: String,
        member_ids: Vec<String>,
        created_by: &str,
    ) -> Result<Group, LedgerError> {
        self.validate_string_input("name", &name, 100)?;
        self.validate_string_input("currency", &currency, 10)?;
        self.active_user(created_by).await?;

        let now = Utc::now();
        let mut members = vec![GroupMember {
            user_id: created_by.to_string(),
            role: Role::Admin,
            status: Lifecycle::Active,
            joined_at: now,
        }];
        for user_id in member_ids {
            if members.iter().any(|m| m.user_id == user_id) {
                continue;
            }
            self.active_user(&user_id).await?;
            members.push(GroupMember {
                user_id,
                role: Role::Member,
                status: Lifecycle::Active,
                joined_at: now,
            });
        }

        let group = Group {
            id: Uuid::new_v4().to_string(),
            name,
            currency,
            members,
            created_by: created_by.to_string(),
            lifecycle: Lifecycle::Active,
            created_at: now,
        };
        self.storage.save_group(group.clone()).await?;

        self.log_and_audit(
            Some(&group.id),
            GROUP_CREATED,
            json!({
                "group_id": group.id,
                "name": group.name,
                "member_ids": group.active_member_ids()
            }),
            Some(created_by),
        )
        .await?;
        Ok(group)
    }

    pub async fn get_group(&self, group_id: &str, user_id: &str) -> Result<Group, LedgerError> {
        self.validate_group_membership(group_id, user_id).await
    }

    pub async fn list_groups(&self, user_id: &str) -> Result<Vec<Group>, LedgerError> {
        self.storage.get_user_groups(user_id).await
    }

    /// Adds a member, or reactivates a previously removed membership.
    pub async fn add_member(&self, group_id: &str, user_id: &str, added_by: &str) -> Result<Group, LedgerError> {
        let mut group = self.validate_group_admin(group_id, added_by).await?;
        Self::ensure_group_active(&group)?;
        self.active_user(user_id).await?;

        let now = Utc::now();
        match group.members.iter_mut().find(|m| m.user_id == user_id) {
            Some(member) if member.is_active() => {
                return Err(LedgerError::AlreadyGroupMember(user_id.to_string()));
            }
            Some(member) => {
                member.status = Lifecycle::Active;
                member.role = Role::Member;
                member.joined_at = now;
            }
            None => group.members.push(GroupMember {
                user_id: user_id.to_string(),
                role: Role::Member,
                status: Lifecycle::Active,
                joined_at: now,
            }),
        }
        self.storage.save_group(group.clone()).await?;

        self.log_and_audit(
            Some(group_id),
            MEMBER_ADDED,
            json!({ "group_id": group_id, "user_id": user_id }),
            Some(added_by),
        )
        .await?;
        Ok(group)
    }

    /// Admins may remove anyone; members may only leave themselves.
    pub async fn remove_member(&self, group_id: &str, user_id: &str, removed_by: &str) -> Result<Group, LedgerError> {
        let mut group = self.validate_group_membership(group_id, removed_by).await?;
        if user_id != removed_by && !group.is_active_admin(removed_by) {
            return Err(LedgerError::NotGroupAdmin(removed_by.to_string()));
        }
        if !group.is_active_member(user_id) {
            return Err(LedgerError::NotGroupMember(user_id.to_string()));
        }
        if group.is_active_admin(user_id) && group.active_admin_count() <= 1 {
            return Err(LedgerError::LastActiveAdmin(group_id.to_string()));
        }

        let now = Utc::now();
        if let Some(member) = group.members.iter_mut().find(|m| m.user_id == user_id) {
            member.status = Lifecycle::Deactivated { at: now };
        }
        self.storage.save_group(group.clone()).await?;

        self.log_and_audit(
            Some(group_id),
            MEMBER_REMOVED,
            json!({ "group_id": group_id, "user_id": user_id }),
            Some(removed_by),
        )
        .await?;
        Ok(group)
    }

    pub async fn change_role(
        &self,
        group_id: &str,
        user_id: &str,
        role: Role,
        changed_by: &str,
    ) -> Result<Group, LedgerError> {
        let mut group = self.validate_group_admin(group_id, changed_by).await?;
        if !group.is_active_member(user_id) {
            return Err(LedgerError::NotGroupMember(user_id.to_string()));
        }
        if role == Role::Member && group.is_active_admin(user_id) && group.active_admin_count() <= 1 {
            return Err(LedgerError::LastActiveAdmin(group_id.to_string()));
        }

        if let Some(member) = group.members.iter_mut().find(|m| m.user_id == user_id) {
            member.role = role;
        }
        self.storage.save_group(group.clone()).await?;

        self.log_and_audit(
            Some(group_id),
            MEMBER_ROLE_CHANGED,
            json!({ "group_id": group_id, "user_id": user_id, "role": role.to_string() }),
            Some(changed_by),
        )
        .await?;
        Ok(group)
    }

    pub async fn deactivate_group(&self, group_id: &str, deactivated_by: &str) -> Result<Group, LedgerError> {
        let mut group = self.validate_group_admin(group_id, deactivated_by).await?;
        Self::ensure_group_active(&group)?;
        group.lifecycle = Lifecycle::Deactivated { at: Utc::now() };
        self.storage.save_group(group.clone()).await?;

        self.log_and_audit(
            Some(group_id),
            GROUP_DEACTIVATED,
            json!({ "group_id": group_id, "name": group.name }),
            Some(deactivated_by),
        )
        .await?;
        Ok(group)
    }

    // ---- expenses ----

    fn validate_participants(group: &Group, policy: &SplitPolicy) -> Result<(), LedgerError> {
        match policy.participants().into_iter().find(|user| !group.is_active_member(user)) {
            Some(outsider) => Err(LedgerError::InvalidSplitUser(outsider.to_string())),
            None => Ok(()),
        }
    }

    pub async fn create_expense(&self, request: NewExpense, created_by: &str) -> Result<ExpenseOutcome, LedgerError> {
        let group = self.validate_group_membership(&request.group_id, created_by).await?;
        Self::ensure_group_active(&group)?;
        self.validate_string_input("description", &request.description, 255)?;
        validate_amount("amount", request.amount)?;

        let paid_by = request.paid_by.unwrap_or_else(|| created_by.to_string());
        if !group.is_active_member(&paid_by) {
            return Err(LedgerError::NotGroupMember(paid_by));
        }
        Self::validate_participants(&group, &request.split)?;
        let splits = compute_splits(request.amount, &paid_by, &request.split)?;

        let now = Utc::now();
        let expense = Expense {
            id: Uuid::new_v4().to_string(),
            group_id: group.id.clone(),
            description: request.description,
            amount: request.amount,
            currency: group.currency.clone(),
            category: request.category,
            paid_by,
            created_by: created_by.to_string(),
            split_method: request.split.method(),
            splits,
            due_date: request.due_date,
            lifecycle: Lifecycle::Active,
            created_at: now,
            updated_at: now,
        };
        self.storage.save_expense(expense.clone()).await?;
        let debts = self.ledger.derive_from_expense(&expense).await?;

        self.log_and_audit(
            Some(&group.id),
            EXPENSE_ADDED,
            json!({
                "expense_id": expense.id,
                "group_id": group.id,
                "description": expense.description,
                "amount": expense.amount,
                "paid_by": expense.paid_by,
                "debt_count": debts.len()
            }),
            Some(created_by),
        )
        .await?;
        Ok(ExpenseOutcome { expense, debts })
    }

    pub async fn get_expense(&self, expense_id: &str, user_id: &str) -> Result<Expense, LedgerError> {
        let expense = self.load_expense(expense_id).await?;
        self.validate_group_membership(&expense.group_id, user_id).await?;
        Ok(expense)
    }

    pub async fn list_group_expenses(&self, group_id: &str, user_id: &str) -> Result<Vec<Expense>, LedgerError> {
        self.validate_group_membership(group_id, user_id).await?;
        let expenses = self.storage.get_group_expenses(group_id).await?;
        Ok(expenses.into_iter().filter(Expense::is_active).collect())
    }

    /// Payer only. Re-splits when the amount or split changes, then rebuilds the group's pending debts.
    pub async fn update_expense(
        &self,
        expense_id: &str,
        changes: ExpenseChanges,
        updated_by: &str,
    ) -> Result<ExpenseOutcome, LedgerError> {
        let mut expense = self.load_expense(expense_id).await?;
        if !expense.is_active() {
            return Err(LedgerError::ExpenseInactive(expense_id.to_string()));
        }
        let group = self.validate_group_membership(&expense.group_id, updated_by).await?;
        Self::ensure_group_active(&group)?;
        if expense.paid_by != updated_by {
            return Err(LedgerError::NotExpensePayer(updated_by.to_string()));
        }

        if let Some(description) = changes.description {
            self.validate_string_input("description", &description, 255)?;
            expense.description = description;
        }
        if let Some(category) = changes.category {
            expense.category = category;
        }
        if changes.due_date.is_some() {
            expense.due_date = changes.due_date;
        }
        if changes.amount.is_some() || changes.split.is_some() {
            let amount = changes.amount.unwrap_or(expense.amount);
            validate_amount("amount", amount)?;
            let policy = match changes.split {
                Some(policy) => policy,
                None => policy_from_splits(&expense),
            };
            Self::validate_participants(&group, &policy)?;
            expense.splits = compute_splits(amount, &expense.paid_by, &policy)?;
            expense.split_method = policy.method();
            expense.amount = amount;
        }
        expense.updated_at = Utc::now();

        self.storage.save_expense(expense.clone()).await?;
        let report = self.ledger.recalculate_group(&expense.group_id).await?;
        let debts = self
            .storage
            .get_group_debts(&expense.group_id)
            .await?
            .into_iter()
            .filter(|d| d.expense_id == expense.id)
            .collect();

        self.log_and_audit(
            Some(&expense.group_id),
            EXPENSE_UPDATED,
            json!({
                "expense_id": expense.id,
                "amount": expense.amount,
                "created": report.created,
                "updated": report.updated,
                "removed": report.removed
            }),
            Some(updated_by),
        )
        .await?;
        Ok(ExpenseOutcome { expense, debts })
    }

    /// Payer only. Logical delete; pending debts of the expense disappear, paid ones stay.
    pub async fn delete_expense(&self, expense_id: &str, deleted_by: &str) -> Result<RecalculationReport, LedgerError> {
        let mut expense = self.load_expense(expense_id).await?;
        if !expense.is_active() {
            return Err(LedgerError::ExpenseInactive(expense_id.to_string()));
        }
        self.validate_group_membership(&expense.group_id, deleted_by).await?;
        if expense.paid_by != deleted_by {
            return Err(LedgerError::NotExpensePayer(deleted_by.to_string()));
        }

        let now = Utc::now();
        expense.lifecycle = Lifecycle::Deactivated { at: now };
        expense.updated_at = now;
        self.storage.save_expense(expense.clone()).await?;
        let report = self.ledger.recalculate_group(&expense.group_id).await?;

        self.log_and_audit(
            Some(&expense.group_id),
            EXPENSE_DELETED,
            json!({ "expense_id": expense.id, "removed": report.removed }),
            Some(deleted_by),
        )
        .await?;
        Ok(report)
    }

    // ---- debts ----

    pub async fn list_my_debts(&self, user_id: &str, role: DebtRole) -> Result<Vec<Debt>, LedgerError> {
        let debts = self.storage.get_user_debts(user_id).await?;
        Ok(debts
            .into_iter()
            .filter(|d| match role {
                DebtRole::Debtor => d.debtor_id == user_id,
                DebtRole::Creditor => d.creditor_id == user_id,
                DebtRole::All => true,
            })
            .collect())
    }

    pub async fn get_debt(&self, debt_id: &str, user_id: &str) -> Result<Debt, LedgerError> {
        let debt = self.load_debt(debt_id).await?;
        if !debt.involves(user_id) {
            self.validate_group_membership(&debt.group_id, user_id).await?;
        }
        Ok(debt)
    }

    pub async fn add_payment(
        &self,
        debt_id: &str,
        amount: Decimal,
        note: Option<String>,
        paid_by: &str,
    ) -> Result<Debt, LedgerError> {
        self.load_debt_for_party(debt_id, paid_by).await?;
        let debt = self.ledger.add_partial_payment(debt_id, amount, note).await?;

        self.log_and_audit(
            Some(&debt.group_id),
            PAYMENT_RECORDED,
            json!({ "debt_id": debt.id, "amount": amount, "outstanding": debt.outstanding }),
            Some(paid_by),
        )
        .await?;
        Ok(debt)
    }

    pub async fn settle_debt(
        &self,
        debt_id: &str,
        method: Option<PaymentMethod>,
        proof: Option<String>,
        settled_by: &str,
    ) -> Result<Debt, LedgerError> {
        self.load_debt_for_party(debt_id, settled_by).await?;
        let debt = self.ledger.mark_paid(debt_id, method, proof).await?;

        self.log_and_audit(
            Some(&debt.group_id),
            DEBT_SETTLED,
            json!({ "debt_id": debt.id, "amount": debt.original_amount }),
            Some(settled_by),
        )
        .await?;
        Ok(debt)
    }

    pub async fn recalculate_group(&self, group_id: &str, user_id: &str) -> Result<RecalculationReport, LedgerError> {
        self.validate_group_membership(group_id, user_id).await?;
        let report = self.ledger.recalculate_group(group_id).await?;

        self.log_and_audit(
            Some(group_id),
            DEBTS_RECALCULATED,
            json!({ "created": report.created, "updated": report.updated, "removed": report.removed }),
            Some(user_id),
        )
        .await?;
        Ok(report)
    }

    pub async fn optimize_group(&self, group_id: &str, user_id: &str) -> Result<NettingOutcome, LedgerError> {
        self.validate_group_membership(group_id, user_id).await?;
        let outcome = self.ledger.optimize(group_id).await?;

        self.log_and_audit(
            Some(group_id),
            DEBTS_OPTIMIZED,
            json!({ "settled": outcome.settled, "reduced": outcome.reduced }),
            Some(user_id),
        )
        .await?;
        Ok(outcome)
    }

    // ---- balances ----

    pub async fn net_balance(&self, user_id: &str, group_id: Option<&str>) -> Result<Decimal, LedgerError> {
        if let Some(group_id) = group_id {
            self.validate_group_membership(group_id, user_id).await?;
        }
        self.balances.net_balance(user_id, group_id).await
    }

    pub async fn user_summary(&self, user_id: &str) -> Result<UserSummary, LedgerError> {
        self.balances.user_summary(user_id).await
    }

    pub async fn group_summary(&self, group_id: &str, user_id: &str) -> Result<GroupSummary, LedgerError> {
        self.validate_group_membership(group_id, user_id).await?;
        self.balances.group_summary(group_id, Utc::now()).await
    }

    pub async fn overdue_debts(&self, user_id: &str, group_id: Option<&str>) -> Result<Vec<Debt>, LedgerError> {
        match group_id {
            Some(group_id) => {
                self.validate_group_membership(group_id, user_id).await?;
                self.balances.overdue_debts(None, Some(group_id), Utc::now()).await
            }
            None => self.balances.overdue_debts(Some(user_id), None, Utc::now()).await,
        }
    }

    /// Suggested payments that would clear every open balance in the group.
    pub async fn group_transfers(&self, group_id: &str, user_id: &str) -> Result<Vec<Transfer>, LedgerError> {
        self.validate_group_membership(group_id, user_id).await?;
        let balances = self.balances.group_balances(group_id).await?;
        Ok(minimal_transfers(&balances))
    }

    // ---- reminders ----

    /// Sends one reminder per due debt to its debtor. A debt is marked
    /// reminded only when delivery succeeded and the stamp was stored; any
    /// per-debt failure is listed in the report and stays due for the next sweep.
    pub async fn run_reminder_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, LedgerError> {
        let due = self.reminders.due_for_reminder(now).await?;
        let mut report = SweepReport {
            due: due.len(),
            ..Default::default()
        };

        for debt in due {
            let creditor = match self.storage.get_user(&debt.creditor_id).await {
                Ok(Some(user)) => user.name,
                _ => debt.creditor_id.clone(),
            };
            let text = format!(
                "Reminder: you owe {} {} {}{}",
                creditor,
                debt.outstanding,
                debt.currency,
                debt.due_date
                    .map(|due| format!(" (due {})", due.format("%Y-%m-%d")))
                    .unwrap_or_default()
            );
            if let Err(err) = self.notifier.send(&debt.debtor_id, &text).await {
                warn!(debt_id = %debt.id, debtor_id = %debt.debtor_id, error = %err, "reminder not delivered");
                report.failed.push(debt.id);
                continue;
            }
            match self.ledger.record_reminder_sent(&debt.id, now).await {
                Ok(_) => report.sent += 1,
                Err(err) => {
                    warn!(debt_id = %debt.id, error = %err, "reminder sent but not recorded");
                    report.failed.push(debt.id);
                }
            }
        }

        info!(due = report.due, sent = report.sent, failed = report.failed.len(), "reminder sweep finished");
        self.log_and_audit(
            None,
            REMINDERS_SWEPT,
            json!({ "due": report.due, "sent": report.sent, "failed": report.failed }),
            None,
        )
        .await?;
        Ok(report)
    }

    // ---- webhook ----

    pub async fn handle_webhook(&self, event: WebhookEvent, now: DateTime<Utc>) -> Result<WebhookOutcome, LedgerError> {
        if !self.webhook_limiter.check(&event.source, now).await {
            warn!(source = %event.source, "webhook rate limited");
            return Err(LedgerError::RateLimited(event.source));
        }

        let outcome = match event.user_id {
            Some(user_id) if event.text.trim().eq_ignore_ascii_case(WEBHOOK_BALANCE_COMMAND) => {
                let net = self.balances.net_balance(&user_id, None).await?;
                let text = if net > Decimal::ZERO {
                    format!("Others owe you {}", net)
                } else if net < Decimal::ZERO {
                    format!("You owe {}", -net)
                } else {
                    "You are all settled up".to_string()
                };
                if let Err(err) = self.notifier.send(&user_id, &text).await {
                    warn!(user_id = %user_id, error = %err, "balance reply not delivered");
                }
                WebhookOutcome::Replied { target_id: user_id }
            }
            _ => WebhookOutcome::Ignored,
        };

        self.log_and_audit(
            None,
            WEBHOOK_HANDLED,
            json!({ "source": event.source, "outcome": outcome }),
            None,
        )
        .await?;
        Ok(outcome)
    }

    // ---- logs ----

    pub async fn get_group_audits(&self, group_id: &str, user_id: &str) -> Result<Vec<GroupAudit>, LedgerError> {
        self.validate_group_membership(group_id, user_id).await?;
        self.storage.get_group_audits(group_id).await
    }

    pub async fn get_app_logs(&self) -> Result<Vec<AppLog>, LedgerError> {
        self.logging.get_logs().await
    }
}

/// Rebuilds the policy an expense was split with, for re-splitting a new amount.
fn policy_from_splits(expense: &Expense) -> SplitPolicy {
    match expense.split_method {
        SplitMethod::Equal => SplitPolicy::Equal {
            participants: expense.splits.iter().map(|s| s.user_id.clone()).collect(),
        },
        SplitMethod::Custom => SplitPolicy::Custom {
            shares: expense.splits.iter().map(|s| (s.user_id.clone(), s.amount)).collect(),
        },
        SplitMethod::Percentage => SplitPolicy::Percentage {
            shares: expense
                .splits
                .iter()
                .map(|s| (s.user_id.clone(), s.percentage.unwrap_or_default()))
                .collect(),
        },
    }
}
