//! Read-only views over the debt ledger.

use crate::core::errors::LedgerError;
use crate::core::models::balance::{
    GroupBalance, GroupSummary, PendingTotals, UserBreakdown, UserSummary,
};
use crate::core::models::debt::Debt;
use crate::infrastructure::storage::Storage;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

pub struct BalanceAggregator<S: Storage> {
    storage: Arc<S>,
}

impl<S: Storage> BalanceAggregator<S> {
    pub fn new(storage: Arc<S>) -> Self {
        BalanceAggregator { storage }
    }

    /// Positive when others owe the user money.
    pub async fn net_balance(&self, user_id: &str, group_id: Option<&str>) -> Result<Decimal, LedgerError> {
        let debts = match group_id {
            Some(group_id) => self.storage.get_group_debts(group_id).await?,
            None => self.storage.get_user_debts(user_id).await?,
        };
        Ok(breakdown_for(&debts, user_id).net)
    }

    pub async fn group_summary(&self, group_id: &str, now: DateTime<Utc>) -> Result<GroupSummary, LedgerError> {
        let group = self
            .storage
            .get_group(group_id)
            .await?
            .ok_or_else(|| LedgerError::GroupNotFound(group_id.to_string()))?;
        let debts = self.storage.get_group_debts(group_id).await?;
        let mut summary = summarize(group_id, &group.currency, &debts, now);

        // Members with nothing outstanding still get a zero row
        for user_id in group.active_member_ids() {
            if !summary.members.iter().any(|m| m.user_id == user_id) {
                summary.members.push(UserBreakdown {
                    user_id,
                    ..Default::default()
                });
            }
        }
        summary.members.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(summary)
    }

    /// Open debts past their due date, scoped to a group, a user, or both.
    pub async fn overdue_debts(
        &self,
        user_id: Option<&str>,
        group_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Debt>, LedgerError> {
        let debts = match (user_id, group_id) {
            (_, Some(group_id)) => self.storage.get_group_debts(group_id).await?,
            (Some(user_id), None) => self.storage.get_user_debts(user_id).await?,
            (None, None) => {
                return Err(LedgerError::invalid_input(
                    "scope",
                    "Missing Scope",
                    "Overdue debts need a user or a group",
                ));
            }
        };
        Ok(debts
            .into_iter()
            .filter(|d| d.is_overdue(now) && user_id.is_none_or(|u| d.involves(u)))
            .collect())
    }

    /// Per-group net balances plus totals. A group whose debts cannot be read
    /// is listed in `incomplete_groups` and left out of the totals.
    pub async fn user_summary(&self, user_id: &str) -> Result<UserSummary, LedgerError> {
        let groups = self.storage.get_user_groups(user_id).await?;
        let mut summary = UserSummary {
            user_id: user_id.to_string(),
            total_owed: Decimal::ZERO,
            total_owing: Decimal::ZERO,
            net: Decimal::ZERO,
            groups: Vec::new(),
            incomplete_groups: Vec::new(),
        };

        for group in groups {
            let debts = match self.storage.get_group_debts(&group.id).await {
                Ok(debts) => debts,
                Err(err) => {
                    warn!(group_id = %group.id, user_id, error = %err, "skipping group in user summary");
                    summary.incomplete_groups.push(group.id);
                    continue;
                }
            };
            let row = breakdown_for(&debts, user_id);
            summary.total_owed += row.owed;
            summary.total_owing += row.owing;
            summary.groups.push(GroupBalance {
                group_id: group.id,
                group_name: group.name,
                currency: group.currency,
                net: row.net,
            });
        }
        summary.net = summary.total_owed - summary.total_owing;
        Ok(summary)
    }

    /// Net balance of every member with open debts in the group.
    pub async fn group_balances(&self, group_id: &str) -> Result<Vec<(String, Decimal)>, LedgerError> {
        let debts = self.storage.get_group_debts(group_id).await?;
        Ok(net_balances(&debts).into_iter().collect())
    }
}

pub fn breakdown_for(debts: &[Debt], user_id: &str) -> UserBreakdown {
    let mut row = UserBreakdown {
        user_id: user_id.to_string(),
        ..Default::default()
    };
    for debt in debts.iter().filter(|d| d.is_open()) {
        if debt.creditor_id == user_id {
            row.owed += debt.outstanding;
        }
        if debt.debtor_id == user_id {
            row.owing += debt.outstanding;
        }
    }
    row.net = row.owed - row.owing;
    row
}

pub fn net_balances(debts: &[Debt]) -> BTreeMap<String, Decimal> {
    let mut balances: BTreeMap<String, Decimal> = BTreeMap::new();
    for debt in debts.iter().filter(|d| d.is_open()) {
        *balances.entry(debt.creditor_id.clone()).or_default() += debt.outstanding;
        *balances.entry(debt.debtor_id.clone()).or_default() -= debt.outstanding;
    }
    balances
}

pub fn summarize(group_id: &str, currency: &str, debts: &[Debt], now: DateTime<Utc>) -> GroupSummary {
    let mut pending = PendingTotals::default();
    let mut overdue_count = 0;
    let mut settled_count = 0;
    let mut members: BTreeMap<&str, UserBreakdown> = BTreeMap::new();

    for debt in debts {
        if !debt.is_open() {
            settled_count += 1;
            continue;
        }
        pending.amount += debt.outstanding;
        pending.count += 1;
        if debt.is_overdue(now) {
            overdue_count += 1;
        }
        members
            .entry(debt.creditor_id.as_str())
            .or_insert_with(|| UserBreakdown {
                user_id: debt.creditor_id.clone(),
                ..Default::default()
            })
            .owed += debt.outstanding;
        members
            .entry(debt.debtor_id.as_str())
            .or_insert_with(|| UserBreakdown {
                user_id: debt.debtor_id.clone(),
                ..Default::default()
            })
            .owing += debt.outstanding;
    }

    GroupSummary {
        group_id: group_id.to_string(),
        currency: currency.to_string(),
        pending,
        overdue_count,
        settled_count,
        members: members
            .into_values()
            .map(|mut row| {
                row.net = row.owed - row.owing;
                row
            })
            .collect(),
    }
}
