//! Debt ledger: the single writer for a group's pairwise debts.
//!
//! Every mutation of a group's debts runs under that group's lock, so two
//! concurrent expense edits cannot interleave a rebuild, and two payments on
//! the same debt cannot both pass the outstanding-amount check. Groups never
//! share a lock.

use crate::core::errors::LedgerError;
use crate::core::models::balance::Transfer;
use crate::core::models::debt::{
    Debt, DebtKey, DebtStatus, PaymentKind, PaymentMethod, PaymentRecord, ReminderState,
};
use crate::core::models::expense::Expense;
use crate::core::money::{EPSILON, is_dust, round2, validate_amount};
use crate::core::reminders::apply_reminder;
use crate::infrastructure::storage::{DebtChangeSet, Storage};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;

pub const NETTED_NOTE: &str = "netted";

#[derive(Clone, Copy, Debug)]
pub struct LedgerSettings {
    /// Days after the expense date at which derived debts fall due
    pub due_days: i64,
    pub reminder_interval_hours: i64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            due_days: 7,
            reminder_interval_hours: 24,
        }
    }
}

/// Lazily created async mutex per group id.
#[derive(Default)]
pub struct GroupLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl GroupLocks {
    pub async fn acquire(&self, group_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(group_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

#[derive(Clone, Debug, Default, Serialize, ToSchema, PartialEq, Eq)]
pub struct RecalculationReport {
    pub group_id: String,
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
    /// Keys skipped because a paid, partially paid or netted debt already holds them
    pub retained: usize,
}

#[derive(Clone, Debug, Default, Serialize, ToSchema, PartialEq, Eq)]
pub struct NettingOutcome {
    /// Debts closed as netted
    pub settled: Vec<String>,
    /// Debts left open with a reduced outstanding amount
    pub reduced: Vec<String>,
}

impl NettingOutcome {
    pub fn is_empty(&self) -> bool {
        self.settled.is_empty() && self.reduced.is_empty()
    }
}

pub struct DebtLedger<S: Storage> {
    storage: Arc<S>,
    locks: GroupLocks,
    settings: LedgerSettings,
}

impl<S: Storage> DebtLedger<S> {
    pub fn new(storage: Arc<S>, settings: LedgerSettings) -> Self {
        DebtLedger {
            storage,
            locks: GroupLocks::default(),
            settings,
        }
    }

    pub fn settings(&self) -> LedgerSettings {
        self.settings
    }

    /// Upserts one debt per non-payer split, keyed by `(debtor, payer, expense)`.
    pub async fn derive_from_expense(&self, expense: &Expense) -> Result<Vec<Debt>, LedgerError> {
        if !expense.is_active() {
            return Err(LedgerError::ExpenseInactive(expense.id.clone()));
        }
        let _guard = self.locks.acquire(&expense.group_id).await;
        let now = Utc::now();
        let mut derived = Vec::new();

        for debt in self.expected_debts(expense, now) {
            let stored = match self.storage.insert_debt(debt.clone()).await {
                Ok(()) => debt,
                Err(err) if err.is_conflict() => self.reconcile_existing(debt, now).await?,
                Err(err) => return Err(err),
            };
            derived.push(stored);
        }

        debug!(expense_id = %expense.id, count = derived.len(), "derived debts from expense");
        Ok(derived)
    }

    /// Resolves a key collision as an update of the existing record.
    async fn reconcile_existing(&self, wanted: Debt, now: DateTime<Utc>) -> Result<Debt, LedgerError> {
        let existing = self
            .storage
            .find_debt_by_key(&wanted.key())
            .await?
            .ok_or_else(|| LedgerError::InternalServerError("debt key vanished during upsert".to_string()))?;
        if !existing.is_pristine() || matches_expectation(&existing, &wanted) {
            return Ok(existing);
        }
        let updated = Debt {
            original_amount: wanted.original_amount,
            outstanding: wanted.original_amount,
            due_date: wanted.due_date,
            currency: wanted.currency,
            updated_at: now,
            ..existing
        };
        self.storage.save_debt(updated.clone()).await?;
        Ok(updated)
    }

    /// Rebuilds the group's pristine pending debts from its active expenses.
    pub async fn recalculate_group(&self, group_id: &str) -> Result<RecalculationReport, LedgerError> {
        let _guard = self.locks.acquire(group_id).await;
        let now = Utc::now();
        let expenses = self.storage.get_group_expenses(group_id).await?;
        let current = self.storage.get_group_debts(group_id).await?;

        let retained_keys: HashSet<DebtKey> = current.iter().filter(|d| !d.is_pristine()).map(Debt::key).collect();
        let mut wanted: BTreeMap<DebtKey, Debt> = BTreeMap::new();
        for expense in expenses.iter().filter(|e| e.is_active()) {
            for debt in self.expected_debts(expense, now) {
                if !retained_keys.contains(&debt.key()) {
                    wanted.insert(debt.key(), debt);
                }
            }
        }

        let mut report = RecalculationReport {
            group_id: group_id.to_string(),
            retained: retained_keys.len(),
            ..Default::default()
        };
        let mut changes = DebtChangeSet::default();
        for existing in current.into_iter().filter(Debt::is_pristine) {
            match wanted.remove(&existing.key()) {
                Some(target) if matches_expectation(&existing, &target) => report.unchanged += 1,
                Some(target) => {
                    report.updated += 1;
                    changes.upsert.push(Debt {
                        original_amount: target.original_amount,
                        outstanding: target.original_amount,
                        due_date: target.due_date,
                        currency: target.currency,
                        updated_at: now,
                        ..existing
                    });
                }
                None => {
                    report.removed += 1;
                    changes.remove.push(existing.id);
                }
            }
        }
        report.created = wanted.len();
        changes.upsert.extend(wanted.into_values());

        if !changes.is_empty() {
            self.storage.apply_debt_changes(group_id, changes).await?;
        }
        info!(
            group_id,
            created = report.created,
            updated = report.updated,
            removed = report.removed,
            "recalculated group debts"
        );
        Ok(report)
    }

    pub async fn add_partial_payment(
        &self,
        debt_id: &str,
        amount: Decimal,
        note: Option<String>,
    ) -> Result<Debt, LedgerError> {
        let group_id = self.debt_group(debt_id).await?;
        let _guard = self.locks.acquire(&group_id).await;
        let mut debt = self.load_debt(debt_id).await?;
        apply_payment(&mut debt, amount, note, Utc::now())?;
        self.storage.save_debt(debt.clone()).await?;
        info!(debt_id, %amount, outstanding = %debt.outstanding, "recorded payment");
        Ok(debt)
    }

    pub async fn mark_paid(
        &self,
        debt_id: &str,
        method: Option<PaymentMethod>,
        proof: Option<String>,
    ) -> Result<Debt, LedgerError> {
        let group_id = self.debt_group(debt_id).await?;
        let _guard = self.locks.acquire(&group_id).await;
        let mut debt = self.load_debt(debt_id).await?;
        settle_in_full(&mut debt, method, proof, Utc::now())?;
        self.storage.save_debt(debt.clone()).await?;
        info!(debt_id, "debt marked paid");
        Ok(debt)
    }

    /// Stamps a delivered reminder on the debt as it stands under the group lock.
    pub async fn record_reminder_sent(&self, debt_id: &str, now: DateTime<Utc>) -> Result<Debt, LedgerError> {
        let group_id = self.debt_group(debt_id).await?;
        let _guard = self.locks.acquire(&group_id).await;
        let mut debt = self.load_debt(debt_id).await?;
        apply_reminder(&mut debt, now, self.settings.reminder_interval_hours);
        self.storage.save_debt(debt.clone()).await?;
        debug!(debt_id, count = debt.reminder.count, "reminder recorded");
        Ok(debt)
    }

    /// Nets direct mutual debts between each pair of members of the group.
    pub async fn optimize(&self, group_id: &str) -> Result<NettingOutcome, LedgerError> {
        let _guard = self.locks.acquire(group_id).await;
        let mut debts = self.storage.get_group_debts(group_id).await?;
        let outcome = net_mutual_debts(&mut debts, Utc::now());
        if outcome.is_empty() {
            return Ok(outcome);
        }

        let touched: HashSet<&String> = outcome.settled.iter().chain(outcome.reduced.iter()).collect();
        let changes = DebtChangeSet {
            remove: Vec::new(),
            upsert: debts.into_iter().filter(|d| touched.contains(&d.id)).collect(),
        };
        self.storage.apply_debt_changes(group_id, changes).await?;
        info!(
            group_id,
            settled = outcome.settled.len(),
            reduced = outcome.reduced.len(),
            "netted mutual debts"
        );
        Ok(outcome)
    }

    async fn debt_group(&self, debt_id: &str) -> Result<String, LedgerError> {
        Ok(self.load_debt(debt_id).await?.group_id)
    }

    async fn load_debt(&self, debt_id: &str) -> Result<Debt, LedgerError> {
        self.storage
            .get_debt(debt_id)
            .await?
            .ok_or_else(|| LedgerError::DebtNotFound(debt_id.to_string()))
    }

    fn expected_debts(&self, expense: &Expense, now: DateTime<Utc>) -> Vec<Debt> {
        let due_date = expense
            .due_date
            .unwrap_or_else(|| expense.created_at + Duration::days(self.settings.due_days));
        expense
            .splits
            .iter()
            .filter(|split| split.user_id != expense.paid_by && split.amount > Decimal::ZERO)
            .map(|split| Debt {
                id: Uuid::new_v4().to_string(),
                group_id: expense.group_id.clone(),
                expense_id: expense.id.clone(),
                debtor_id: split.user_id.clone(),
                creditor_id: expense.paid_by.clone(),
                currency: expense.currency.clone(),
                original_amount: split.amount,
                outstanding: split.amount,
                payments: Vec::new(),
                status: DebtStatus::Open,
                due_date: Some(due_date),
                reminder: ReminderState::default(),
                created_at: now,
                updated_at: now,
            })
            .collect()
    }
}

fn matches_expectation(existing: &Debt, wanted: &Debt) -> bool {
    existing.original_amount == wanted.original_amount
        && existing.due_date == wanted.due_date
        && existing.currency == wanted.currency
}

fn ensure_open(debt: &Debt) -> Result<(), LedgerError> {
    if debt.is_open() {
        Ok(())
    } else {
        Err(LedgerError::DebtAlreadySettled(debt.id.clone()))
    }
}

/// Records a payment; a remainder of at most one cent closes the debt.
pub fn apply_payment(
    debt: &mut Debt,
    amount: Decimal,
    note: Option<String>,
    now: DateTime<Utc>,
) -> Result<(), LedgerError> {
    ensure_open(debt)?;
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidPayment("amount must be greater than 0".to_string()));
    }
    if amount > debt.outstanding {
        return Err(LedgerError::InvalidPayment(format!(
            "amount {} exceeds outstanding {}",
            amount, debt.outstanding
        )));
    }
    validate_amount("amount", amount).map_err(|err| LedgerError::InvalidPayment(err.to_string()))?;

    debt.payments.push(PaymentRecord {
        amount,
        paid_at: now,
        note,
        kind: PaymentKind::Payment,
    });
    debt.outstanding -= amount;
    debt.updated_at = now;
    if debt.outstanding <= EPSILON {
        debt.outstanding = Decimal::ZERO;
        debt.status = DebtStatus::Paid {
            paid_at: now,
            method: None,
            proof: None,
        };
    }
    Ok(())
}

/// Closes the debt with a synthesized payment for whatever is still outstanding.
pub fn settle_in_full(
    debt: &mut Debt,
    method: Option<PaymentMethod>,
    proof: Option<String>,
    now: DateTime<Utc>,
) -> Result<(), LedgerError> {
    ensure_open(debt)?;
    if debt.outstanding > Decimal::ZERO {
        debt.payments.push(PaymentRecord {
            amount: debt.outstanding,
            paid_at: now,
            note: Some("settled in full".to_string()),
            kind: PaymentKind::Payment,
        });
    }
    debt.outstanding = Decimal::ZERO;
    debt.status = DebtStatus::Paid {
        paid_at: now,
        method,
        proof,
    };
    debt.updated_at = now;
    Ok(())
}

fn apply_netting(debt: &mut Debt, amount: Decimal, counter_debt_id: &str, now: DateTime<Utc>) {
    debt.payments.push(PaymentRecord {
        amount,
        paid_at: now,
        note: Some(NETTED_NOTE.to_string()),
        kind: PaymentKind::Netting {
            counter_debt_id: counter_debt_id.to_string(),
        },
    });
    debt.outstanding -= amount;
    debt.updated_at = now;
    if debt.outstanding <= EPSILON {
        debt.outstanding = Decimal::ZERO;
        debt.status = DebtStatus::Netted { paid_at: now };
    }
}

/// Cancels opposite-direction open debts pair by pair. Only direct pairs are
/// considered; cycles through a third member are left as they are.
///
/// Within a direction, the oldest debts absorb the netting first.
pub fn net_mutual_debts(debts: &mut [Debt], now: DateTime<Utc>) -> NettingOutcome {
    // (low, high) -> (indexes of low->high, indexes of high->low)
    let mut pairs: BTreeMap<(String, String), (Vec<usize>, Vec<usize>)> = BTreeMap::new();
    for (i, debt) in debts.iter().enumerate().filter(|(_, d)| d.is_open()) {
        if debt.debtor_id < debt.creditor_id {
            let key = (debt.debtor_id.clone(), debt.creditor_id.clone());
            pairs.entry(key).or_default().0.push(i);
        } else {
            let key = (debt.creditor_id.clone(), debt.debtor_id.clone());
            pairs.entry(key).or_default().1.push(i);
        }
    }

    let mut outcome = NettingOutcome::default();
    for (forward, backward) in pairs.into_values() {
        if forward.is_empty() || backward.is_empty() {
            continue;
        }
        let forward_total: Decimal = forward.iter().map(|&i| debts[i].outstanding).sum();
        let backward_total: Decimal = backward.iter().map(|&i| debts[i].outstanding).sum();
        let net = forward_total - backward_total;

        let (larger, smaller, cancelled) = if net.abs() <= EPSILON {
            (forward, backward, forward_total)
        } else if net > Decimal::ZERO {
            (forward, backward, backward_total)
        } else {
            (backward, forward, forward_total)
        };

        let larger_anchor = debts[larger[0]].id.clone();
        let smaller_anchor = debts[smaller[0]].id.clone();
        for &i in &smaller {
            let amount = debts[i].outstanding;
            apply_netting(&mut debts[i], amount, &larger_anchor, now);
            outcome.settled.push(debts[i].id.clone());
        }

        let mut remaining = cancelled;
        for &i in &larger {
            if is_dust(remaining) && net.abs() > EPSILON {
                break;
            }
            let take = if net.abs() <= EPSILON {
                debts[i].outstanding
            } else {
                remaining.min(debts[i].outstanding)
            };
            remaining -= take;
            apply_netting(&mut debts[i], take, &smaller_anchor, now);
            if debts[i].is_open() {
                outcome.reduced.push(debts[i].id.clone());
            } else {
                outcome.settled.push(debts[i].id.clone());
            }
        }
    }
    outcome
}

/// Greedy balance-sheet settlement. Positive balances are owed money,
/// negative balances owe it. The largest creditor is matched against the
/// largest debtor until every balance is within a cent of zero.
pub fn minimal_transfers(balances: &[(String, Decimal)]) -> Vec<Transfer> {
    let mut creditors: Vec<(String, Decimal)> = balances
        .iter()
        .filter(|(_, amount)| *amount >= EPSILON)
        .cloned()
        .collect();
    let mut debtors: Vec<(String, Decimal)> = balances
        .iter()
        .filter(|(_, amount)| *amount <= -EPSILON)
        .map(|(id, amount)| (id.clone(), -*amount))
        .collect();

    let by_size = |a: &(String, Decimal), b: &(String, Decimal)| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0));
    let mut transfers = Vec::new();
    while !creditors.is_empty() && !debtors.is_empty() {
        creditors.sort_by(by_size);
        debtors.sort_by(by_size);

        let amount = round2(creditors[0].1.min(debtors[0].1));
        if amount >= EPSILON {
            transfers.push(Transfer {
                debtor_id: debtors[0].0.clone(),
                creditor_id: creditors[0].0.clone(),
                amount,
            });
        }
        creditors[0].1 -= amount;
        debtors[0].1 -= amount;

        if creditors[0].1 < EPSILON {
            creditors.remove(0);
        }
        if debtors[0].1 < EPSILON {
            debtors.remove(0);
        }
    }
    transfers
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn debt(id: &str, debtor: &str, creditor: &str, amount: i64) -> Debt {
        let created = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        Debt {
            id: id.to_string(),
            group_id: "g".to_string(),
            expense_id: format!("e-{}", id),
            debtor_id: debtor.to_string(),
            creditor_id: creditor.to_string(),
            currency: "THB".to_string(),
            original_amount: Decimal::from(amount),
            outstanding: Decimal::from(amount),
            payments: Vec::new(),
            status: DebtStatus::Open,
            due_date: None,
            reminder: ReminderState::default(),
            created_at: created,
            updated_at: created,
        }
    }

    fn find<'a>(debts: &'a [Debt], id: &str) -> &'a Debt {
        debts.iter().find(|d| d.id == id).unwrap()
    }

    #[test]
    fn netting_reduces_larger_side_and_closes_smaller() {
        let mut debts = vec![debt("ab", "A", "B", 100), debt("ba", "B", "A", 40)];
        let outcome = net_mutual_debts(&mut debts, Utc::now());

        let ab = find(&debts, "ab");
        assert_eq!(ab.outstanding, Decimal::from(60));
        assert!(ab.is_open());
        let ba = find(&debts, "ba");
        assert!(matches!(ba.status, DebtStatus::Netted { .. }));
        assert_eq!(ba.outstanding, Decimal::ZERO);
        assert_eq!(outcome.settled, vec!["ba".to_string()]);
        assert_eq!(outcome.reduced, vec!["ab".to_string()]);
    }

    #[test]
    fn equal_mutual_debts_both_settle() {
        let mut debts = vec![debt("ab", "A", "B", 50), debt("ba", "B", "A", 50)];
        let outcome = net_mutual_debts(&mut debts, Utc::now());
        assert!(debts.iter().all(|d| !d.is_open()));
        assert_eq!(outcome.settled.len(), 2);
        assert!(outcome.reduced.is_empty());
    }

    #[test]
    fn reverse_direction_larger() {
        let mut debts = vec![debt("ab", "A", "B", 30), debt("ba", "B", "A", 80)];
        net_mutual_debts(&mut debts, Utc::now());
        assert_eq!(find(&debts, "ba").outstanding, Decimal::from(50));
        assert!(!find(&debts, "ab").is_open());
    }

    #[test]
    fn cycles_are_not_cancelled() {
        let mut debts = vec![
            debt("ab", "A", "B", 10),
            debt("bc", "B", "C", 10),
            debt("ca", "C", "A", 10),
        ];
        let outcome = net_mutual_debts(&mut debts, Utc::now());
        assert!(outcome.is_empty());
        assert!(debts.iter().all(|d| d.is_open() && d.outstanding == Decimal::from(10)));
    }

    #[test]
    fn netting_spreads_over_several_debts_oldest_first() {
        let mut debts = vec![
            debt("ab1", "A", "B", 30),
            debt("ab2", "A", "B", 30),
            debt("ba", "B", "A", 40),
        ];
        net_mutual_debts(&mut debts, Utc::now());
        assert!(!find(&debts, "ab1").is_open());
        assert_eq!(find(&debts, "ab2").outstanding, Decimal::from(20));
        assert!(!find(&debts, "ba").is_open());
        let open_total: Decimal = debts.iter().filter(|d| d.is_open()).map(|d| d.outstanding).sum();
        assert_eq!(open_total, Decimal::from(20));
    }

    #[test]
    fn overpayment_is_rejected_without_mutation() {
        let mut d = debt("ab", "A", "B", 100);
        let err = apply_payment(&mut d, Decimal::from(150), None, Utc::now()).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidPayment(_)));
        assert_eq!(d.outstanding, Decimal::from(100));
        assert!(d.payments.is_empty());
    }

    #[rstest]
    #[case::zero(Decimal::ZERO)]
    #[case::negative(Decimal::from(-5))]
    #[case::sub_cent(Decimal::new(1005, 3))]
    fn invalid_payment_amounts(#[case] amount: Decimal) {
        let mut d = debt("ab", "A", "B", 100);
        assert!(matches!(
            apply_payment(&mut d, amount, None, Utc::now()),
            Err(LedgerError::InvalidPayment(_))
        ));
    }

    #[test]
    fn partial_then_final_payment_closes_debt() {
        let mut d = debt("ab", "A", "B", 100);
        apply_payment(&mut d, Decimal::from(40), Some("first".into()), Utc::now()).unwrap();
        assert_eq!(d.state(), crate::core::models::debt::DebtState::PartiallyPaid);
        apply_payment(&mut d, Decimal::from(60), None, Utc::now()).unwrap();
        assert_eq!(d.state(), crate::core::models::debt::DebtState::Paid);
        assert_eq!(d.outstanding, Decimal::ZERO);
        assert!(matches!(
            apply_payment(&mut d, Decimal::ONE, None, Utc::now()),
            Err(LedgerError::DebtAlreadySettled(_))
        ));
    }

    #[test]
    fn settle_in_full_synthesizes_final_payment() {
        let mut d = debt("ab", "A", "B", 100);
        apply_payment(&mut d, Decimal::from(25), None, Utc::now()).unwrap();
        settle_in_full(&mut d, Some(PaymentMethod::Cash), Some("slip.png".into()), Utc::now()).unwrap();
        assert_eq!(d.payments.len(), 2);
        assert_eq!(d.payments[1].amount, Decimal::from(75));
        assert!(matches!(
            d.status,
            DebtStatus::Paid {
                method: Some(PaymentMethod::Cash),
                ..
            }
        ));
    }

    #[test]
    fn minimal_transfers_matches_largest_first() {
        let balances = vec![
            ("A".to_string(), Decimal::from(600)),
            ("B".to_string(), Decimal::from(-300)),
            ("C".to_string(), Decimal::from(-300)),
        ];
        let transfers = minimal_transfers(&balances);
        assert_eq!(transfers.len(), 2);
        assert!(transfers.iter().all(|t| t.creditor_id == "A" && t.amount == Decimal::from(300)));
    }

    #[test]
    fn minimal_transfers_uses_fewer_payments_than_pairwise() {
        // A owes B 10, B owes C 10: one transfer from A to C
        let balances = vec![
            ("A".to_string(), Decimal::from(-10)),
            ("B".to_string(), Decimal::ZERO),
            ("C".to_string(), Decimal::from(10)),
        ];
        assert_eq!(
            minimal_transfers(&balances),
            vec![Transfer {
                debtor_id: "A".to_string(),
                creditor_id: "C".to_string(),
                amount: Decimal::from(10),
            }]
        );
    }

    #[test]
    fn minimal_transfers_ignores_dust() {
        let balances = vec![
            ("A".to_string(), Decimal::new(5, 3)),
            ("B".to_string(), Decimal::new(-5, 3)),
        ];
        assert!(minimal_transfers(&balances).is_empty());
    }
}
