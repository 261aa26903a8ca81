use crate::core::errors::LedgerError;
use crate::core::models::debt::Debt;
use crate::infrastructure::storage::Storage;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

pub struct ReminderScheduler<S: Storage> {
    storage: Arc<S>,
}

impl<S: Storage> ReminderScheduler<S> {
    pub fn new(storage: Arc<S>) -> Self {
        ReminderScheduler { storage }
    }

    /// Open debts that were never reminded or whose next reminder is due.
    pub async fn due_for_reminder(&self, now: DateTime<Utc>) -> Result<Vec<Debt>, LedgerError> {
        let debts = self.storage.get_debts_due_for_reminder(now).await?;
        Ok(debts.into_iter().filter(|d| is_due(d, now)).collect())
    }
}

pub fn is_due(debt: &Debt, now: DateTime<Utc>) -> bool {
    debt.is_open() && debt.reminder.next_due.is_none_or(|next| next <= now)
}

/// Reminder bookkeeping is the only mutation allowed on settled debts.
pub fn apply_reminder(debt: &mut Debt, now: DateTime<Utc>, interval_hours: i64) {
    debt.reminder.count += 1;
    debt.reminder.last_sent = Some(now);
    debt.reminder.next_due = Some(now + Duration::hours(interval_hours.max(1)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::debt::{DebtStatus, ReminderState};
    use rust_decimal::Decimal;

    fn debt() -> Debt {
        let now = Utc::now();
        Debt {
            id: "d1".to_string(),
            group_id: "g".to_string(),
            expense_id: "e".to_string(),
            debtor_id: "B".to_string(),
            creditor_id: "A".to_string(),
            currency: "THB".to_string(),
            original_amount: Decimal::from(10),
            outstanding: Decimal::from(10),
            payments: Vec::new(),
            status: DebtStatus::Open,
            due_date: None,
            reminder: ReminderState::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn never_reminded_debt_is_due() {
        assert!(is_due(&debt(), Utc::now()));
    }

    #[test]
    fn reminder_pushes_next_due_by_interval() {
        let now = Utc::now();
        let mut d = debt();
        apply_reminder(&mut d, now, 24);
        assert_eq!(d.reminder.count, 1);
        assert_eq!(d.reminder.last_sent, Some(now));
        assert!(!is_due(&d, now + Duration::hours(23)));
        assert!(is_due(&d, now + Duration::hours(24)));
    }

    #[test]
    fn settled_debts_are_never_due() {
        let mut d = debt();
        d.status = DebtStatus::Netted { paid_at: Utc::now() };
        assert!(!is_due(&d, Utc::now()));
    }
}
