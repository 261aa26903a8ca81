//! Split calculator: turns an expense amount into per-participant shares.
//!
//! Every policy conserves the total exactly: the last participant absorbs
//! whatever the per-share rounding left over, so `sum(splits) == amount`.

use crate::core::errors::LedgerError;
use crate::core::models::expense::{Split, SplitMethod};
use crate::core::money::{HUNDRED, round2, within_epsilon};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashSet;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SplitPolicy {
    Equal { participants: Vec<String> },
    Custom { shares: Vec<(String, Decimal)> },
    Percentage { shares: Vec<(String, Decimal)> },
}

impl SplitPolicy {
    pub fn method(&self) -> SplitMethod {
        match self {
            SplitPolicy::Equal { .. } => SplitMethod::Equal,
            SplitPolicy::Custom { .. } => SplitMethod::Custom,
            SplitPolicy::Percentage { .. } => SplitMethod::Percentage,
        }
    }

    pub fn participants(&self) -> Vec<&str> {
        match self {
            SplitPolicy::Equal { participants } => participants.iter().map(String::as_str).collect(),
            SplitPolicy::Custom { shares } | SplitPolicy::Percentage { shares } => {
                shares.iter().map(|(user, _)| user.as_str()).collect()
            }
        }
    }
}

pub fn compute_splits(amount: Decimal, payer_id: &str, policy: &SplitPolicy) -> Result<Vec<Split>, LedgerError> {
    let participants = policy.participants();
    if participants.is_empty() {
        return Err(LedgerError::EmptyParticipants);
    }
    let mut seen = HashSet::with_capacity(participants.len());
    if let Some(duplicate) = participants.iter().find(|user| !seen.insert(**user)) {
        return Err(LedgerError::InvalidSplit(format!("participant {} listed twice", duplicate)));
    }

    let (amounts, percentages) = match policy {
        SplitPolicy::Equal { participants } => (equal_amounts(amount, participants.len())?, None),
        SplitPolicy::Custom { shares } => (custom_amounts(amount, shares)?, None),
        SplitPolicy::Percentage { shares } => {
            let pcts: Vec<Decimal> = shares.iter().map(|(_, pct)| *pct).collect();
            (percentage_amounts(amount, &pcts)?, Some(pcts))
        }
    };

    Ok(participants
        .into_iter()
        .zip(amounts)
        .enumerate()
        .map(|(i, (user_id, share))| Split {
            user_id: user_id.to_string(),
            amount: share,
            percentage: percentages.as_ref().map(|p| p[i]),
            is_paid: user_id == payer_id,
        })
        .collect())
}

fn equal_amounts(amount: Decimal, n: usize) -> Result<Vec<Decimal>, LedgerError> {
    let count = Decimal::from(n);
    let exact = amount / count;
    let mut base = round2(exact);
    // Rounding up n-1 shares can overshoot a tiny total; fall back to truncation.
    if base * Decimal::from(n - 1) > amount {
        base = exact.round_dp_with_strategy(2, RoundingStrategy::ToZero);
    }
    let mut shares = vec![base; n];
    absorb_remainder(amount, &mut shares)?;
    Ok(shares)
}

fn custom_amounts(amount: Decimal, shares: &[(String, Decimal)]) -> Result<Vec<Decimal>, LedgerError> {
    if let Some((user, _)) = shares.iter().find(|(_, share)| *share < Decimal::ZERO) {
        return Err(LedgerError::InvalidSplit(format!("negative share for {}", user)));
    }
    let total: Decimal = shares.iter().map(|(_, share)| *share).sum();
    if !within_epsilon(total, amount) {
        return Err(LedgerError::InvalidSplit(format!(
            "custom shares sum to {} but the expense is {}",
            total, amount
        )));
    }
    let mut amounts: Vec<Decimal> = shares.iter().map(|(_, share)| round2(*share)).collect();
    absorb_remainder(amount, &mut amounts)?;
    Ok(amounts)
}

fn percentage_amounts(amount: Decimal, pcts: &[Decimal]) -> Result<Vec<Decimal>, LedgerError> {
    if pcts.iter().any(|pct| *pct <= Decimal::ZERO) {
        return Err(LedgerError::InvalidSplit("percentages must be positive".to_string()));
    }
    let total: Decimal = pcts.iter().sum();
    if !within_epsilon(total, HUNDRED) {
        return Err(LedgerError::InvalidSplit(format!(
            "percentages sum to {} instead of 100",
            total
        )));
    }
    let mut shares: Vec<Decimal> = pcts.iter().map(|pct| round2(amount * pct / HUNDRED)).collect();
    if absorb_remainder(amount, &mut shares).is_ok() {
        return Ok(shares);
    }
    let mut truncated: Vec<Decimal> = pcts
        .iter()
        .map(|pct| (amount * pct / HUNDRED).round_dp_with_strategy(2, RoundingStrategy::ToZero))
        .collect();
    absorb_remainder(amount, &mut truncated)?;
    Ok(truncated)
}

/// Rewrites the last share so the shares sum to `amount` exactly.
fn absorb_remainder(amount: Decimal, shares: &mut [Decimal]) -> Result<(), LedgerError> {
    let Some((last, rest)) = shares.split_last_mut() else {
        return Err(LedgerError::EmptyParticipants);
    };
    let others: Decimal = rest.iter().sum();
    let remainder = amount - others;
    if remainder < Decimal::ZERO {
        return Err(LedgerError::InvalidSplit(format!(
            "amount {} is too small to split {} ways",
            amount,
            rest.len() + 1
        )));
    }
    *last = remainder;
    Ok(())
}
