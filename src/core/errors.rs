use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub title: String,
    pub description: String,
}

impl FieldError {
    pub fn new(field: &str, title: impl Into<String>, description: impl Into<String>) -> Self {
        FieldError {
            field: field.to_string(),
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Coarse classification of a [`LedgerError`], used by callers to decide
/// whether to fix input, retry, or give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Validation,
    InvariantViolation,
    NotFound,
    Authorization,
    Unauthenticated,
    Conflict,
    RateLimited,
    TransientStorage,
    Internal,
}

#[derive(Error, Debug, Serialize)]
pub enum LedgerError {
    /// Generic input validation error with detailed field information
    #[error("Invalid input for field `{0}`: {desc}", desc = .1.description)]
    InvalidInput(String, FieldError),

    /// A split cannot be computed from zero participants
    #[error("Split requires at least one participant")]
    EmptyParticipants,

    /// Split amounts or percentages don't add up
    #[error("Invalid split: {0}")]
    InvalidSplit(String),

    /// User referenced by a split is not an active group member
    #[error("User {0} is not an active member of the group")]
    InvalidSplitUser(String),

    /// Payment amount is non-positive, too precise, or exceeds the outstanding amount
    #[error("Invalid payment: {0}")]
    InvalidPayment(String),

    /// Debt reached a terminal state and cannot be mutated
    #[error("Debt {0} is already settled")]
    DebtAlreadySettled(String),

    /// Group must keep at least one active admin
    #[error("Group {0} must retain at least one active admin")]
    LastActiveAdmin(String),

    #[error("Group {0} is deactivated")]
    GroupInactive(String),

    #[error("Expense {0} is deactivated")]
    ExpenseInactive(String),

    #[error("User {0} is already a group member")]
    AlreadyGroupMember(String),

    #[error("User {0} not found")]
    UserNotFound(String),

    #[error("Group {0} not found")]
    GroupNotFound(String),

    #[error("Expense {0} not found")]
    ExpenseNotFound(String),

    #[error("Debt {0} not found")]
    DebtNotFound(String),

    #[error("User {0} is not a group member")]
    NotGroupMember(String),

    #[error("User {0} is not a group admin")]
    NotGroupAdmin(String),

    /// Only the payer may edit or delete an expense
    #[error("User {0} is not the payer of this expense")]
    NotExpensePayer(String),

    #[error("User {0} is not a party to this debt")]
    NotDebtParty(String),

    #[error("Missing bearer credential")]
    MissingCredentials,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Uniqueness constraint on `(debtor, creditor, expense)`
    #[error("Debt {debtor} -> {creditor} for expense {expense} already exists")]
    DuplicateDebt {
        debtor: String,
        creditor: String,
        expense: String,
    },

    #[error("Rate limit exceeded for source {0}")]
    RateLimited(String),

    /// Persistence call exceeded its deadline
    #[error("Storage operation `{0}` timed out")]
    StorageTimeout(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Logging error: {0}")]
    LoggingError(String),

    #[error("Notification to {0} failed")]
    NotificationFailed(String),

    /// Internal server error (e.g., unexpected failure)
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl LedgerError {
    pub fn invalid_input(field: &str, title: impl Into<String>, description: impl Into<String>) -> Self {
        LedgerError::InvalidInput(field.to_string(), FieldError::new(field, title, description))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidInput(..)
            | LedgerError::EmptyParticipants
            | LedgerError::InvalidSplitUser(_)
            | LedgerError::InvalidPayment(_)
            | LedgerError::GroupInactive(_)
            | LedgerError::ExpenseInactive(_)
            | LedgerError::AlreadyGroupMember(_) => ErrorKind::Validation,
            LedgerError::InvalidSplit(_) | LedgerError::DebtAlreadySettled(_) | LedgerError::LastActiveAdmin(_) => {
                ErrorKind::InvariantViolation
            }
            LedgerError::UserNotFound(_)
            | LedgerError::GroupNotFound(_)
            | LedgerError::ExpenseNotFound(_)
            | LedgerError::DebtNotFound(_) => ErrorKind::NotFound,
            LedgerError::NotGroupMember(_)
            | LedgerError::NotGroupAdmin(_)
            | LedgerError::NotExpensePayer(_)
            | LedgerError::NotDebtParty(_) => ErrorKind::Authorization,
            LedgerError::MissingCredentials | LedgerError::InvalidToken(_) => ErrorKind::Unauthenticated,
            LedgerError::DuplicateDebt { .. } => ErrorKind::Conflict,
            LedgerError::RateLimited(_) => ErrorKind::RateLimited,
            LedgerError::StorageTimeout(_) | LedgerError::StorageUnavailable(_) => ErrorKind::TransientStorage,
            LedgerError::LoggingError(_)
            | LedgerError::NotificationFailed(_)
            | LedgerError::InternalServerError(_) => ErrorKind::Internal,
        }
    }

    /// Only transient storage failures are worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransientStorage
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_storage_failures_are_retryable() {
        assert!(LedgerError::StorageTimeout("get_debt".into()).is_retryable());
        assert!(LedgerError::StorageUnavailable("down".into()).is_retryable());
        assert!(!LedgerError::InvalidSplit("sum".into()).is_retryable());
        assert!(!LedgerError::DebtNotFound("d1".into()).is_retryable());
    }

    #[test]
    fn invalid_input_names_the_field() {
        let err = LedgerError::invalid_input("amount", "Invalid amount", "amount must be positive");
        assert_eq!(err.to_string(), "Invalid input for field `amount`: amount must be positive");
    }

    #[test]
    fn split_totals_are_invariant_violations() {
        assert_eq!(LedgerError::InvalidSplit("x".into()).kind(), ErrorKind::InvariantViolation);
        assert_eq!(LedgerError::EmptyParticipants.kind(), ErrorKind::Validation);
        let dup = LedgerError::DuplicateDebt {
            debtor: "b".into(),
            creditor: "a".into(),
            expense: "e".into(),
        };
        assert!(dup.is_conflict());
    }
}
