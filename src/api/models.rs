use axum::{Json, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::core::errors::{ErrorKind, LedgerError};
use crate::core::models::{debt::PaymentMethod, expense::Category, group::Role};
use crate::core::services::{DebtRole, ExpenseChanges, NewExpense};
use crate::core::splits::SplitPolicy;

// Request structs for JSON payloads
#[derive(Deserialize, ToSchema)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub member_ids: Vec<String>,
}

fn default_currency() -> String {
    "THB".to_string()
}

#[derive(Deserialize, ToSchema)]
pub struct AddMemberRequest {
    pub user_id: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ChangeRoleRequest {
    pub role: Role,
}

#[derive(Deserialize, ToSchema)]
pub struct ShareAmount {
    pub user_id: String,
    pub amount: Decimal,
}

#[derive(Deserialize, ToSchema)]
pub struct SharePercentage {
    pub user_id: String,
    pub percentage: Decimal,
}

#[derive(Deserialize, ToSchema)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum SplitRequest {
    Equal { participants: Vec<String> },
    Custom { shares: Vec<ShareAmount> },
    Percentage { shares: Vec<SharePercentage> },
}

impl From<SplitRequest> for SplitPolicy {
    fn from(request: SplitRequest) -> Self {
        match request {
            SplitRequest::Equal { participants } => SplitPolicy::Equal { participants },
            SplitRequest::Custom { shares } => SplitPolicy::Custom {
                shares: shares.into_iter().map(|s| (s.user_id, s.amount)).collect(),
            },
            SplitRequest::Percentage { shares } => SplitPolicy::Percentage {
                shares: shares.into_iter().map(|s| (s.user_id, s.percentage)).collect(),
            },
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateExpenseRequest {
    pub group_id: String,
    pub description: String,
    pub amount: Decimal,
    #[serde(default)]
    pub category: Category,
    pub paid_by: Option<String>,
    pub split: SplitRequest,
    pub due_date: Option<DateTime<Utc>>,
}

impl From<CreateExpenseRequest> for NewExpense {
    fn from(req: CreateExpenseRequest) -> Self {
        NewExpense {
            group_id: req.group_id,
            description: req.description,
            amount: req.amount,
            category: req.category,
            paid_by: req.paid_by,
            split: req.split.into(),
            due_date: req.due_date,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateExpenseRequest {
    pub description: Option<String>,
    pub amount: Option<Decimal>,
    pub category: Option<Category>,
    pub split: Option<SplitRequest>,
    pub due_date: Option<DateTime<Utc>>,
}

impl From<UpdateExpenseRequest> for ExpenseChanges {
    fn from(req: UpdateExpenseRequest) -> Self {
        ExpenseChanges {
            description: req.description,
            amount: req.amount,
            category: req.category,
            split: req.split.map(SplitPolicy::from),
            due_date: req.due_date,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct PaymentRequest {
    pub amount: Decimal,
    pub note: Option<String>,
}

#[derive(Deserialize, ToSchema, Default)]
pub struct SettleRequest {
    pub method: Option<PaymentMethod>,
    pub proof: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct DebtListQuery {
    #[serde(default)]
    pub role: DebtRole,
}

#[derive(Deserialize, Default)]
pub struct OverdueQuery {
    pub group_id: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct NetBalanceResponse {
    pub user_id: String,
    pub group_id: Option<String>,
    pub net: Decimal,
}

/// Success envelope shared by every endpoint.
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(ApiResponse { success: true, data })
    }
}

// Error response struct
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

// Newtype wrapper for LedgerError to implement IntoResponse
pub struct ApiError(pub LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::Validation | ErrorKind::InvariantViolation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::TransientStorage => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = match &self.0 {
            LedgerError::InvalidInput(_, detail) => format!("{}: {}", detail.title, detail.description),
            // Internal details stay in the log
            err if status == StatusCode::INTERNAL_SERVER_ERROR => {
                error!(error = %err, "request failed");
                "Internal server error".to_string()
            }
            err => err.to_string(),
        };
        (
            status,
            Json(ErrorResponse {
                success: false,
                message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(ApiError(LedgerError::InvalidSplit("x".into())).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError(LedgerError::NotExpensePayer("u".into())).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError(LedgerError::MissingCredentials).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError(LedgerError::RateLimited("s".into())).status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ApiError(LedgerError::StorageTimeout("get_debt".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
