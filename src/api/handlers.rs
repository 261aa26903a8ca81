use crate::{
    api::models::*,
    auth::jwt::IdentityProfile,
    core::{
        errors::LedgerError,
        ledger::{NettingOutcome, RecalculationReport},
        models::{
            audit::{AppLog, GroupAudit},
            balance::{GroupSummary, Transfer, UserSummary},
            debt::Debt,
            expense::Expense,
            group::Group,
            user::{PaymentInfo, User},
        },
        services::{ExpenseOutcome, LedgerService, SweepReport, WebhookEvent, WebhookOutcome},
    },
    infrastructure::{
        logging::in_memory::InMemoryLogging,
        notify::in_memory::InMemoryNotifier,
        storage::{in_memory::InMemoryStorage, timeout::TimedStorage},
    },
};
use axum::{
    Extension, Json, Router,
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use chrono::Utc;
use http::header;

use std::sync::Arc;

pub type AppService = LedgerService<InMemoryLogging, TimedStorage<InMemoryStorage>, InMemoryNotifier>;

// Middleware to validate the identity provider's bearer token
async fn auth_middleware(
    State(service): State<Arc<AppService>>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(LedgerError::MissingCredentials)?;

    let identity = service.verify_identity(token)?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

// Define API routes
pub fn api_routes(service: Arc<AppService>) -> Router {
    let protected_routes = Router::new()
        .route("/auth/session", post(create_session))
        .route("/users/me", get(get_me))
        .route("/users/me/payment-info", put(update_payment_info))
        .route("/groups", post(create_group).get(list_groups))
        .route("/groups/{group_id}", get(get_group).delete(deactivate_group))
        .route("/groups/{group_id}/members", post(add_member))
        .route("/groups/{group_id}/members/{user_id}", delete(remove_member))
        .route("/groups/{group_id}/members/{user_id}/role", put(change_role))
        .route("/groups/{group_id}/expenses", get(list_group_expenses))
        .route("/groups/{group_id}/audits", get(get_group_audits))
        .route("/expenses", post(create_expense))
        .route(
            "/expenses/{expense_id}",
            get(get_expense).put(update_expense).delete(delete_expense),
        )
        .route("/debts", get(list_my_debts))
        .route("/debts/summary", get(get_my_summary))
        .route("/debts/overdue", get(get_overdue_debts))
        .route("/debts/{debt_id}", get(get_debt))
        .route("/debts/{debt_id}/settle", post(settle_debt))
        .route("/debts/{debt_id}/payments", post(add_payment))
        .route("/debts/group/{group_id}/calculate", post(calculate_group))
        .route("/debts/group/{group_id}/optimize", post(optimize_group))
        .route("/debts/group/{group_id}/summary", get(get_group_summary))
        .route("/debts/group/{group_id}/transfers", get(get_group_transfers))
        .route("/reminders/sweep", post(run_reminder_sweep))
        .route("/logs", get(get_app_logs))
        .route_layer(middleware::from_fn_with_state(service.clone(), auth_middleware));

    Router::new()
        .route("/webhook", post(handle_webhook)) // Unprotected, rate limited per source
        .merge(protected_routes)
        .with_state(service)
}

#[utoipa::path(
    post,
    path = "/api/auth/session",
    responses(
        (status = 200, description = "User created or refreshed from the identity token", body = ApiResponse<User>),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn create_session(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let user = service.sync_user(identity).await?;
    Ok(ApiResponse::ok(user))
}

#[utoipa::path(
    get,
    path = "/api/users/me",
    responses(
        (status = 200, description = "Current user", body = ApiResponse<User>),
        (status = 404, description = "User has not opened a session yet", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn get_me(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let user = service.get_user(&identity.stable_user_id).await?;
    Ok(ApiResponse::ok(user))
}

#[utoipa::path(
    put,
    path = "/api/users/me/payment-info",
    request_body = PaymentInfo,
    responses(
        (status = 200, description = "Payment info updated", body = ApiResponse<User>),
        (status = 400, description = "Bad request", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn update_payment_info(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
    Json(payment_info): Json<PaymentInfo>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let user = service
        .update_payment_info(&identity.stable_user_id, payment_info)
        .await?;
    Ok(ApiResponse::ok(user))
}

#[utoipa::path(
    post,
    path = "/api/groups",
    request_body = CreateGroupRequest,
    responses(
        (status = 201, description = "Group created", body = ApiResponse<Group>),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn create_group(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Group>>), ApiError> {
    let group = service
        .create_group(req.name, req.currency, req.member_ids, &identity.stable_user_id)
        .await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(group)))
}

#[utoipa::path(
    get,
    path = "/api/groups",
    responses((status = 200, description = "Groups the caller belongs to", body = ApiResponse<Vec<Group>>)),
    security(("Bearer" = []))
)]
async fn list_groups(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
) -> Result<Json<ApiResponse<Vec<Group>>>, ApiError> {
    let groups = service.list_groups(&identity.stable_user_id).await?;
    Ok(ApiResponse::ok(groups))
}

#[utoipa::path(
    get,
    path = "/api/groups/{group_id}",
    params(("group_id" = String, Path, description = "ID of the group")),
    responses(
        (status = 200, description = "Group", body = ApiResponse<Group>),
        (status = 403, description = "Not a group member", body = ErrorResponse),
        (status = 404, description = "Group not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn get_group(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
    Path(group_id): Path<String>,
) -> Result<Json<ApiResponse<Group>>, ApiError> {
    let group = service.get_group(&group_id, &identity.stable_user_id).await?;
    Ok(ApiResponse::ok(group))
}

#[utoipa::path(
    delete,
    path = "/api/groups/{group_id}",
    params(("group_id" = String, Path, description = "ID of the group to deactivate")),
    responses(
        (status = 200, description = "Group deactivated", body = ApiResponse<Group>),
        (status = 403, description = "Not a group admin", body = ErrorResponse),
        (status = 404, description = "Group not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn deactivate_group(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
    Path(group_id): Path<String>,
) -> Result<Json<ApiResponse<Group>>, ApiError> {
    let group = service.deactivate_group(&group_id, &identity.stable_user_id).await?;
    Ok(ApiResponse::ok(group))
}

#[utoipa::path(
    post,
    path = "/api/groups/{group_id}/members",
    request_body = AddMemberRequest,
    params(("group_id" = String, Path, description = "ID of the group")),
    responses(
        (status = 200, description = "Member added", body = ApiResponse<Group>),
        (status = 400, description = "Already a member or group deactivated", body = ErrorResponse),
        (status = 403, description = "Not a group admin", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn add_member(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
    Path(group_id): Path<String>,
    Json(req): Json<AddMemberRequest>,
) -> Result<Json<ApiResponse<Group>>, ApiError> {
    let group = service
        .add_member(&group_id, &req.user_id, &identity.stable_user_id)
        .await?;
    Ok(ApiResponse::ok(group))
}

#[utoipa::path(
    delete,
    path = "/api/groups/{group_id}/members/{user_id}",
    params(
        ("group_id" = String, Path, description = "ID of the group"),
        ("user_id" = String, Path, description = "Member to remove")
    ),
    responses(
        (status = 200, description = "Membership deactivated", body = ApiResponse<Group>),
        (status = 400, description = "Last active admin", body = ErrorResponse),
        (status = 403, description = "Not a group admin", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn remove_member(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
    Path((group_id, user_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Group>>, ApiError> {
    let group = service
        .remove_member(&group_id, &user_id, &identity.stable_user_id)
        .await?;
    Ok(ApiResponse::ok(group))
}

#[utoipa::path(
    put,
    path = "/api/groups/{group_id}/members/{user_id}/role",
    request_body = ChangeRoleRequest,
    params(
        ("group_id" = String, Path, description = "ID of the group"),
        ("user_id" = String, Path, description = "Member whose role changes")
    ),
    responses(
        (status = 200, description = "Role changed", body = ApiResponse<Group>),
        (status = 400, description = "Last active admin", body = ErrorResponse),
        (status = 403, description = "Not a group admin", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn change_role(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
    Path((group_id, user_id)): Path<(String, String)>,
    Json(req): Json<ChangeRoleRequest>,
) -> Result<Json<ApiResponse<Group>>, ApiError> {
    let group = service
        .change_role(&group_id, &user_id, req.role, &identity.stable_user_id)
        .await?;
    Ok(ApiResponse::ok(group))
}

#[utoipa::path(
    get,
    path = "/api/groups/{group_id}/expenses",
    params(("group_id" = String, Path, description = "ID of the group")),
    responses(
        (status = 200, description = "Active expenses, oldest first", body = ApiResponse<Vec<Expense>>),
        (status = 403, description = "Not a group member", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn list_group_expenses(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
    Path(group_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<Expense>>>, ApiError> {
    let expenses = service
        .list_group_expenses(&group_id, &identity.stable_user_id)
        .await?;
    Ok(ApiResponse::ok(expenses))
}

#[utoipa::path(
    post,
    path = "/api/expenses",
    request_body = CreateExpenseRequest,
    responses(
        (status = 201, description = "Expense recorded and debts derived", body = ApiResponse<ExpenseOutcome>),
        (status = 400, description = "Invalid amount or split", body = ErrorResponse),
        (status = 403, description = "Not a group member", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn create_expense(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
    Json(req): Json<CreateExpenseRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ExpenseOutcome>>), ApiError> {
    let outcome = service
        .create_expense(req.into(), &identity.stable_user_id)
        .await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(outcome)))
}

#[utoipa::path(
    get,
    path = "/api/expenses/{expense_id}",
    params(("expense_id" = String, Path, description = "ID of the expense")),
    responses(
        (status = 200, description = "Expense", body = ApiResponse<Expense>),
        (status = 404, description = "Expense not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn get_expense(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
    Path(expense_id): Path<String>,
) -> Result<Json<ApiResponse<Expense>>, ApiError> {
    let expense = service.get_expense(&expense_id, &identity.stable_user_id).await?;
    Ok(ApiResponse::ok(expense))
}

#[utoipa::path(
    put,
    path = "/api/expenses/{expense_id}",
    request_body = UpdateExpenseRequest,
    params(("expense_id" = String, Path, description = "ID of the expense")),
    responses(
        (status = 200, description = "Expense updated and group debts recalculated", body = ApiResponse<ExpenseOutcome>),
        (status = 403, description = "Not the payer", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn update_expense(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
    Path(expense_id): Path<String>,
    Json(req): Json<UpdateExpenseRequest>,
) -> Result<Json<ApiResponse<ExpenseOutcome>>, ApiError> {
    let outcome = service
        .update_expense(&expense_id, req.into(), &identity.stable_user_id)
        .await?;
    Ok(ApiResponse::ok(outcome))
}

#[utoipa::path(
    delete,
    path = "/api/expenses/{expense_id}",
    params(("expense_id" = String, Path, description = "ID of the expense")),
    responses(
        (status = 200, description = "Expense deactivated and group debts recalculated", body = ApiResponse<RecalculationReport>),
        (status = 403, description = "Not the payer", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn delete_expense(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
    Path(expense_id): Path<String>,
) -> Result<Json<ApiResponse<RecalculationReport>>, ApiError> {
    let report = service
        .delete_expense(&expense_id, &identity.stable_user_id)
        .await?;
    Ok(ApiResponse::ok(report))
}

#[utoipa::path(
    get,
    path = "/api/debts",
    params(("role" = Option<String>, Query, description = "debtor, creditor or all")),
    responses((status = 200, description = "Debts involving the caller", body = ApiResponse<Vec<Debt>>)),
    security(("Bearer" = []))
)]
async fn list_my_debts(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
    Query(query): Query<DebtListQuery>,
) -> Result<Json<ApiResponse<Vec<Debt>>>, ApiError> {
    let debts = service
        .list_my_debts(&identity.stable_user_id, query.role)
        .await?;
    Ok(ApiResponse::ok(debts))
}

#[utoipa::path(
    get,
    path = "/api/debts/{debt_id}",
    params(("debt_id" = String, Path, description = "ID of the debt")),
    responses(
        (status = 200, description = "Debt", body = ApiResponse<Debt>),
        (status = 404, description = "Debt not found", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn get_debt(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
    Path(debt_id): Path<String>,
) -> Result<Json<ApiResponse<Debt>>, ApiError> {
    let debt = service.get_debt(&debt_id, &identity.stable_user_id).await?;
    Ok(ApiResponse::ok(debt))
}

#[utoipa::path(
    post,
    path = "/api/debts/{debt_id}/settle",
    request_body = SettleRequest,
    params(("debt_id" = String, Path, description = "ID of the debt")),
    responses(
        (status = 200, description = "Debt marked paid", body = ApiResponse<Debt>),
        (status = 400, description = "Debt already settled", body = ErrorResponse),
        (status = 403, description = "Not a party to the debt", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn settle_debt(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
    Path(debt_id): Path<String>,
    Json(req): Json<SettleRequest>,
) -> Result<Json<ApiResponse<Debt>>, ApiError> {
    let debt = service
        .settle_debt(&debt_id, req.method, req.proof, &identity.stable_user_id)
        .await?;
    Ok(ApiResponse::ok(debt))
}

#[utoipa::path(
    post,
    path = "/api/debts/{debt_id}/payments",
    request_body = PaymentRequest,
    params(("debt_id" = String, Path, description = "ID of the debt")),
    responses(
        (status = 200, description = "Payment recorded", body = ApiResponse<Debt>),
        (status = 400, description = "Invalid payment", body = ErrorResponse),
        (status = 403, description = "Not a party to the debt", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn add_payment(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
    Path(debt_id): Path<String>,
    Json(req): Json<PaymentRequest>,
) -> Result<Json<ApiResponse<Debt>>, ApiError> {
    let debt = service
        .add_payment(&debt_id, req.amount, req.note, &identity.stable_user_id)
        .await?;
    Ok(ApiResponse::ok(debt))
}

#[utoipa::path(
    post,
    path = "/api/debts/group/{group_id}/calculate",
    params(("group_id" = String, Path, description = "ID of the group")),
    responses(
        (status = 200, description = "Pending debts rebuilt from active expenses", body = ApiResponse<RecalculationReport>),
        (status = 503, description = "Storage timed out, safe to retry", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn calculate_group(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
    Path(group_id): Path<String>,
) -> Result<Json<ApiResponse<RecalculationReport>>, ApiError> {
    let report = service
        .recalculate_group(&group_id, &identity.stable_user_id)
        .await?;
    Ok(ApiResponse::ok(report))
}

#[utoipa::path(
    post,
    path = "/api/debts/group/{group_id}/optimize",
    params(("group_id" = String, Path, description = "ID of the group")),
    responses((status = 200, description = "Mutual debts netted", body = ApiResponse<NettingOutcome>)),
    security(("Bearer" = []))
)]
async fn optimize_group(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
    Path(group_id): Path<String>,
) -> Result<Json<ApiResponse<NettingOutcome>>, ApiError> {
    let outcome = service
        .optimize_group(&group_id, &identity.stable_user_id)
        .await?;
    Ok(ApiResponse::ok(outcome))
}

#[utoipa::path(
    get,
    path = "/api/debts/summary",
    responses((status = 200, description = "Net balances across the caller's groups", body = ApiResponse<UserSummary>)),
    security(("Bearer" = []))
)]
async fn get_my_summary(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
) -> Result<Json<ApiResponse<UserSummary>>, ApiError> {
    let summary = service.user_summary(&identity.stable_user_id).await?;
    Ok(ApiResponse::ok(summary))
}

#[utoipa::path(
    get,
    path = "/api/debts/group/{group_id}/summary",
    params(("group_id" = String, Path, description = "ID of the group")),
    responses((status = 200, description = "Group totals and per-member balances", body = ApiResponse<GroupSummary>)),
    security(("Bearer" = []))
)]
async fn get_group_summary(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
    Path(group_id): Path<String>,
) -> Result<Json<ApiResponse<GroupSummary>>, ApiError> {
    let summary = service
        .group_summary(&group_id, &identity.stable_user_id)
        .await?;
    Ok(ApiResponse::ok(summary))
}

#[utoipa::path(
    get,
    path = "/api/debts/overdue",
    params(("group_id" = Option<String>, Query, description = "Restrict to one group")),
    responses((status = 200, description = "Open debts past their due date", body = ApiResponse<Vec<Debt>>)),
    security(("Bearer" = []))
)]
async fn get_overdue_debts(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
    Query(query): Query<OverdueQuery>,
) -> Result<Json<ApiResponse<Vec<Debt>>>, ApiError> {
    let debts = service
        .overdue_debts(&identity.stable_user_id, query.group_id.as_deref())
        .await?;
    Ok(ApiResponse::ok(debts))
}

#[utoipa::path(
    get,
    path = "/api/debts/group/{group_id}/transfers",
    params(("group_id" = String, Path, description = "ID of the group")),
    responses((status = 200, description = "Suggested settlement transfers", body = ApiResponse<Vec<Transfer>>)),
    security(("Bearer" = []))
)]
async fn get_group_transfers(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
    Path(group_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<Transfer>>>, ApiError> {
    let transfers = service
        .group_transfers(&group_id, &identity.stable_user_id)
        .await?;
    Ok(ApiResponse::ok(transfers))
}

#[utoipa::path(
    post,
    path = "/api/reminders/sweep",
    responses((status = 200, description = "Reminders sent for due debts", body = ApiResponse<SweepReport>)),
    security(("Bearer" = []))
)]
async fn run_reminder_sweep(State(service): State<Arc<AppService>>) -> Result<Json<ApiResponse<SweepReport>>, ApiError> {
    let report = service.run_reminder_sweep(Utc::now()).await?;
    Ok(ApiResponse::ok(report))
}

#[utoipa::path(
    post,
    path = "/api/webhook",
    request_body = WebhookEvent,
    responses(
        (status = 200, description = "Event handled", body = ApiResponse<WebhookOutcome>),
        (status = 429, description = "Too many events from this source", body = ErrorResponse)
    )
)]
async fn handle_webhook(
    State(service): State<Arc<AppService>>,
    Json(event): Json<WebhookEvent>,
) -> Result<Json<ApiResponse<WebhookOutcome>>, ApiError> {
    let outcome = service.handle_webhook(event, Utc::now()).await?;
    Ok(ApiResponse::ok(outcome))
}

#[utoipa::path(
    get,
    path = "/api/logs",
    responses((status = 200, description = "Application action log", body = ApiResponse<Vec<AppLog>>)),
    security(("Bearer" = []))
)]
async fn get_app_logs(State(service): State<Arc<AppService>>) -> Result<Json<ApiResponse<Vec<AppLog>>>, ApiError> {
    let logs = service.get_app_logs().await?;
    Ok(ApiResponse::ok(logs))
}

#[utoipa::path(
    get,
    path = "/api/groups/{group_id}/audits",
    params(("group_id" = String, Path, description = "ID of the group")),
    responses(
        (status = 200, description = "Group audit trail", body = ApiResponse<Vec<GroupAudit>>),
        (status = 403, description = "Not a group member", body = ErrorResponse)
    ),
    security(("Bearer" = []))
)]
async fn get_group_audits(
    State(service): State<Arc<AppService>>,
    Extension(identity): Extension<IdentityProfile>,
    Path(group_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<GroupAudit>>>, ApiError> {
    let audits = service
        .get_group_audits(&group_id, &identity.stable_user_id)
        .await?;
    Ok(ApiResponse::ok(audits))
}
