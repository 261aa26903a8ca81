use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::{
    api::models::{
        AddMemberRequest, ChangeRoleRequest, CreateExpenseRequest, CreateGroupRequest, ErrorResponse, PaymentRequest,
        SettleRequest, ShareAmount, SharePercentage, SplitRequest, UpdateExpenseRequest,
    },
    core::{
        ledger::{NettingOutcome, RecalculationReport},
        models::{
            Lifecycle,
            audit::{AppLog, GroupAudit},
            balance::{GroupBalance, GroupSummary, PendingTotals, Transfer, UserBreakdown, UserSummary},
            debt::{Debt, DebtState, DebtStatus, PaymentKind, PaymentMethod, PaymentRecord, ReminderState},
            expense::{Category, Expense, Split, SplitMethod},
            group::{Group, GroupMember, Role},
            user::{PaymentInfo, User},
        },
        services::{ExpenseOutcome, SweepReport, WebhookEvent, WebhookOutcome},
    },
};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        super::handlers::create_session,
        super::handlers::get_me,
        super::handlers::update_payment_info,
        super::handlers::create_group,
        super::handlers::list_groups,
        super::handlers::get_group,
        super::handlers::deactivate_group,
        super::handlers::add_member,
        super::handlers::remove_member,
        super::handlers::change_role,
        super::handlers::list_group_expenses,
        super::handlers::create_expense,
        super::handlers::get_expense,
        super::handlers::update_expense,
        super::handlers::delete_expense,
        super::handlers::list_my_debts,
        super::handlers::get_debt,
        super::handlers::settle_debt,
        super::handlers::add_payment,
        super::handlers::calculate_group,
        super::handlers::optimize_group,
        super::handlers::get_my_summary,
        super::handlers::get_group_summary,
        super::handlers::get_overdue_debts,
        super::handlers::get_group_transfers,
        super::handlers::run_reminder_sweep,
        super::handlers::handle_webhook,
        super::handlers::get_app_logs,
        super::handlers::get_group_audits
    ),
    components(schemas(
        CreateGroupRequest,
        AddMemberRequest,
        ChangeRoleRequest,
        SplitRequest,
        ShareAmount,
        SharePercentage,
        CreateExpenseRequest,
        UpdateExpenseRequest,
        PaymentRequest,
        SettleRequest,
        ErrorResponse,
        User,
        PaymentInfo,
        Lifecycle,
        Group,
        GroupMember,
        Role,
        Expense,
        Split,
        SplitMethod,
        Category,
        ExpenseOutcome,
        Debt,
        DebtStatus,
        DebtState,
        PaymentRecord,
        PaymentKind,
        PaymentMethod,
        ReminderState,
        Transfer,
        UserBreakdown,
        PendingTotals,
        GroupSummary,
        GroupBalance,
        UserSummary,
        RecalculationReport,
        NettingOutcome,
        SweepReport,
        WebhookEvent,
        WebhookOutcome,
        AppLog,
        GroupAudit
    )),
    modifiers(&BearerAuth),
    info(
        title = "Splitledger API",
        description = "Shared-expense ledger: groups, expenses, pairwise debts and settlement",
        version = "0.1.0"
    )
)]
pub struct ApiDoc;
