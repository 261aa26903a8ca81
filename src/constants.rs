// Action names recorded in the app log and group audit trail
pub const USER_SYNCED: &str = "USER_SYNCED";
pub const PAYMENT_INFO_UPDATED: &str = "PAYMENT_INFO_UPDATED";
pub const GROUP_CREATED: &str = "GROUP_CREATED";
pub const GROUP_DEACTIVATED: &str = "GROUP_DEACTIVATED";
pub const MEMBER_ADDED: &str = "MEMBER_ADDED";
pub const MEMBER_REMOVED: &str = "MEMBER_REMOVED";
pub const MEMBER_ROLE_CHANGED: &str = "MEMBER_ROLE_CHANGED";
pub const EXPENSE_ADDED: &str = "EXPENSE_ADDED";
pub const EXPENSE_UPDATED: &str = "EXPENSE_UPDATED";
pub const EXPENSE_DELETED: &str = "EXPENSE_DELETED";
pub const DEBTS_RECALCULATED: &str = "DEBTS_RECALCULATED";
pub const DEBTS_OPTIMIZED: &str = "DEBTS_OPTIMIZED";
pub const PAYMENT_RECORDED: &str = "PAYMENT_RECORDED";
pub const DEBT_SETTLED: &str = "DEBT_SETTLED";
pub const REMINDERS_SWEPT: &str = "REMINDERS_SWEPT";
pub const WEBHOOK_HANDLED: &str = "WEBHOOK_HANDLED";

pub const WEBHOOK_BALANCE_COMMAND: &str = "balance";
