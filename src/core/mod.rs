pub mod balances;
pub mod errors;
pub mod ledger;
pub mod models;
pub mod money;
pub mod rate_limit;
pub mod reminders;
pub mod services;
pub mod splits;
