use crate::core::ledger::LedgerSettings;
use dotenv::dotenv;
use once_cell::sync::Lazy;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub struct Config {
    pub port: u16,
    pub log_level: String,
    pub jwt_secret: String,
    pub storage_timeout_ms: u64,
    pub reminder_interval_hours: i64,
    /// 0 disables the in-process sweep; an external scheduler calls the endpoint instead
    pub reminder_sweep_secs: u64,
    pub debt_due_days: i64,
    pub webhook_rate_limit: usize,
    pub webhook_rate_window_secs: i64,
}

fn var_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    fn from_env() -> Self {
        dotenv().ok();

        Self {
            port: var_or("PORT", 3000),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".to_string()),
            storage_timeout_ms: var_or("STORAGE_TIMEOUT_MS", 2000),
            reminder_interval_hours: var_or("REMINDER_INTERVAL_HOURS", 24),
            reminder_sweep_secs: var_or("REMINDER_SWEEP_SECS", 0),
            debt_due_days: var_or("DEBT_DUE_DAYS", 7),
            webhook_rate_limit: var_or("WEBHOOK_RATE_LIMIT", 20),
            webhook_rate_window_secs: var_or("WEBHOOK_RATE_WINDOW_SECS", 60),
        }
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms.max(1))
    }

    pub fn ledger_settings(&self) -> LedgerSettings {
        LedgerSettings {
            due_days: self.debt_due_days,
            reminder_interval_hours: self.reminder_interval_hours,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("jwt_secret", &"<redacted>")
            .field("storage_timeout_ms", &self.storage_timeout_ms)
            .field("reminder_interval_hours", &self.reminder_interval_hours)
            .field("reminder_sweep_secs", &self.reminder_sweep_secs)
            .field("debt_due_days", &self.debt_due_days)
            .field("webhook_rate_limit", &self.webhook_rate_limit)
            .field("webhook_rate_window_secs", &self.webhook_rate_window_secs)
            .finish()
    }
}

// Global static accessible everywhere
pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);
