use crate::core::errors::LedgerError;
use crate::core::models::audit::AppLog;
use crate::infrastructure::logging::LoggingService;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Keeps at most `capacity` entries, dropping the oldest.
#[derive(Clone)]
pub struct InMemoryLogging {
    logs: Arc<RwLock<Vec<AppLog>>>,
    capacity: usize,
}

impl InMemoryLogging {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        InMemoryLogging {
            logs: Arc::new(RwLock::new(Vec::new())),
            capacity: capacity.max(1),
        }
    }
}

impl Default for InMemoryLogging {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LoggingService for InMemoryLogging {
    async fn log_action(
        &self,
        action: &str,
        details: serde_json::Value,
        user_id: Option<&str>,
    ) -> Result<(), LedgerError> {
        if !details.is_object() {
            return Err(LedgerError::LoggingError(format!(
                "details for `{}` must be a JSON object",
                action
            )));
        }
        debug!(action, user_id, "recording action");
        let mut logs = self.logs.write().await;
        if logs.len() >= self.capacity {
            let overflow = logs.len() + 1 - self.capacity;
            logs.drain(..overflow);
        }
        logs.push(AppLog {
            id: Uuid::new_v4().to_string(),
            action: action.to_string(),
            user_id: user_id.map(String::from),
            details,
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }

    async fn get_logs(&self) -> Result<Vec<AppLog>, LedgerError> {
        let logs = self.logs.read().await;
        Ok(logs.clone())
    }
}
