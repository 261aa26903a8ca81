use crate::core::errors::LedgerError;
use crate::infrastructure::notify::Notifier;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Clone, Debug, Serialize)]
pub struct Notification {
    pub target_id: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

/// Records every message in an outbox; targets marked unreachable fail delivery.
#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    outbox: Arc<RwLock<Vec<Notification>>>,
    unreachable: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn mark_unreachable(&self, target_id: &str) {
        self.unreachable.write().await.insert(target_id.to_string());
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.outbox.read().await.clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(&self, target_id: &str, text: &str) -> Result<(), LedgerError> {
        if self.unreachable.read().await.contains(target_id) {
            return Err(LedgerError::NotificationFailed(target_id.to_string()));
        }
        info!(target_id, "notification queued");
        self.outbox.write().await.push(Notification {
            target_id: target_id.to_string(),
            text: text.to_string(),
            sent_at: Utc::now(),
        });
        Ok(())
    }
}
