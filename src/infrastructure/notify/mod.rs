pub mod in_memory;

use crate::core::errors::LedgerError;
use async_trait::async_trait;

/// Outbound text channel to a user or a group. Delivery retries are the channel's business.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, target_id: &str, text: &str) -> Result<(), LedgerError>;
}
