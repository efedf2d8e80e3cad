use std::time::Duration;

use async_trait::async_trait;

/// Why the run is pausing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    /// Fixed pause after every successful API call.
    AfterApiCall,
    BetweenPages,
    BetweenCompanies,
    Retry,
    KeyRotation,
    /// Waiting for a browser page to render or scroll.
    PageSettle,
}

#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, delay: Duration, reason: PauseReason);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, delay: Duration, reason: PauseReason) {
        if delay.is_zero() {
            return;
        }
        tracing::debug!(delay_ms = delay.as_millis() as u64, ?reason, "sleeping");
        tokio::time::sleep(delay).await;
    }
}
