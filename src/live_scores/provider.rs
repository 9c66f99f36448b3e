use anyhow::Result;
use async_trait::async_trait;

/// Trait every live-score source implements. Best effort only: nothing in
/// training or inference depends on it.
#[async_trait]
pub trait LiveScoreProvider: Send + Sync {
    /// Return the provider's recent/live match feed as raw JSON.
    async fn recent_matches(&self) -> Result<serde_json::Value>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
