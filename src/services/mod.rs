pub mod chat_service;
pub mod completion;
pub mod confirmation;
pub mod dispatcher;
pub mod generators;
pub mod intent_classifier;
pub mod rate_limiter;
pub mod session_store;

#[cfg(test)]
pub mod testing;

pub use chat_service::ChatService;
pub use completion::{CompletionClient, OpenAiCompletionClient};
pub use rate_limiter::RateLimiter;
pub use session_store::{SessionSettings, SessionStore};

use tokio::time::{interval, Duration};

use crate::constants::SESSION_SWEEP_INTERVAL_SECS;

/// Start the session sweeper
pub async fn start_background_services(
    sessions: SessionStore,
    rate_limiters: Vec<RateLimiter>,
    session_idle_ttl: Duration,
) {
    tracing::info!("Starting background services...");

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(SESSION_SWEEP_INTERVAL_SECS));

        loop {
            ticker.tick().await;

            let evicted = sessions.evict_idle(session_idle_ttl).await;
            if evicted > 0 {
                tracing::info!("Evicted {} idle sessions", evicted);
            }
            let pruned: usize = rate_limiters.iter().map(RateLimiter::prune).sum();
            if pruned > 0 {
                tracing::debug!("Pruned {} stale rate limit counters", pruned);
            }
        }
    });

    tracing::info!("All background services started successfully");
}
