use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{AppError, Result};

fn time_bucket(now_secs: u64, window_seconds: u64) -> u64 {
    now_secs / window_seconds.max(1)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Fixed-window request counter keyed by client.
#[derive(Clone)]
pub struct RateLimiter {
    limit: u32,
    window_seconds: u64,
    counters: Arc<Mutex<HashMap<String, (u64, u32)>>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window_seconds: u64) -> Self {
        Self {
            limit: limit.max(1),
            window_seconds: window_seconds.max(1),
            counters: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn check(&self, key: &str) -> Result<()> {
        self.check_at(key, now_secs())
    }

    fn check_at(&self, key: &str, now_secs: u64) -> Result<()> {
        let bucket = time_bucket(now_secs, self.window_seconds);
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| AppError::Internal("rate limiter lock poisoned".to_string()))?;
        let counter = counters.entry(key.to_string()).or_insert((bucket, 0));
        if counter.0 != bucket {
            *counter = (bucket, 0);
        }
        counter.1 += 1;

        if counter.1 > self.limit {
            tracing::warn!(
                "Rate limit exceeded key={} count={} limit={}",
                key,
                counter.1,
                self.limit
            );
            return Err(AppError::RateLimitExceeded);
        }
        Ok(())
    }

    /// Forgets counters from past windows.
    pub fn prune(&self) -> usize {
        self.prune_at(now_secs())
    }

    fn prune_at(&self, now_secs: u64) -> usize {
        let bucket = time_bucket(now_secs, self.window_seconds);
        let Ok(mut counters) = self.counters.lock() else {
            return 0;
        };
        let before = counters.len();
        counters.retain(|_, (counter_bucket, _)| *counter_bucket == bucket);
        before - counters.len()
    }
}
