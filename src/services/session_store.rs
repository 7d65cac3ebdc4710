use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

use crate::constants::ACCOUNT_CONTEXT_RECENT_TRANSACTIONS;
use crate::error::{AppError, Result};
use crate::integrations::ledger::TransferExecutor;
use crate::models::{ChatReply, TransactionRecord};
use crate::services::confirmation::{ConfirmationMachine, TransactionHistory, TransferOutcome};

/// Everything one conversation owns: the transfer handshake, the account
/// handle with its last known context, and the transaction log.
#[derive(Debug)]
pub struct ConversationSession {
    id: String,
    account_address: Option<String>,
    account_info: Option<String>,
    balance: Option<Decimal>,
    token_symbol: String,
    confirmation: ConfirmationMachine,
    history: TransactionHistory,
}

impl ConversationSession {
    pub fn new(
        id: String,
        account_address: Option<String>,
        token_symbol: String,
        pending_ttl: Option<Duration>,
    ) -> Self {
        Self {
            id,
            account_address,
            account_info: None,
            balance: None,
            confirmation: ConfirmationMachine::new(pending_ttl, token_symbol.clone()),
            token_symbol,
            history: TransactionHistory::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn account_address(&self) -> Option<&str> {
        self.account_address.as_deref()
    }

    pub fn set_account_info(&mut self, info: String) {
        self.account_info = Some(info);
    }

    pub fn set_balance(&mut self, balance: Decimal) {
        self.balance = Some(balance);
    }

    pub fn transfer_phase(&self) -> &'static str {
        self.confirmation.phase()
    }

    pub fn is_awaiting_confirmation(&self) -> bool {
        self.confirmation.is_awaiting()
    }

    pub fn history(&self) -> Vec<TransactionRecord> {
        self.history.records()
    }

    pub fn open_pending_transfer(
        &mut self,
        amount: Decimal,
        destination: String,
        allow_death: bool,
        now: DateTime<Utc>,
    ) -> ChatReply {
        tracing::info!(
            "Session {} opened pending transfer dest={:?} amount={} allow_death={}",
            self.id,
            destination,
            amount,
            allow_death
        );
        self.confirmation
            .open_pending_transfer(amount, destination, allow_death, now)
    }

    pub fn expire_pending_transfer(&mut self, now: DateTime<Utc>) -> bool {
        self.confirmation.expire_if_stale(now)
    }

    pub fn recover_interrupted_transfer(&mut self) -> bool {
        self.confirmation.recover_interrupted()
    }

    pub async fn confirm_pending_transfer(
        &mut self,
        executor: &dyn TransferExecutor,
        timeout: Duration,
    ) -> Option<TransferOutcome> {
        self.confirmation
            .confirm(executor, &mut self.history, timeout)
            .await
    }

    /// Text block embedded in the account generator's prompt.
    pub fn account_context(&self) -> String {
        let mut lines = vec![format!(
            "Address: {}",
            self.account_address.as_deref().unwrap_or("unknown")
        )];
        lines.push(match self.balance {
            Some(balance) => format!("Balance: {} {}", balance, self.token_symbol),
            None => "Balance: unknown".to_string(),
        });
        if let Some(info) = &self.account_info {
            lines.push(format!("Account info: {}", info));
        }
        if self.history.is_empty() {
            lines.push("Recent transactions: none".to_string());
        } else {
            lines.push("Recent transactions:".to_string());
            lines.extend(
                self.history
                    .recent(ACCOUNT_CONTEXT_RECENT_TRANSACTIONS)
                    .map(|record| {
                        format!(
                            "- {} sent {} {} to {} (hash {})",
                            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                            record.amount,
                            self.token_symbol,
                            record.destination,
                            record.transaction_hash
                        )
                    }),
            );
        }
        lines.join("\n")
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub account_address: Option<String>,
    pub token_symbol: String,
    pub pending_ttl: Option<Duration>,
    pub max_sessions: usize,
}

struct SessionEntry {
    session: Arc<Mutex<ConversationSession>>,
    last_seen: Instant,
}

/// Session id -> conversation state. Each session sits behind its own lock,
/// so messages within a session run one at a time while sessions stay
/// independent of each other.
#[derive(Clone)]
pub struct SessionStore {
    entries: Arc<RwLock<HashMap<String, SessionEntry>>>,
    settings: SessionSettings,
}

impl SessionStore {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            settings,
        }
    }

    /// Returns the session for `id`, creating it when there is room.
    pub async fn get_or_create(&self, id: &str) -> Result<Arc<Mutex<ConversationSession>>> {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(id) {
            entry.last_seen = Instant::now();
            return Ok(entry.session.clone());
        }
        if entries.len() >= self.settings.max_sessions {
            tracing::warn!(
                "Refusing session {}: {} sessions already active",
                id,
                entries.len()
            );
            return Err(AppError::SessionLimitReached);
        }

        tracing::debug!("Creating session {}", id);
        let session = Arc::new(Mutex::new(ConversationSession::new(
            id.to_string(),
            self.settings.account_address.clone(),
            self.settings.token_symbol.clone(),
            self.settings.pending_ttl,
        )));
        entries.insert(
            id.to_string(),
            SessionEntry {
                session: session.clone(),
                last_seen: Instant::now(),
            },
        );
        Ok(session)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Mutex<ConversationSession>>> {
        let entries = self.entries.read().await;
        entries.get(id).map(|entry| entry.session.clone())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Drops sessions idle for at least `ttl`. Sessions still referenced by an
    /// in-flight request are kept.
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| {
            entry.last_seen.elapsed() < ttl || Arc::strong_count(&entry.session) > 1
        });
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_cap(max_sessions: usize) -> SessionStore {
        SessionStore::new(SessionSettings {
            account_address: Some("5Alice".to_string()),
            token_symbol: "ASTR".to_string(),
            pending_ttl: Some(Duration::from_secs(300)),
            max_sessions,
        })
    }

    fn store() -> SessionStore {
        store_with_cap(100)
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let store = store();
        let first = store.get_or_create("tab-1").await.expect("session");
        let second = store.get_or_create("tab-2").await.expect("session");

        first
            .lock()
            .await
            .open_pending_transfer(Decimal::from(3), "5Bob".into(), false, Utc::now());

        assert!(first.lock().await.is_awaiting_confirmation());
        assert!(!second.lock().await.is_awaiting_confirmation());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn get_or_create_returns_same_session() {
        let store = store();
        let first = store.get_or_create("tab-1").await.expect("session");
        let again = store.get_or_create("tab-1").await.expect("session");
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(first.lock().await.account_address(), Some("5Alice"));
    }

    #[tokio::test]
    async fn evict_idle_skips_sessions_in_use() {
        let store = store();
        let held = store.get_or_create("busy").await.expect("session");
        drop(store.get_or_create("idle").await.expect("session"));

        let evicted = store.evict_idle(Duration::ZERO).await;
        assert_eq!(evicted, 1);
        assert!(store.get("busy").await.is_some());
        assert!(store.get("idle").await.is_none());
        drop(held);
    }

    #[tokio::test]
    async fn new_sessions_are_refused_once_the_store_is_full() {
        let store = store_with_cap(2);
        let first = store.get_or_create("tab-1").await.expect("session");
        store.get_or_create("tab-2").await.expect("session");

        assert!(matches!(
            store.get_or_create("tab-3").await,
            Err(AppError::SessionLimitReached)
        ));
        let again = store.get_or_create("tab-1").await.expect("existing session");
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(store.len().await, 2);
    }

    #[test]
    fn account_context_lists_balance_info_and_history() {
        let mut session = ConversationSession::new(
            "s".to_string(),
            Some("5Alice".to_string()),
            "ASTR".to_string(),
            None,
        );
        session.set_balance(Decimal::from(12));
        session.set_account_info("Free: 12 ASTR, Reserved: 0".to_string());
        session.history.push(TransactionRecord {
            destination: "5Bob".to_string(),
            amount: Decimal::from(2),
            transaction_hash: "0xabc".to_string(),
            timestamp: Utc::now(),
        });

        let context = session.account_context();
        assert!(context.contains("Address: 5Alice"));
        assert!(context.contains("Balance: 12 ASTR"));
        assert!(context.contains("Account info: Free: 12 ASTR, Reserved: 0"));
        assert!(context.contains("sent 2 ASTR to 5Bob (hash 0xabc)"));
    }

    #[test]
    fn account_context_without_data_is_explicit() {
        let session = ConversationSession::new("s".to_string(), None, "ASTR".to_string(), None);
        let context = session.account_context();
        assert!(context.contains("Address: unknown"));
        assert!(context.contains("Balance: unknown"));
        assert!(context.contains("Recent transactions: none"));
    }
}
