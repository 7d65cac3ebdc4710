pub mod chat;
pub mod health;

use axum::http::HeaderMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::constants::{MAX_SESSION_ID_LEN, SESSION_HEADER};
use crate::error::{AppError, Result};
use crate::integrations::{
    LedgerClient, LedgerGatewayClient, LedgerTransferExecutor, TransferExecutor,
    UnconfiguredLedger,
};
use crate::services::{
    ChatService, CompletionClient, OpenAiCompletionClient, RateLimiter, SessionSettings,
    SessionStore,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub sessions: SessionStore,
    pub chat: Arc<ChatService>,
    pub rate_limiter: RateLimiter,
    pub client_rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let completion: Arc<dyn CompletionClient> =
            Arc::new(OpenAiCompletionClient::from_config(&config));
        let ledger: Arc<dyn LedgerClient> = match config.ledger_rpc_url.clone() {
            Some(rpc_url) => Arc::new(LedgerGatewayClient::new(
                rpc_url,
                config.transfer_timeout_ms,
            )),
            None => {
                tracing::warn!("LEDGER_RPC_URL not set; transfers and balance lookups disabled");
                Arc::new(UnconfiguredLedger)
            }
        };
        let executor: Arc<dyn TransferExecutor> = Arc::new(LedgerTransferExecutor::new(
            ledger.clone(),
            config.ledger_sender_address.clone(),
        ));
        Self::with_collaborators(config, completion, ledger, executor)
    }

    pub fn with_collaborators(
        config: Config,
        completion: Arc<dyn CompletionClient>,
        ledger: Arc<dyn LedgerClient>,
        executor: Arc<dyn TransferExecutor>,
    ) -> Self {
        let pending_ttl = (config.pending_transfer_ttl_secs > 0)
            .then(|| Duration::from_secs(config.pending_transfer_ttl_secs));
        let sessions = SessionStore::new(SessionSettings {
            account_address: config.ledger_sender_address.clone(),
            token_symbol: config.ledger_token_symbol.clone(),
            pending_ttl,
            max_sessions: config.max_sessions,
        });
        let rate_limiter =
            RateLimiter::new(config.rate_limit_per_window, config.rate_limit_window_secs);
        let client_rate_limiter = RateLimiter::new(
            config.client_rate_limit_per_window,
            config.rate_limit_window_secs,
        );
        let chat = Arc::new(ChatService::new(&config, completion, ledger, executor));
        Self {
            config,
            sessions,
            chat,
            rate_limiter,
            client_rate_limiter,
        }
    }
}

/// Reads the conversation id every chat request must carry.
pub fn session_id_from_headers(headers: &HeaderMap) -> Result<String> {
    let raw = headers
        .get(SESSION_HEADER)
        .ok_or_else(|| AppError::Validation("Missing X-Session-Id header".to_string()))?;
    let value = raw
        .to_str()
        .map_err(|_| AppError::Validation("Invalid X-Session-Id header".to_string()))?
        .trim();
    if value.is_empty() || value.len() > MAX_SESSION_ID_LEN {
        return Err(AppError::Validation(format!(
            "X-Session-Id must be 1-{} characters",
            MAX_SESSION_ID_LEN
        )));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn session_id_is_required() {
        let headers = HeaderMap::new();
        assert!(matches!(
            session_id_from_headers(&headers),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn session_id_is_trimmed_and_bounded() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_static(" tab-1 "));
        assert_eq!(session_id_from_headers(&headers).expect("id"), "tab-1");

        let long = "a".repeat(MAX_SESSION_ID_LEN + 1);
        headers.insert(SESSION_HEADER, HeaderValue::from_str(&long).expect("header"));
        assert!(session_id_from_headers(&headers).is_err());

        headers.insert(SESSION_HEADER, HeaderValue::from_static("   "));
        assert!(session_id_from_headers(&headers).is_err());
    }
}
