use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::constants::{CONFIRM_KEYWORD, EXPIRED_TRANSFER_REPLY, NOTHING_TO_CONFIRM_REPLY};
use crate::error::Result;
use crate::integrations::ledger::{LedgerClient, LedgerError, TransferExecutor};
use crate::models::{ChatReply, ChatRequest, IntentEnvelope};
use crate::services::completion::CompletionClient;
use crate::services::dispatcher::CategoryDispatcher;
use crate::services::generators::ResponseGenerators;
use crate::services::intent_classifier::IntentClassifier;
use crate::services::session_store::ConversationSession;

/// Chat pipeline: confirmation keyword check, then classify and dispatch.
pub struct ChatService {
    classifier: IntentClassifier,
    dispatcher: CategoryDispatcher,
    executor: Arc<dyn TransferExecutor>,
    ledger: Arc<dyn LedgerClient>,
    transfer_timeout: Duration,
}

impl ChatService {
    pub fn new(
        config: &Config,
        completion: Arc<dyn CompletionClient>,
        ledger: Arc<dyn LedgerClient>,
        executor: Arc<dyn TransferExecutor>,
    ) -> Self {
        let completion_timeout = Duration::from_millis(config.completion_timeout_ms);
        let classifier = IntentClassifier::new(
            completion.clone(),
            config.classifier_temperature,
            completion_timeout,
            config.ledger_token_symbol.clone(),
        );
        let generators = Arc::new(ResponseGenerators::new(
            completion,
            config.generator_temperature,
            completion_timeout,
            config.ledger_token_symbol.clone(),
        ));
        Self {
            classifier,
            dispatcher: CategoryDispatcher::new(generators),
            executor,
            ledger,
            transfer_timeout: Duration::from_millis(config.transfer_timeout_ms),
        }
    }

    /// Handles one validated message for `session`. The caller holds the
    /// session lock for the whole call.
    pub async fn handle_message(
        &self,
        session: &mut ConversationSession,
        request: ChatRequest,
    ) -> Result<ChatReply> {
        if let Some(info) = request.account_info {
            session.set_account_info(info);
        }
        if session.recover_interrupted_transfer() {
            tracing::warn!("Session {} recovered an interrupted transfer", session.id());
        }

        let now = Utc::now();
        let expired = session.expire_pending_transfer(now);

        if request.message == CONFIRM_KEYWORD {
            if !session.is_awaiting_confirmation() {
                let reply = if expired {
                    EXPIRED_TRANSFER_REPLY
                } else {
                    NOTHING_TO_CONFIRM_REPLY
                };
                return Ok(ChatReply::text(reply));
            }
            tracing::info!("Session {} confirmed pending transfer", session.id());
            let outcome = session
                .confirm_pending_transfer(self.executor.as_ref(), self.transfer_timeout)
                .await;
            return Ok(match outcome {
                Some(outcome) => {
                    tracing::info!(
                        "Session {} transfer finished: {}",
                        session.id(),
                        if outcome.is_completed() { "completed" } else { "failed" }
                    );
                    outcome.into_reply()
                }
                None => ChatReply::text(NOTHING_TO_CONFIRM_REPLY),
            });
        }

        let envelope = self.classifier.classify(&request.message).await?;
        tracing::info!(
            "Session {} message classified as {} (transfer phase: {})",
            session.id(),
            envelope.category(),
            session.transfer_phase()
        );

        if matches!(envelope, IntentEnvelope::Account { .. }) {
            self.refresh_balance(session).await;
        }

        let reply = self
            .dispatcher
            .dispatch(envelope, &request.message, session, now)
            .await?;
        Ok(reply)
    }

    async fn refresh_balance(&self, session: &mut ConversationSession) {
        let Some(address) = session.account_address().map(str::to_string) else {
            return;
        };
        match self.ledger.free_balance(&address).await {
            Ok(balance) => session.set_balance(balance),
            Err(LedgerError::NotConfigured) => {}
            Err(err) => tracing::warn!("Balance lookup for {} failed: {}", address, err),
        }
    }
}
