use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::constants::FALLBACK_REPLY;
use crate::models::{ChatReply, IntentEnvelope};
use crate::services::completion::CompletionError;
use crate::services::generators::{GeneratorKind, ResponseGenerators};
use crate::services::session_store::ConversationSession;

/// Routes a classified envelope to exactly one response path.
pub struct CategoryDispatcher {
    generators: Arc<ResponseGenerators>,
}

impl CategoryDispatcher {
    pub fn new(generators: Arc<ResponseGenerators>) -> Self {
        Self { generators }
    }

    pub async fn dispatch(
        &self,
        envelope: IntentEnvelope,
        message: &str,
        session: &mut ConversationSession,
        now: DateTime<Utc>,
    ) -> Result<ChatReply, CompletionError> {
        let reply = match envelope {
            // The classifier answers general messages itself; an empty answer
            // falls back to the general generator.
            IntentEnvelope::General { info } if !info.trim().is_empty() => ChatReply::text(info),
            IntentEnvelope::General { .. } => ChatReply::text(
                self.generators
                    .generate(GeneratorKind::General, message, None)
                    .await?,
            ),
            IntentEnvelope::Account { query } => {
                let context = session.account_context();
                ChatReply::account(
                    self.generators
                        .generate(GeneratorKind::Account, &query, Some(&context))
                        .await?,
                )
            }
            IntentEnvelope::Knowledge { query } => ChatReply::text(
                self.generators
                    .generate(GeneratorKind::Knowledge, &query, None)
                    .await?,
            ),
            IntentEnvelope::ContractGeneration { query } => ChatReply::text(
                self.generators
                    .generate(GeneratorKind::ContractGeneration, &query, None)
                    .await?,
            ),
            IntentEnvelope::Transaction {
                amount,
                destination,
                allow_death,
            } => session.open_pending_transfer(amount, destination, allow_death, now),
            IntentEnvelope::Unknown { raw } => {
                tracing::debug!(
                    "Session {} got fallback reply for unclassified output ({} chars)",
                    session.id(),
                    raw.len()
                );
                ChatReply::text(FALLBACK_REPLY)
            }
        };
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::ScriptedCompletion;
    use rust_decimal::Decimal;
    use std::time::Duration;

    fn setup() -> (Arc<ScriptedCompletion>, CategoryDispatcher, ConversationSession) {
        let completion = Arc::new(ScriptedCompletion::repeating("generated"));
        let generators = Arc::new(ResponseGenerators::new(
            completion.clone(),
            0.7,
            Duration::from_secs(1),
            "ASTR".to_string(),
        ));
        let session = ConversationSession::new(
            "s".to_string(),
            Some("5Alice".to_string()),
            "ASTR".to_string(),
            None,
        );
        (completion, CategoryDispatcher::new(generators), session)
    }

    #[tokio::test]
    async fn general_echoes_info_without_completion_call() {
        let (completion, dispatcher, mut session) = setup();
        let reply = dispatcher
            .dispatch(
                IntentEnvelope::General {
                    info: "Hello there!".to_string(),
                },
                "hi",
                &mut session,
                Utc::now(),
            )
            .await
            .expect("reply");
        assert_eq!(reply, ChatReply::text("Hello there!"));
        assert_eq!(completion.call_count(), 0);
    }

    #[tokio::test]
    async fn blank_general_info_uses_general_generator() {
        let (completion, dispatcher, mut session) = setup();
        let reply = dispatcher
            .dispatch(
                IntentEnvelope::General {
                    info: " ".to_string(),
                },
                "tell me a joke",
                &mut session,
                Utc::now(),
            )
            .await
            .expect("reply");
        assert_eq!(reply.reply, "generated");
        assert_eq!(completion.call_count(), 1);
        assert!(completion.prompts()[0].contains("Message: tell me a joke"));
    }

    #[tokio::test]
    async fn account_routes_with_session_context() {
        let (completion, dispatcher, mut session) = setup();
        let reply = dispatcher
            .dispatch(
                IntentEnvelope::Account {
                    query: "what's my balance?".to_string(),
                },
                "what's my balance?",
                &mut session,
                Utc::now(),
            )
            .await
            .expect("reply");
        assert_eq!(reply, ChatReply::account("generated"));
        let prompts = completion.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Address: 5Alice"));
        assert!(prompts[0].contains("Question: what's my balance?"));
    }

    #[tokio::test]
    async fn each_query_category_hits_exactly_one_generator() {
        let cases = [
            (
                IntentEnvelope::Knowledge {
                    query: "what is a parachain?".to_string(),
                },
                "Polkadot, Astar",
            ),
            (
                IntentEnvelope::ContractGeneration {
                    query: "flipper contract".to_string(),
                },
                "smart contract engineer",
            ),
        ];
        for (envelope, persona) in cases {
            let (completion, dispatcher, mut session) = setup();
            let reply = dispatcher
                .dispatch(envelope, "msg", &mut session, Utc::now())
                .await
                .expect("reply");
            assert_eq!(reply, ChatReply::text("generated"));
            let prompts = completion.prompts();
            assert_eq!(prompts.len(), 1);
            assert!(prompts[0].contains(persona));
            assert!(!prompts[0].contains("Address: 5Alice"));
            assert!(!session.is_awaiting_confirmation());
        }
    }

    #[tokio::test]
    async fn transaction_opens_pending_transfer_without_completion_call() {
        let (completion, dispatcher, mut session) = setup();
        let reply = dispatcher
            .dispatch(
                IntentEnvelope::Transaction {
                    amount: Decimal::from(100),
                    destination: "5Bob".to_string(),
                    allow_death: false,
                },
                "send 100 to 5Bob",
                &mut session,
                Utc::now(),
            )
            .await
            .expect("reply");
        assert!(reply.opens_transfer());
        assert_eq!(reply.dest.as_deref(), Some("5Bob"));
        assert_eq!(reply.allow_death, Some(false));
        assert!(session.is_awaiting_confirmation());
        assert_eq!(completion.call_count(), 0);
    }

    #[tokio::test]
    async fn unknown_returns_fallback() {
        let (completion, dispatcher, mut session) = setup();
        let reply = dispatcher
            .dispatch(
                IntentEnvelope::Unknown {
                    raw: "garbage".to_string(),
                },
                "???",
                &mut session,
                Utc::now(),
            )
            .await
            .expect("reply");
        assert_eq!(reply, ChatReply::text(FALLBACK_REPLY));
        assert_eq!(completion.call_count(), 0);
        assert!(!session.is_awaiting_confirmation());
    }
}
