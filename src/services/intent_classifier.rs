use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::models::IntentEnvelope;
use crate::services::completion::{CompletionClient, CompletionError};

const FENCE: &str = "```";

/// Why a completion reply could not be turned into an envelope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("reply is empty")]
    Empty,

    #[error("reply is not JSON: {0}")]
    NotJson(String),

    #[error("reply is an empty array")]
    EmptyArray,

    #[error("reply is not a JSON object")]
    NotAnObject,

    #[error("reply does not match any category schema: {0}")]
    Schema(String),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "category", rename_all = "camelCase")]
enum ClassifiedIntent {
    Transaction {
        #[serde(default)]
        amount: Option<serde_json::Value>,
        #[serde(default)]
        destination: Option<String>,
        #[serde(default, rename = "allowDeath", alias = "allow_death")]
        allow_death: Option<bool>,
    },
    Account {
        query: String,
    },
    Knowledge {
        query: String,
    },
    ContractGeneration {
        query: String,
    },
    General {
        info: String,
    },
}

// Missing, null or unreadable amounts collapse to zero so the confirmation
// prompt can echo them.
fn amount_from_value(value: Option<&serde_json::Value>) -> Decimal {
    let text = match value {
        Some(serde_json::Value::Number(number)) => number.to_string(),
        Some(serde_json::Value::String(text)) => text.trim().replace(',', ""),
        _ => return Decimal::ZERO,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .unwrap_or(Decimal::ZERO)
}

impl From<ClassifiedIntent> for IntentEnvelope {
    fn from(intent: ClassifiedIntent) -> Self {
        match intent {
            ClassifiedIntent::Transaction {
                amount,
                destination,
                allow_death,
            } => IntentEnvelope::Transaction {
                amount: amount_from_value(amount.as_ref()),
                destination: destination.map(|d| d.trim().to_string()).unwrap_or_default(),
                allow_death: allow_death.unwrap_or(false),
            },
            ClassifiedIntent::Account { query } => IntentEnvelope::Account { query },
            ClassifiedIntent::Knowledge { query } => IntentEnvelope::Knowledge { query },
            ClassifiedIntent::ContractGeneration { query } => {
                IntentEnvelope::ContractGeneration { query }
            }
            ClassifiedIntent::General { info } => IntentEnvelope::General { info },
        }
    }
}

/// Removes a code fence only when the text both opens and closes with one.
/// An info string on the opening fence (```json) is dropped with it.
fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.len() < FENCE.len() * 2 || !trimmed.starts_with(FENCE) || !trimmed.ends_with(FENCE)
    {
        return trimmed;
    }
    let inner = &trimmed[FENCE.len()..trimmed.len() - FENCE.len()];
    let inner = match inner.find('\n') {
        Some(newline)
            if inner[..newline]
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') =>
        {
            &inner[newline + 1..]
        }
        _ => inner,
    };
    inner.trim()
}

/// Parses a classifier reply: a JSON object, or an array whose first element
/// is the object, optionally wrapped in a code fence.
pub fn parse_intent_reply(raw: &str) -> Result<IntentEnvelope, ParseFailure> {
    let body = strip_fence(raw);
    if body.is_empty() {
        return Err(ParseFailure::Empty);
    }

    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| ParseFailure::NotJson(e.to_string()))?;
    let object = match value {
        serde_json::Value::Array(items) => items.into_iter().next().ok_or(ParseFailure::EmptyArray)?,
        other => other,
    };
    if !object.is_object() {
        return Err(ParseFailure::NotAnObject);
    }

    serde_json::from_value::<ClassifiedIntent>(object)
        .map(IntentEnvelope::from)
        .map_err(|e| ParseFailure::Schema(e.to_string()))
}

pub fn build_classification_prompt(user_text: &str, token_symbol: &str) -> String {
    format!(
        r#"You are the intent classifier of a chat assistant for a {token} wallet on a Substrate-based network.
Classify the user message into exactly one of these categories and answer with ONLY the JSON object for that category, no prose:

1. transaction - the user wants to send or transfer funds.
   {{"category": "transaction", "amount": <number>, "destination": "<recipient address>", "allowDeath": <true|false>}}
   allowDeath is true only if the user explicitly accepts that the transfer may reap (deactivate) their account.
2. account - the user asks about their own balance, address or past transactions.
   {{"category": "account", "query": "<the user's question>"}}
3. knowledge - the user asks about the blockchain, the network, staking, fees or other domain knowledge.
   {{"category": "knowledge", "query": "<the user's question>"}}
4. contractGeneration - the user wants smart contract code written or explained.
   {{"category": "contractGeneration", "query": "<the user's request>"}}
5. general - anything else; answer it yourself in one or two sentences.
   {{"category": "general", "info": "<your short answer>"}}

If the amount or destination is missing for a transaction, use 0 and "".

User message: """{message}""""#,
        token = token_symbol,
        message = user_text
    )
}

/// Classifies user messages through one low-temperature completion call.
pub struct IntentClassifier {
    completion: Arc<dyn CompletionClient>,
    temperature: f32,
    timeout: Duration,
    token_symbol: String,
}

impl IntentClassifier {
    pub fn new(
        completion: Arc<dyn CompletionClient>,
        temperature: f32,
        timeout: Duration,
        token_symbol: String,
    ) -> Self {
        Self {
            completion,
            temperature,
            timeout,
            token_symbol,
        }
    }

    /// Malformed replies are downgraded to `Unknown`; only completion
    /// transport failures are returned as errors.
    pub async fn classify(&self, user_text: &str) -> Result<IntentEnvelope, CompletionError> {
        let prompt = build_classification_prompt(user_text, &self.token_symbol);
        let raw = tokio::time::timeout(
            self.timeout,
            self.completion.complete(&prompt, self.temperature),
        )
        .await
        .map_err(|_| CompletionError::Timeout(self.timeout.as_millis() as u64))??;

        match parse_intent_reply(&raw) {
            Ok(envelope) => {
                tracing::debug!("Classified message as {}", envelope.category());
                Ok(envelope)
            }
            Err(failure) => {
                tracing::warn!("Unparseable classifier reply ({}): {:?}", failure, raw);
                Ok(IntentEnvelope::Unknown { raw })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::ScriptedCompletion;

    fn classifier(completion: Arc<ScriptedCompletion>) -> IntentClassifier {
        IntentClassifier::new(completion, 0.0, Duration::from_secs(1), "ASTR".to_string())
    }

    #[test]
    fn parses_plain_object() {
        let envelope =
            parse_intent_reply(r#"{"category": "knowledge", "query": "what is staking?"}"#)
                .expect("valid reply");
        assert_eq!(
            envelope,
            IntentEnvelope::Knowledge {
                query: "what is staking?".to_string()
            }
        );
    }

    #[test]
    fn parses_first_element_of_array() {
        let envelope = parse_intent_reply(
            r#"[{"category": "account", "query": "my balance"}, {"category": "general", "info": "x"}]"#,
        )
        .expect("valid reply");
        assert_eq!(
            envelope,
            IntentEnvelope::Account {
                query: "my balance".to_string()
            }
        );
    }

    #[test]
    fn parses_fenced_reply_with_language_tag() {
        let raw = "```json\n{\"category\": \"transaction\", \"amount\": 100, \"destination\": \"5Dest\", \"allowDeath\": false}\n```";
        let envelope = parse_intent_reply(raw).expect("valid reply");
        assert_eq!(
            envelope,
            IntentEnvelope::Transaction {
                amount: Decimal::from(100),
                destination: "5Dest".to_string(),
                allow_death: false,
            }
        );
    }

    #[test]
    fn parses_fenced_array() {
        let raw = "```[{\"category\": \"contractGeneration\", \"query\": \"ERC20 in ink!\"}]```";
        assert_eq!(
            parse_intent_reply(raw).expect("valid reply").category(),
            "contractGeneration"
        );
    }

    #[test]
    fn transaction_without_fields_uses_sentinels() {
        let envelope =
            parse_intent_reply(r#"{"category": "transaction", "amount": null}"#).expect("valid");
        assert_eq!(
            envelope,
            IntentEnvelope::Transaction {
                amount: Decimal::ZERO,
                destination: String::new(),
                allow_death: false,
            }
        );
    }

    #[test]
    fn transaction_amount_accepts_strings() {
        let envelope = parse_intent_reply(
            r#"{"category": "transaction", "amount": "1,250.5", "destination": "5D", "allow_death": true}"#,
        )
        .expect("valid");
        assert_eq!(
            envelope,
            IntentEnvelope::Transaction {
                amount: Decimal::from_str("1250.5").expect("decimal"),
                destination: "5D".to_string(),
                allow_death: true,
            }
        );
    }

    #[test]
    fn unbalanced_fence_is_not_stripped() {
        let raw = "```json\n{\"category\": \"general\", \"info\": \"hi\"}";
        assert!(matches!(
            parse_intent_reply(raw),
            Err(ParseFailure::NotJson(_))
        ));
    }

    #[test]
    fn malformed_replies_are_rejected() {
        assert_eq!(parse_intent_reply(""), Err(ParseFailure::Empty));
        assert_eq!(parse_intent_reply("``````"), Err(ParseFailure::Empty));
        assert_eq!(parse_intent_reply("[]"), Err(ParseFailure::EmptyArray));
        assert_eq!(parse_intent_reply("42"), Err(ParseFailure::NotAnObject));
        assert!(matches!(
            parse_intent_reply("Sure! Here is the JSON"),
            Err(ParseFailure::NotJson(_))
        ));
        assert!(matches!(
            parse_intent_reply(r#"{"category": "weather", "query": "rain?"}"#),
            Err(ParseFailure::Schema(_))
        ));
        assert!(matches!(
            parse_intent_reply(r#"{"category": "account"}"#),
            Err(ParseFailure::Schema(_))
        ));
    }

    #[test]
    fn prompt_embeds_message_and_all_categories() {
        let prompt = build_classification_prompt("send 5 to Bob", "ASTR");
        assert!(prompt.contains("send 5 to Bob"));
        for category in [
            "\"transaction\"",
            "\"account\"",
            "\"knowledge\"",
            "\"contractGeneration\"",
            "\"general\"",
        ] {
            assert!(prompt.contains(category), "missing {}", category);
        }
    }

    #[tokio::test]
    async fn classify_downgrades_malformed_replies_to_unknown() {
        for raw in ["", "not json", "```{\"category\": \"general\"", "[]"] {
            let completion = Arc::new(ScriptedCompletion::new(vec![raw]));
            let envelope = classifier(completion)
                .classify("hello")
                .await
                .expect("never fails on parse errors");
            assert_eq!(
                envelope,
                IntentEnvelope::Unknown {
                    raw: raw.to_string()
                }
            );
        }
    }

    #[tokio::test]
    async fn classify_is_idempotent_with_deterministic_completion() {
        let reply = r#"{"category": "transaction", "amount": 7, "destination": "5D", "allowDeath": false}"#;
        let completion = Arc::new(ScriptedCompletion::repeating(reply));
        let classifier = classifier(completion.clone());
        let first = classifier.classify("send 7 to 5D").await.expect("classified");
        let second = classifier.classify("send 7 to 5D").await.expect("classified");
        assert_eq!(first, second);
        assert_eq!(completion.temperatures(), vec![0.0, 0.0]);
    }

    #[tokio::test]
    async fn classify_surfaces_completion_outage() {
        let completion = Arc::new(ScriptedCompletion::failing());
        let result = classifier(completion).classify("hello").await;
        assert!(result.is_err());
    }
}
