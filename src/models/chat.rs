use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{AppError, Result};

/// Structured classification of one user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentEnvelope {
    /// Missing amount or destination are carried as `Decimal::ZERO` / `""`.
    Transaction {
        amount: Decimal,
        destination: String,
        allow_death: bool,
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
    Unknown {
        raw: String,
    },
}

impl IntentEnvelope {
    pub fn category(&self) -> &'static str {
        match self {
            IntentEnvelope::Transaction { .. } => "transaction",
            IntentEnvelope::Account { .. } => "account",
            IntentEnvelope::Knowledge { .. } => "knowledge",
            IntentEnvelope::ContractGeneration { .. } => "contractGeneration",
            IntentEnvelope::General { .. } => "general",
            IntentEnvelope::Unknown { .. } => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransfer {
    pub destination: String,
    pub amount: Decimal,
    pub allow_death: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub destination: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub transaction_hash: String,
    pub timestamp: DateTime<Utc>,
}

/// Validated body of `POST /api/gpt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
    pub account_info: Option<String>,
}

impl ChatRequest {
    /// Validates a raw JSON body. Field types are checked by hand so the
    /// client gets a descriptive message instead of a generic extractor error.
    pub fn from_value(body: &serde_json::Value) -> Result<Self> {
        let object = body
            .as_object()
            .ok_or_else(|| AppError::Validation("Request body must be a JSON object".to_string()))?;

        let message = match object.get("message") {
            None | Some(serde_json::Value::Null) => {
                return Err(AppError::Validation("message is required".to_string()))
            }
            Some(serde_json::Value::String(text)) => text.clone(),
            Some(_) => return Err(AppError::Validation("message must be a string".to_string())),
        };
        if message.trim().is_empty() {
            return Err(AppError::Validation("message must not be empty".to_string()));
        }

        let account_info = match object.get("accountInfo") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(text)) => Some(text.clone()),
            Some(_) => {
                return Err(AppError::Validation(
                    "accountInfo must be a string when provided".to_string(),
                ))
            }
        };

        Ok(Self {
            message,
            account_info,
        })
    }
}

/// Uniform reply payload. Which flags are present depends on the path that
/// produced the reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_transaction: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_account: Option<bool>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::str_option"
    )]
    pub amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_death: Option<bool>,
}

impl ChatReply {
    pub fn text(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            is_transaction: Some(false),
            is_account: None,
            amount: None,
            dest: None,
            allow_death: None,
        }
    }

    pub fn account(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            is_transaction: None,
            is_account: Some(true),
            amount: None,
            dest: None,
            allow_death: None,
        }
    }

    pub fn transfer_prompt(reply: impl Into<String>, pending: &PendingTransfer) -> Self {
        Self {
            reply: reply.into(),
            is_transaction: Some(true),
            is_account: None,
            amount: Some(pending.amount),
            dest: Some(pending.destination.clone()),
            allow_death: Some(pending.allow_death),
        }
    }

    #[cfg(test)]
    pub fn opens_transfer(&self) -> bool {
        self.is_transaction == Some(true)
    }
}
