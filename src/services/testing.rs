//! In-test collaborators shared by the service test modules.

use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::integrations::ledger::{LedgerError, Receipt, TransferExecutor};
use crate::services::completion::{CompletionClient, CompletionError};

/// Replays canned replies and records every prompt it receives.
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<String>>,
    repeat: Option<String>,
    fail: bool,
    calls: Mutex<Vec<(String, f32)>>,
}

impl ScriptedCompletion {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(str::to_string).collect()),
            repeat: None,
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn repeating(reply: &str) -> Self {
        Self {
            repeat: Some(reply.to_string()),
            ..Self::new(Vec::new())
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(prompt, _)| prompt.clone())
            .collect()
    }

    pub fn temperatures(&self) -> Vec<f32> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, CompletionError> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), temperature));
        if self.fail {
            return Err(CompletionError::NotConfigured);
        }
        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            return Ok(reply);
        }
        self.repeat.clone().ok_or(CompletionError::EmptyResponse)
    }
}

/// Records transfers and answers with a fixed receipt or error.
pub struct RecordingExecutor {
    outcome: Result<String, String>,
    pub transfers: Mutex<Vec<(String, Decimal, bool)>>,
}

impl RecordingExecutor {
    pub fn succeeding(hash: &str) -> Self {
        Self {
            outcome: Ok(hash.to_string()),
            transfers: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
            transfers: Mutex::new(Vec::new()),
        }
    }

    pub fn transfer_count(&self) -> usize {
        self.transfers.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl TransferExecutor for RecordingExecutor {
    async fn transfer(
        &self,
        destination: &str,
        amount: Decimal,
        allow_death: bool,
    ) -> Result<Receipt, LedgerError> {
        self.transfers
            .lock()
            .unwrap()
            .push((destination.to_string(), amount, allow_death));
        match &self.outcome {
            Ok(hash) => Ok(Receipt { hash: hash.clone() }),
            Err(message) => Err(LedgerError::Rejected(message.clone())),
        }
    }
}
