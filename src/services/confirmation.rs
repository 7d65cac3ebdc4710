use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::time::Duration;

use crate::constants::{CONFIRM_KEYWORD, MAX_TRANSACTION_HISTORY};
use crate::integrations::ledger::{LedgerError, TransferExecutor};
use crate::models::{ChatReply, PendingTransfer, TransactionRecord};

/// Where a session's transfer handshake currently stands. `Completed` and
/// `Failed` are outcomes of `Executing`, both of which land back on `Idle`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConfirmationState {
    Idle,
    AwaitingConfirmation(PendingTransfer),
    Executing(PendingTransfer),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    Completed {
        record: TransactionRecord,
        reply: ChatReply,
    },
    Failed {
        error: LedgerError,
        reply: ChatReply,
    },
}

impl TransferOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TransferOutcome::Completed { .. })
    }

    #[cfg(test)]
    pub fn reply(&self) -> &ChatReply {
        match self {
            TransferOutcome::Completed { reply, .. } | TransferOutcome::Failed { reply, .. } => reply,
        }
    }

    pub fn into_reply(self) -> ChatReply {
        match self {
            TransferOutcome::Completed { reply, .. } | TransferOutcome::Failed { reply, .. } => reply,
        }
    }
}

/// Bounded, append-only log of executed transfers.
#[derive(Debug, Clone, Default)]
pub struct TransactionHistory {
    records: VecDeque<TransactionRecord>,
}

impl TransactionHistory {
    pub fn push(&mut self, record: TransactionRecord) {
        if self.records.len() == MAX_TRANSACTION_HISTORY {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> Vec<TransactionRecord> {
        self.records.iter().cloned().collect()
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> impl Iterator<Item = &TransactionRecord> {
        self.records.iter().rev().take(limit)
    }
}

pub fn confirmation_prompt(pending: &PendingTransfer, token_symbol: &str) -> String {
    format!(
        "You are about to transfer {} {} to \"{}\" (allowDeath: {}). Reply with exactly {} to proceed.",
        pending.amount, token_symbol, pending.destination, pending.allow_death, CONFIRM_KEYWORD
    )
}

fn success_reply(record: &TransactionRecord) -> String {
    format!(
        "Transaction successful! Sent {} to {}. Transaction hash: {}",
        record.amount, record.destination, record.transaction_hash
    )
}

fn failure_reply(error: &LedgerError) -> String {
    format!(
        "Transaction failed: {}. If the transfer would take your balance below the existential deposit, \
         send the request again with allowDeath enabled.",
        error
    )
}

/// Per-session transfer confirmation handshake. The pending transfer is
/// private to this type.
#[derive(Debug, Clone)]
pub struct ConfirmationMachine {
    state: ConfirmationState,
    pending_ttl: Option<chrono::Duration>,
    token_symbol: String,
}

impl ConfirmationMachine {
    /// `pending_ttl` of `None` keeps pending transfers until confirmed or replaced.
    pub fn new(pending_ttl: Option<Duration>, token_symbol: String) -> Self {
        Self {
            state: ConfirmationState::Idle,
            pending_ttl: pending_ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok()),
            token_symbol,
        }
    }

    pub fn phase(&self) -> &'static str {
        match self.state {
            ConfirmationState::Idle => "idle",
            ConfirmationState::AwaitingConfirmation(_) => "awaiting_confirmation",
            ConfirmationState::Executing(_) => "executing",
        }
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.state, ConfirmationState::AwaitingConfirmation(_))
    }

    /// Stores a new pending transfer, replacing any earlier one, and returns
    /// the prompt asking for the confirmation keyword.
    pub fn open_pending_transfer(
        &mut self,
        amount: Decimal,
        destination: String,
        allow_death: bool,
        now: DateTime<Utc>,
    ) -> ChatReply {
        if let ConfirmationState::AwaitingConfirmation(previous) = &self.state {
            tracing::info!(
                "Replacing pending transfer dest={} amount={}",
                previous.destination,
                previous.amount
            );
        }
        let pending = PendingTransfer {
            destination,
            amount,
            allow_death,
            created_at: now,
        };
        let prompt = confirmation_prompt(&pending, &self.token_symbol);
        let reply = ChatReply::transfer_prompt(prompt, &pending);
        self.state = ConfirmationState::AwaitingConfirmation(pending);
        reply
    }

    /// Drops a pending transfer older than the TTL. Returns whether one expired.
    pub fn expire_if_stale(&mut self, now: DateTime<Utc>) -> bool {
        let (Some(ttl), ConfirmationState::AwaitingConfirmation(pending)) =
            (self.pending_ttl, &self.state)
        else {
            return false;
        };
        if now.signed_duration_since(pending.created_at) < ttl {
            return false;
        }
        tracing::info!(
            "Pending transfer expired dest={} amount={}",
            pending.destination,
            pending.amount
        );
        self.state = ConfirmationState::Idle;
        true
    }

    /// Resolves a session left in `Executing` (the executing task died) as
    /// failed. Returns whether anything was recovered.
    pub fn recover_interrupted(&mut self) -> bool {
        if let ConfirmationState::Executing(pending) = &self.state {
            tracing::warn!(
                "Transfer to {} was interrupted while executing; marking failed",
                pending.destination
            );
            self.state = ConfirmationState::Idle;
            return true;
        }
        false
    }

    /// Runs the pending transfer through `executor`. Returns `None` when
    /// nothing is awaiting confirmation.
    pub async fn confirm(
        &mut self,
        executor: &dyn TransferExecutor,
        history: &mut TransactionHistory,
        timeout: Duration,
    ) -> Option<TransferOutcome> {
        let pending = match std::mem::replace(&mut self.state, ConfirmationState::Idle) {
            ConfirmationState::AwaitingConfirmation(pending) => pending,
            other => {
                self.state = other;
                return None;
            }
        };
        self.state = ConfirmationState::Executing(pending.clone());

        let result = tokio::time::timeout(
            timeout,
            executor.transfer(&pending.destination, pending.amount, pending.allow_death),
        )
        .await
        .unwrap_or_else(|_| Err(LedgerError::Timeout(timeout.as_millis() as u64)));

        self.state = ConfirmationState::Idle;

        let outcome = match result {
            Ok(receipt) => {
                let record = TransactionRecord {
                    destination: pending.destination,
                    amount: pending.amount,
                    transaction_hash: receipt.hash,
                    timestamp: Utc::now(),
                };
                tracing::info!(
                    "Transfer completed dest={} amount={} hash={}",
                    record.destination,
                    record.amount,
                    record.transaction_hash
                );
                history.push(record.clone());
                TransferOutcome::Completed {
                    reply: ChatReply::text(success_reply(&record)),
                    record,
                }
            }
            Err(error) => {
                tracing::warn!(
                    "Transfer failed dest={} amount={}: {}",
                    pending.destination,
                    pending.amount,
                    error
                );
                TransferOutcome::Failed {
                    reply: ChatReply::text(failure_reply(&error)),
                    error,
                }
            }
        };
        Some(outcome)
    }
}
