pub mod chat;

use serde::Serialize;

pub use chat::{ChatReply, ChatRequest, IntentEnvelope, PendingTransfer, TransactionRecord};

/// Envelope for read-only endpoints.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistory {
    pub session_id: String,
    pub awaiting_confirmation: bool,
    pub transactions: Vec<TransactionRecord>,
}
