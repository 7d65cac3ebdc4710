use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::constants::{CALL_TRANSFER_ALLOW_DEATH, CALL_TRANSFER_KEEP_ALIVE};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger client not configured")]
    NotConfigured,

    #[error("invalid transfer: {0}")]
    InvalidTransfer(String),

    #[error("no signer available for {0}")]
    SignerNotFound(String),

    #[error("ledger RPC error: {0}")]
    Rpc(String),

    #[error("transfer rejected: {0}")]
    Rejected(String),

    #[error("ledger call timed out after {0}ms")]
    Timeout(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub hash: String,
}

/// Handle to the wallet-extension signer of an account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerHandle {
    pub address: String,
    pub signer_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub destination: String,
    pub amount: Decimal,
    pub allow_death: bool,
}

impl TransferRequest {
    pub fn call_name(&self) -> &'static str {
        if self.allow_death {
            CALL_TRANSFER_ALLOW_DEATH
        } else {
            CALL_TRANSFER_KEEP_ALIVE
        }
    }

    /// Rejects the sentinel values a half-specified transaction intent carries.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.destination.trim().is_empty() {
            return Err(LedgerError::InvalidTransfer(
                "destination address is missing".to_string(),
            ));
        }
        if self.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidTransfer(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

/// Ledger collaborator: balance lookup, signer lookup and transfer submission.
#[async_trait::async_trait]
pub trait LedgerClient: Send + Sync {
    async fn free_balance(&self, address: &str) -> Result<Decimal, LedgerError>;

    async fn signer_for(&self, address: &str) -> Result<SignerHandle, LedgerError>;

    async fn submit_transfer(
        &self,
        signer: &SignerHandle,
        request: &TransferRequest,
    ) -> Result<Receipt, LedgerError>;
}

/// The narrow contract the confirmation flow consumes.
#[async_trait::async_trait]
pub trait TransferExecutor: Send + Sync {
    async fn transfer(
        &self,
        destination: &str,
        amount: Decimal,
        allow_death: bool,
    ) -> Result<Receipt, LedgerError>;
}

fn rpc_request(method: &str, params: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1
    })
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Canonical `0x` + 32-byte lowercase hex when the gateway hash allows it,
/// otherwise the trimmed raw value. The transfer was already accepted at this
/// point, so an odd hash is only logged.
fn normalize_receipt_hash(raw: &str) -> String {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    match hex::decode(digits) {
        Ok(bytes) if bytes.len() == 32 => format!("0x{}", digits.to_ascii_lowercase()),
        _ => {
            tracing::warn!("Ledger returned an unexpected transaction hash: {:?}", raw);
            trimmed.to_string()
        }
    }
}

fn receipt_hash(result: &serde_json::Value) -> String {
    let raw = match result {
        serde_json::Value::String(hash) => hash.clone(),
        serde_json::Value::Object(fields) => fields
            .get("txHash")
            .or_else(|| fields.get("hash"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| result.to_string()),
        other => other.to_string(),
    };
    normalize_receipt_hash(&raw)
}

fn parse_balance(raw: &serde_json::Value) -> Result<Decimal, LedgerError> {
    let text = match raw {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Number(number) => number.to_string(),
        other => return Err(LedgerError::Rpc(format!("unexpected balance value: {}", other))),
    };
    Decimal::from_str(text.trim())
        .map_err(|e| LedgerError::Rpc(format!("unreadable balance {}: {}", text, e)))
}

/// JSON-RPC client for the ledger signer gateway.
#[derive(Clone, Debug)]
pub struct LedgerGatewayClient {
    rpc_url: String,
    client: Client,
}

impl LedgerGatewayClient {
    pub fn new(rpc_url: String, timeout_ms: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { rpc_url, client }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>, LedgerError> {
        let request = rpc_request(method, params);

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;

        let result: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;

        if let Some(error) = result.error {
            return Err(LedgerError::Rejected(format!(
                "{} (code {})",
                error.message, error.code
            )));
        }
        Ok(result.result)
    }

    async fn call_required<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, LedgerError> {
        self.call(method, params)
            .await?
            .ok_or_else(|| LedgerError::Rpc(format!("{} returned no result", method)))
    }
}

#[async_trait::async_trait]
impl LedgerClient for LedgerGatewayClient {
    async fn free_balance(&self, address: &str) -> Result<Decimal, LedgerError> {
        let raw: serde_json::Value = self
            .call_required("ledger_freeBalance", serde_json::json!([address]))
            .await?;
        parse_balance(&raw)
    }

    async fn signer_for(&self, address: &str) -> Result<SignerHandle, LedgerError> {
        let signer: Option<SignerHandle> = self
            .call("signer_lookup", serde_json::json!([address]))
            .await?;
        signer.ok_or_else(|| LedgerError::SignerNotFound(address.to_string()))
    }

    async fn submit_transfer(
        &self,
        signer: &SignerHandle,
        request: &TransferRequest,
    ) -> Result<Receipt, LedgerError> {
        request.validate()?;
        let submitted: serde_json::Value = self
            .call_required(
                "ledger_submitTransfer",
                serde_json::json!([{
                    "signer": signer.signer_id,
                    "from": signer.address,
                    "call": request.call_name(),
                    "dest": request.destination,
                    "amount": request.amount.to_string(),
                }]),
            )
            .await?;
        Ok(Receipt {
            hash: receipt_hash(&submitted),
        })
    }
}

/// Stand-in used when no ledger RPC URL is configured.
#[derive(Clone, Debug, Default)]
pub struct UnconfiguredLedger;

#[async_trait::async_trait]
impl LedgerClient for UnconfiguredLedger {
    async fn free_balance(&self, _: &str) -> Result<Decimal, LedgerError> {
        Err(LedgerError::NotConfigured)
    }

    async fn signer_for(&self, _: &str) -> Result<SignerHandle, LedgerError> {
        Err(LedgerError::NotConfigured)
    }

    async fn submit_transfer(
        &self,
        _: &SignerHandle,
        _: &TransferRequest,
    ) -> Result<Receipt, LedgerError> {
        Err(LedgerError::NotConfigured)
    }
}

/// Signs with the sender's wallet signer and submits through the ledger.
pub struct LedgerTransferExecutor {
    ledger: Arc<dyn LedgerClient>,
    sender: Option<String>,
}

impl LedgerTransferExecutor {
    pub fn new(ledger: Arc<dyn LedgerClient>, sender: Option<String>) -> Self {
        Self { ledger, sender }
    }
}

#[async_trait::async_trait]
impl TransferExecutor for LedgerTransferExecutor {
    async fn transfer(
        &self,
        destination: &str,
        amount: Decimal,
        allow_death: bool,
    ) -> Result<Receipt, LedgerError> {
        let request = TransferRequest {
            destination: destination.trim().to_string(),
            amount,
            allow_death,
        };
        request.validate()?;

        let sender = self.sender.as_deref().ok_or(LedgerError::NotConfigured)?;
        let signer = self.ledger.signer_for(sender).await?;
        tracing::info!(
            "Submitting {} from={} dest={} amount={}",
            request.call_name(),
            signer.address,
            request.destination,
            request.amount
        );
        self.ledger.submit_transfer(&signer, &request).await
    }
}
