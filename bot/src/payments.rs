//! On-chain payment lookup against the Solana JSON-RPC API.

use crate::error::{BotError, BotResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// How many recent sender transactions are inspected per lookup.
pub const SIGNATURE_SCAN_LIMIT: u32 = 20;

#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    /// Signatures of recent transfers of exactly `lamports` from `sender` to
    /// `receiver`, newest first.
    async fn matching_signatures(
        &self,
        receiver: &str,
        sender: &str,
        lamports: u64,
    ) -> BotResult<Vec<String>>;
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

#[derive(Debug, Deserialize)]
struct SignatureInfo {
    signature: String,
    #[serde(default)]
    err: Option<Value>,
}

pub struct SolanaVerifier {
    client: reqwest::Client,
    rpc_url: String,
}

impl SolanaVerifier {
    pub fn new(rpc_url: impl Into<String>) -> BotResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            rpc_url: rpc_url.into(),
        })
    }

    async fn rpc<T: DeserializeOwned>(&self, method: &str, params: Value) -> BotResult<Option<T>> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self.client.post(&self.rpc_url).json(&payload).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::Rpc {
                message: format!("{} returned HTTP {}: {}", method, status, body),
            });
        }

        let envelope: RpcResponse<T> = response.json().await?;
        if let Some(error) = envelope.error {
            return Err(BotError::Rpc {
                message: format!("{} failed ({}): {}", method, error.code, error.message),
            });
        }

        Ok(envelope.result)
    }

    async fn recent_signatures(&self, address: &str) -> BotResult<Vec<SignatureInfo>> {
        let signatures = self
            .rpc::<Vec<SignatureInfo>>(
                "getSignaturesForAddress",
                json!([address, {"limit": SIGNATURE_SCAN_LIMIT}]),
            )
            .await?;
        Ok(signatures.unwrap_or_default())
    }

    async fn transaction(&self, signature: &str) -> BotResult<Option<Value>> {
        self.rpc(
            "getTransaction",
            json!([
                signature,
                {"encoding": "jsonParsed", "maxSupportedTransactionVersion": 0}
            ]),
        )
        .await
    }
}

/// True when any parsed instruction moves exactly `lamports` from `sender` to `receiver`.
pub fn transaction_matches(transaction: &Value, receiver: &str, sender: &str, lamports: u64) -> bool {
    let instructions = transaction
        .pointer("/transaction/message/instructions")
        .and_then(Value::as_array);

    let Some(instructions) = instructions else {
        return false;
    };

    instructions.iter().any(|instruction| {
        let Some(info) = instruction.pointer("/parsed/info") else {
            return false;
        };

        let destination = info.get("destination").and_then(Value::as_str);
        let source = info.get("source").and_then(Value::as_str);
        let amount = info.get("lamports").and_then(lamports_value);

        destination == Some(receiver) && source == Some(sender) && amount == Some(lamports)
    })
}

fn lamports_value(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

#[async_trait]
impl PaymentVerifier for SolanaVerifier {
    #[instrument(skip(self))]
    async fn matching_signatures(
        &self,
        receiver: &str,
        sender: &str,
        lamports: u64,
    ) -> BotResult<Vec<String>> {
        let signatures = self.recent_signatures(sender).await?;
        debug!("Inspecting {} recent transactions", signatures.len());

        let mut matches = Vec::new();
        for info in signatures {
            if info.err.as_ref().is_some_and(|e| !e.is_null()) {
                continue;
            }

            let transaction = match self.transaction(&info.signature).await {
                Ok(Some(transaction)) => transaction,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Error fetching transaction details for {}: {}", info.signature, e);
                    continue;
                }
            };

            if transaction_matches(&transaction, receiver, sender, lamports) {
                matches.push(info.signature);
            }
        }

        Ok(matches)
    }
}
