//! Wallet provider abstraction.
//!
//! Mirrors the EIP-1193 surface a browser wallet injects: a single
//! `request(method, params)` entry point plus account/chain change
//! notifications. Two backends ship with the crate:
//!
//! - [`rpc::JsonRpcWallet`]: JSON-RPC over HTTP against a wallet or dev node
//!   holding unlocked accounts. Notifications are derived by polling.
//! - [`memory::MemoryWallet`]: in-process development wallet whose
//!   transactions confirm immediately.

pub mod memory;
pub mod rpc;

use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::{Address, B256, Bytes};
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use crate::config::{WalletBackend, WalletConfig};
use crate::error::WalletError;

/// Notifications a wallet emits outside of any request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    AccountsChanged(Vec<String>),
    ChainChanged(String),
}

/// EIP-1193 shaped provider.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError>;

    /// Subscribe to account/chain notifications.
    fn subscribe(&self) -> broadcast::Receiver<WalletEvent>;
}

/// Minimal view of a transaction receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    /// `None` for pre-Byzantium receipts that carry no status.
    pub success: Option<bool>,
    pub block_number: Option<u64>,
}

impl TransactionReceipt {
    pub fn succeeded(&self) -> bool {
        self.success.unwrap_or(true)
    }
}

fn malformed(method: &str, reason: impl Into<String>) -> WalletError {
    WalletError::MalformedResponse {
        method: method.to_string(),
        reason: reason.into(),
    }
}

pub(crate) fn parse_hex_u64(raw: &str) -> Option<u64> {
    let digits = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X"))?;
    u64::from_str_radix(digits, 16).ok()
}

/// `eth_accounts` / `eth_requestAccounts`.
pub async fn accounts(wallet: &dyn WalletProvider, method: &str) -> Result<Vec<String>, WalletError> {
    let value = wallet.request(method, json!([])).await?;
    let list = value
        .as_array()
        .ok_or_else(|| malformed(method, "expected an array of accounts"))?;
    list.iter()
        .map(|entry| {
            entry
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| malformed(method, "account entry is not a string"))
        })
        .collect()
}

/// `eth_chainId`, returned as the wallet reports it (hex string).
pub async fn chain_id(wallet: &dyn WalletProvider) -> Result<String, WalletError> {
    let value = wallet.request("eth_chainId", json!([])).await?;
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| malformed("eth_chainId", "expected a hex string"))
}

/// `eth_sendTransaction` from an unlocked account.
pub async fn send_transaction(
    wallet: &dyn WalletProvider,
    from: Address,
    to: Address,
    data: &Bytes,
) -> Result<B256, WalletError> {
    let value = wallet
        .request(
            "eth_sendTransaction",
            json!([{ "from": from.to_string(), "to": to.to_string(), "data": data.to_string() }]),
        )
        .await?;
    let raw = value
        .as_str()
        .ok_or_else(|| malformed("eth_sendTransaction", "expected a transaction hash"))?;
    B256::from_str(raw).map_err(|e| malformed("eth_sendTransaction", e.to_string()))
}

/// `eth_getTransactionReceipt`; `None` while the transaction is pending.
pub async fn transaction_receipt(
    wallet: &dyn WalletProvider,
    tx_hash: B256,
) -> Result<Option<TransactionReceipt>, WalletError> {
    const METHOD: &str = "eth_getTransactionReceipt";
    let value = wallet.request(METHOD, json!([tx_hash.to_string()])).await?;
    if value.is_null() {
        return Ok(None);
    }
    let object = value
        .as_object()
        .ok_or_else(|| malformed(METHOD, "expected a receipt object or null"))?;
    let success = match object.get("status").and_then(Value::as_str) {
        Some(status) => Some(
            parse_hex_u64(status).ok_or_else(|| malformed(METHOD, "status is not hex"))? == 1,
        ),
        None => None,
    };
    let block_number = object
        .get("blockNumber")
        .and_then(Value::as_str)
        .and_then(parse_hex_u64);
    Ok(Some(TransactionReceipt {
        transaction_hash: tx_hash,
        success,
        block_number,
    }))
}

/// Read-only `eth_call` against the latest block.
pub async fn call(
    wallet: &dyn WalletProvider,
    from: Address,
    to: Address,
    data: &Bytes,
) -> Result<Bytes, WalletError> {
    let value = wallet
        .request(
            "eth_call",
            json!([
                { "from": from.to_string(), "to": to.to_string(), "data": data.to_string() },
                "latest"
            ]),
        )
        .await?;
    let raw = value
        .as_str()
        .ok_or_else(|| malformed("eth_call", "expected hex return data"))?;
    Bytes::from_str(raw).map_err(|e| malformed("eth_call", e.to_string()))
}

/// Build the configured wallet backend; `None` means no wallet is installed.
pub fn from_config(config: &WalletConfig) -> Option<Arc<dyn WalletProvider>> {
    match config.backend {
        WalletBackend::Rpc => {
            let wallet = Arc::new(rpc::JsonRpcWallet::new(&config.rpc_url));
            wallet.start_polling(config.poll_interval);
            Some(wallet)
        }
        WalletBackend::Memory => Some(Arc::new(memory::MemoryWallet::with_dev_account())),
        WalletBackend::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_quantities() {
        assert_eq!(parse_hex_u64("0x7a69"), Some(31337));
        assert_eq!(parse_hex_u64("0X1"), Some(1));
        assert_eq!(parse_hex_u64("12"), None);
        assert_eq!(parse_hex_u64("0xzz"), None);
    }

    #[test]
    fn receipt_without_status_counts_as_success() {
        let receipt = TransactionReceipt {
            transaction_hash: B256::ZERO,
            success: None,
            block_number: Some(1),
        };
        assert!(receipt.succeeded());
    }

    #[tokio::test]
    async fn typed_helpers_round_trip_through_memory_wallet() {
        let wallet = memory::MemoryWallet::with_dev_account();
        let before = accounts(&wallet, "eth_accounts").await.expect("accounts");
        assert!(before.is_empty());

        let granted = accounts(&wallet, "eth_requestAccounts")
            .await
            .expect("request accounts");
        assert_eq!(granted, vec![memory::DEV_ACCOUNT.to_string()]);
        assert_eq!(chain_id(&wallet).await.expect("chain id"), "0x7a69");

        let from = Address::from_str(memory::DEV_ACCOUNT).expect("dev account");
        let hash = send_transaction(&wallet, from, Address::ZERO, &Bytes::from(vec![1, 2, 3]))
            .await
            .expect("send");
        let receipt = transaction_receipt(&wallet, hash)
            .await
            .expect("receipt")
            .expect("mined");
        assert!(receipt.succeeded());
        assert_eq!(receipt.transaction_hash, hash);
    }
}
