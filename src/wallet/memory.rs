//! In-process development wallet.
//!
//! Holds a fixed list of accounts, confirms transactions immediately and
//! answers `eth_call` from canned results keyed by function selector. Used by
//! `WALLET_BACKEND=memory` and throughout the tests.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use alloy_primitives::{B256, Bytes, keccak256};
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use super::{WalletEvent, WalletProvider};
use crate::error::WalletError;

/// First well-known development account (anvil/hardhat mnemonic).
pub const DEV_ACCOUNT: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
/// Local development chain id (31337).
pub const DEV_CHAIN_ID: &str = "0x7a69";

const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Default)]
struct State {
    accounts: Vec<String>,
    chain_id: String,
    authorized: bool,
    pending_rejection: Option<i64>,
    hold_confirmations: bool,
    response_delay: Duration,
    nonce: u64,
    sent: Vec<B256>,
    confirmed: HashSet<B256>,
    call_results: HashMap<[u8; 4], Bytes>,
    requests: Vec<String>,
    transactions: Vec<Value>,
}

pub struct MemoryWallet {
    state: Mutex<State>,
    events: broadcast::Sender<WalletEvent>,
}

impl MemoryWallet {
    pub fn new(accounts: Vec<String>, chain_id: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            state: Mutex::new(State {
                accounts,
                chain_id: chain_id.into(),
                ..State::default()
            }),
            events,
        }
    }

    /// One unlocked development account on chain 31337.
    pub fn with_dev_account() -> Self {
        Self::new(vec![DEV_ACCOUNT.to_string()], DEV_CHAIN_ID)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked mid-request.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the account list and notify subscribers.
    pub fn set_accounts(&self, accounts: Vec<String>) {
        self.state().accounts = accounts.clone();
        let _ = self.events.send(WalletEvent::AccountsChanged(accounts));
    }

    /// Switch networks and notify subscribers.
    pub fn switch_chain(&self, chain_id: impl Into<String>) {
        let chain_id = chain_id.into();
        self.state().chain_id = chain_id.clone();
        let _ = self.events.send(WalletEvent::ChainChanged(chain_id));
    }

    /// Fail the next request with the given EIP-1193 error code.
    pub fn reject_next_request(&self, code: i64) {
        self.state().pending_rejection = Some(code);
    }

    /// While held, sent transactions stay pending (receipt is `null`).
    pub fn hold_confirmations(&self, hold: bool) {
        let mut state = self.state();
        state.hold_confirmations = hold;
        if !hold {
            let sent = state.sent.clone();
            state.confirmed.extend(sent);
        }
    }

    /// Answer every request only after `delay`.
    pub fn set_response_delay(&self, delay: Duration) {
        self.state().response_delay = delay;
    }

    /// Canned `eth_call` return data for a function selector.
    pub fn set_call_result(&self, selector: [u8; 4], data: impl Into<Bytes>) {
        self.state().call_results.insert(selector, data.into());
    }

    /// Methods requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.state().requests.clone()
    }

    /// Transaction objects passed to `eth_sendTransaction`, in order.
    pub fn transactions(&self) -> Vec<Value> {
        self.state().transactions.clone()
    }

    fn handle(&self, method: &str, params: &Value) -> Result<Value, WalletError> {
        let mut state = self.state();
        state.requests.push(method.to_string());

        if let Some(code) = state.pending_rejection.take() {
            return Err(WalletError::Rpc {
                code,
                message: format!("{method} rejected"),
            });
        }

        match method {
            "eth_requestAccounts" => {
                state.authorized = true;
                Ok(json!(state.accounts))
            }
            "eth_accounts" => {
                if state.authorized {
                    Ok(json!(state.accounts))
                } else {
                    Ok(json!([]))
                }
            }
            "eth_chainId" => Ok(json!(state.chain_id)),
            "eth_sendTransaction" => {
                let tx = params.get(0).cloned().unwrap_or(Value::Null);
                state.nonce += 1;
                let mut preimage = state.nonce.to_be_bytes().to_vec();
                preimage.extend_from_slice(tx.to_string().as_bytes());
                let hash = keccak256(&preimage);
                state.sent.push(hash);
                if !state.hold_confirmations {
                    state.confirmed.insert(hash);
                }
                state.transactions.push(tx);
                Ok(json!(hash.to_string()))
            }
            "eth_getTransactionReceipt" => {
                let hash = params
                    .get(0)
                    .and_then(Value::as_str)
                    .and_then(|raw| B256::from_str(raw).ok())
                    .ok_or_else(|| WalletError::Rpc {
                        code: -32602,
                        message: "invalid transaction hash".to_string(),
                    })?;
                if state.confirmed.contains(&hash) {
                    Ok(json!({
                        "transactionHash": hash.to_string(),
                        "status": "0x1",
                        "blockNumber": "0x1",
                    }))
                } else {
                    Ok(Value::Null)
                }
            }
            "eth_call" => {
                let data = params
                    .get(0)
                    .and_then(|tx| tx.get("data"))
                    .and_then(Value::as_str)
                    .and_then(|raw| Bytes::from_str(raw).ok())
                    .unwrap_or_default();
                let result = data
                    .get(..4)
                    .and_then(|selector| <[u8; 4]>::try_from(selector).ok())
                    .and_then(|selector| state.call_results.get(&selector).cloned())
                    .unwrap_or_else(|| Bytes::from(vec![0u8; 32]));
                Ok(json!(result.to_string()))
            }
            other => Err(WalletError::Rpc {
                code: METHOD_NOT_FOUND,
                message: format!("method {other} not supported"),
            }),
        }
    }
}

impl std::fmt::Debug for MemoryWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryWallet").finish_non_exhaustive()
    }
}

#[async_trait]
impl WalletProvider for MemoryWallet {
    fn name(&self) -> &str {
        "memory"
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        let delay = self.state().response_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.handle(method, &params)
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accounts_hidden_until_authorized() {
        let wallet = MemoryWallet::with_dev_account();
        let hidden = wallet.request("eth_accounts", json!([])).await.expect("ok");
        assert_eq!(hidden, json!([]));

        wallet
            .request("eth_requestAccounts", json!([]))
            .await
            .expect("authorize");
        let visible = wallet.request("eth_accounts", json!([])).await.expect("ok");
        assert_eq!(visible, json!([DEV_ACCOUNT]));
    }

    #[tokio::test]
    async fn rejection_applies_to_one_request_only() {
        let wallet = MemoryWallet::with_dev_account();
        wallet.reject_next_request(WalletError::USER_REJECTED);

        let err = wallet
            .request("eth_requestAccounts", json!([]))
            .await
            .expect_err("rejected");
        assert_eq!(err.code(), Some(4001));
        assert!(wallet.request("eth_requestAccounts", json!([])).await.is_ok());
    }

    #[tokio::test]
    async fn held_transactions_confirm_on_release() {
        let wallet = MemoryWallet::with_dev_account();
        wallet.hold_confirmations(true);
        let hash = wallet
            .request("eth_sendTransaction", json!([{ "data": "0x01" }]))
            .await
            .expect("send");

        let pending = wallet
            .request("eth_getTransactionReceipt", json!([hash.clone()]))
            .await
            .expect("receipt");
        assert!(pending.is_null());

        wallet.hold_confirmations(false);
        let mined = wallet
            .request("eth_getTransactionReceipt", json!([hash]))
            .await
            .expect("receipt");
        assert_eq!(mined["status"], "0x1");
    }

    #[tokio::test]
    async fn account_and_chain_changes_are_broadcast() {
        let wallet = MemoryWallet::with_dev_account();
        let mut rx = wallet.subscribe();

        wallet.set_accounts(vec![]);
        wallet.switch_chain("0x1");

        assert_eq!(
            rx.recv().await.expect("event"),
            WalletEvent::AccountsChanged(vec![])
        );
        assert_eq!(
            rx.recv().await.expect("event"),
            WalletEvent::ChainChanged("0x1".to_string())
        );
    }

    #[tokio::test]
    async fn unknown_methods_are_rejected() {
        let wallet = MemoryWallet::with_dev_account();
        let err = wallet
            .request("personal_sign", json!([]))
            .await
            .expect_err("unsupported");
        assert_eq!(err.code(), Some(METHOD_NOT_FOUND));
        assert_eq!(wallet.requests(), vec!["personal_sign".to_string()]);
    }
}
