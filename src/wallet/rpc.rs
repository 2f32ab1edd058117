//! JSON-RPC wallet backend.
//!
//! Talks to a wallet or development node that holds unlocked accounts
//! (anvil, hardhat, a remote signer). Account and chain notifications are
//! derived by polling `eth_accounts` and `eth_chainId`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::{WalletEvent, WalletProvider};
use crate::error::WalletError;

const EVENT_CAPACITY: usize = 32;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    #[serde(default)]
    message: String,
}

/// Last observed wallet state, used to turn polls into change events.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Observed {
    accounts: Vec<String>,
    chain_id: String,
}

pub struct JsonRpcWallet {
    endpoint: String,
    client: Client,
    next_id: AtomicU64,
    events: broadcast::Sender<WalletEvent>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl JsonRpcWallet {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            endpoint: endpoint.into(),
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            next_id: AtomicU64::new(1),
            events,
            poller: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Start the background poller that emits account/chain change events.
    ///
    /// The task only holds a weak reference, so it exits once the wallet is
    /// dropped. Calling this twice replaces the previous poller.
    pub fn start_polling(self: &Arc<Self>, interval: Duration) {
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(poll_loop(weak, interval));
        if let Ok(mut slot) = self.poller.lock()
            && let Some(previous) = slot.replace(handle)
        {
            previous.abort();
        }
    }

    async fn observe(&self) -> Result<Observed, WalletError> {
        let accounts = super::accounts(self, "eth_accounts").await?;
        let chain_id = super::chain_id(self).await?;
        Ok(Observed { accounts, chain_id })
    }

    fn emit_changes(&self, previous: &Observed, current: &Observed) {
        if previous.accounts != current.accounts {
            tracing::debug!(accounts = ?current.accounts, "Wallet accounts changed");
            let _ = self
                .events
                .send(WalletEvent::AccountsChanged(current.accounts.clone()));
        }
        if previous.chain_id != current.chain_id {
            tracing::debug!(chain_id = %current.chain_id, "Wallet chain changed");
            let _ = self
                .events
                .send(WalletEvent::ChainChanged(current.chain_id.clone()));
        }
    }
}

async fn poll_loop(wallet: Weak<JsonRpcWallet>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut baseline: Option<Observed> = None;

    loop {
        ticker.tick().await;
        let Some(wallet) = wallet.upgrade() else {
            return;
        };
        match wallet.observe().await {
            Ok(current) => {
                if let Some(previous) = &baseline {
                    wallet.emit_changes(previous, &current);
                }
                baseline = Some(current);
            }
            Err(e) => {
                tracing::debug!("Wallet poll failed: {}", e);
            }
        }
    }
}

impl Drop for JsonRpcWallet {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.poller.lock()
            && let Some(handle) = slot.take()
        {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for JsonRpcWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcWallet")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl WalletProvider for JsonRpcWallet {
    fn name(&self) -> &str {
        "json-rpc"
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        tracing::debug!(id, method, "JSON-RPC request");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| WalletError::Transport(format!("{method}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            // Some nodes answer JSON-RPC errors with a non-2xx status.
            if let Ok(parsed) = serde_json::from_str::<RpcResponse>(&text)
                && let Some(error) = parsed.error
            {
                return Err(WalletError::Rpc {
                    code: error.code,
                    message: error.message,
                });
            }
            return Err(WalletError::Transport(format!("{method}: HTTP {status}")));
        }

        let parsed: RpcResponse = response.json().await.map_err(|e| {
            WalletError::MalformedResponse {
                method: method.to_string(),
                reason: e.to_string(),
            }
        })?;

        if let Some(error) = parsed.error {
            tracing::debug!(id, method, code = error.code, "JSON-RPC error");
            return Err(WalletError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_only_changed_fields() {
        let wallet = JsonRpcWallet::new("http://127.0.0.1:1");
        let mut rx = wallet.subscribe();
        let before = Observed {
            accounts: vec!["0xaa".to_string()],
            chain_id: "0x1".to_string(),
        };
        let after = Observed {
            accounts: vec!["0xaa".to_string()],
            chain_id: "0x5".to_string(),
        };

        wallet.emit_changes(&before, &after);
        assert_eq!(
            rx.try_recv().expect("event"),
            WalletEvent::ChainChanged("0x5".to_string())
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn rpc_error_object_deserializes() {
        let parsed: RpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":4001,"message":"User rejected"}}"#,
        )
        .expect("parse");
        let error = parsed.error.expect("error object");
        assert_eq!(error.code, 4001);
        assert!(parsed.result.is_none());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let wallet = JsonRpcWallet::new("http://127.0.0.1:1");
        let err = wallet
            .request("eth_accounts", json!([]))
            .await
            .expect_err("nothing listens on port 1");
        assert!(matches!(err, WalletError::Transport(_)));
    }
}
