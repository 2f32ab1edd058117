//! Wallet session management.
//!
//! A [`Session`] exists only while a wallet has granted account access. It is
//! replaced wholesale on every account change and tagged with an epoch so
//! in-flight contract calls can tell that the session they started under is
//! gone. Chain changes are not migrated in place: they are forwarded as a
//! [`SessionNotice::ChainChanged`] and the application rebuilds its state.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use alloy_primitives::Address;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::{SessionError, WalletError};
use crate::wallet::{self, WalletEvent, WalletProvider};

/// Signing handle captured by contract calls at submission time.
#[derive(Clone)]
pub struct Signer {
    pub address: Address,
    pub epoch: u64,
    provider: Arc<dyn WalletProvider>,
}

impl Signer {
    pub fn provider(&self) -> &dyn WalletProvider {
        self.provider.as_ref()
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("address", &self.address)
            .field("epoch", &self.epoch)
            .field("provider", &self.provider.name())
            .finish()
    }
}

/// Client-local record of a wallet connection.
#[derive(Clone)]
pub struct Session {
    pub address: Address,
    pub chain_id: String,
    pub epoch: u64,
    provider: Arc<dyn WalletProvider>,
}

impl Session {
    pub fn signer(&self) -> Signer {
        Signer {
            address: self.address,
            epoch: self.epoch,
            provider: Arc::clone(&self.provider),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("epoch", &self.epoch)
            .field("provider", &self.provider.name())
            .finish()
    }
}

/// What the wallet-event loop did, for the view layer to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// The session was re-derived; `None` means the wallet reported no accounts.
    AccountsChanged(Option<Address>),
    /// The wallet switched networks; the app should reload.
    ChainChanged(String),
}

pub struct SessionManager {
    wallet: Option<Arc<dyn WalletProvider>>,
    current: RwLock<Option<Session>>,
    epoch: AtomicU64,
    notices: broadcast::Sender<SessionNotice>,
}

impl SessionManager {
    pub fn new(wallet: Option<Arc<dyn WalletProvider>>) -> Self {
        let (notices, _) = broadcast::channel(16);
        Self {
            wallet,
            current: RwLock::new(None),
            epoch: AtomicU64::new(0),
            notices,
        }
    }

    pub fn has_wallet(&self) -> bool {
        self.wallet.is_some()
    }

    pub fn wallet_name(&self) -> Option<&str> {
        self.wallet.as_deref().map(|w| w.name())
    }

    /// Snapshot of the active session, if any.
    pub fn current(&self) -> Option<Session> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Epoch of the most recent session change.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// True while the session that produced `epoch` is still active.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.current()
            .map(|session| session.epoch == epoch)
            .unwrap_or(false)
    }

    /// Notices emitted while handling wallet events.
    pub fn notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    /// Ask the wallet for account access.
    pub async fn connect(&self) -> Result<Session, SessionError> {
        let wallet = self.require_wallet()?;
        let started = self.epoch();
        let accounts = wallet::accounts(wallet.as_ref(), "eth_requestAccounts")
            .await
            .map_err(classify_wallet_error)?;

        if accounts.is_empty() {
            self.clear();
            return Err(SessionError::WalletUnavailable {
                reason: "the wallet returned no accounts".to_string(),
            });
        }

        let session = self.install(wallet, &accounts[0], started).await?;
        tracing::info!(
            address = %session.address,
            chain_id = %session.chain_id,
            wallet = wallet.name(),
            "Wallet connected"
        );
        Ok(session)
    }

    /// Pick up an existing authorization without prompting.
    ///
    /// Returns `Ok(None)` when no wallet is configured or no account has been
    /// authorized yet.
    pub async fn restore(&self) -> Result<Option<Session>, SessionError> {
        let Some(wallet) = self.wallet.as_ref() else {
            return Ok(None);
        };
        let started = self.epoch();
        let accounts = wallet::accounts(wallet.as_ref(), "eth_accounts")
            .await
            .map_err(classify_wallet_error)?;
        let Some(first) = accounts.first() else {
            self.clear();
            return Ok(None);
        };
        let session = self.install(wallet, first, started).await?;
        tracing::info!(address = %session.address, "Restored wallet session");
        Ok(Some(session))
    }

    /// Clear the session. Local only; the wallet keeps its authorization.
    pub fn disconnect(&self) {
        if self.clear() {
            tracing::info!("Wallet disconnected");
        }
    }

    /// Re-derive the session from an account list reported by the wallet.
    pub async fn apply_accounts(&self, accounts: &[String]) -> Result<Option<Session>, SessionError> {
        let Some(first) = accounts.first() else {
            self.disconnect();
            return Ok(None);
        };
        let wallet = self.require_wallet()?;
        let session = self.install(wallet, first, self.epoch()).await?;
        tracing::info!(address = %session.address, epoch = session.epoch, "Wallet account changed");
        Ok(Some(session))
    }

    /// Subscribe to wallet notifications for as long as the guard lives.
    ///
    /// Returns `None` when no wallet is configured.
    pub fn attach(self: &Arc<Self>) -> Option<SessionSubscription> {
        let wallet = self.wallet.as_ref()?;
        let events = wallet.subscribe();
        let task = tokio::spawn(event_loop(Arc::downgrade(self), events));
        tracing::debug!(wallet = wallet.name(), "Subscribed to wallet events");
        Some(SessionSubscription { task })
    }

    fn require_wallet(&self) -> Result<&Arc<dyn WalletProvider>, SessionError> {
        self.wallet
            .as_ref()
            .ok_or_else(|| SessionError::WalletUnavailable {
                reason: "no wallet provider is configured".to_string(),
            })
    }

    /// Install a session for `account` unless the session changed since
    /// `started` was read.
    async fn install(
        &self,
        wallet: &Arc<dyn WalletProvider>,
        account: &str,
        started: u64,
    ) -> Result<Session, SessionError> {
        let address = Address::from_str(account).map_err(|_| SessionError::InvalidAccount {
            account: account.to_string(),
        })?;
        let chain_id = wallet::chain_id(wallet.as_ref())
            .await
            .map_err(classify_wallet_error)?;

        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        let epoch = self
            .epoch
            .compare_exchange(started, started + 1, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| SessionError::Superseded)?
            + 1;
        let session = Session {
            address,
            chain_id,
            epoch,
            provider: Arc::clone(wallet),
        };
        *current = Some(session.clone());
        Ok(session)
    }

    /// Drop the session and bump the epoch, even when nothing was connected,
    /// so a connect still waiting on the wallet cannot install afterwards.
    fn clear(&self) -> bool {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        self.epoch.fetch_add(1, Ordering::SeqCst);
        current.take().is_some()
    }

    fn notify(&self, notice: SessionNotice) {
        // No receivers just means nothing is rendering right now.
        let _ = self.notices.send(notice);
    }
}

fn classify_wallet_error(err: WalletError) -> SessionError {
    match err {
        WalletError::Rpc { code, .. } if code == WalletError::USER_REJECTED => {
            SessionError::UserRejected
        }
        WalletError::Rpc { code, .. } if code == WalletError::REQUEST_PENDING => {
            SessionError::RequestPending
        }
        WalletError::Transport(reason) => SessionError::WalletUnavailable { reason },
        other => SessionError::Provider(other),
    }
}

async fn event_loop(manager: Weak<SessionManager>, mut events: broadcast::Receiver<WalletEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Dropped wallet events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };
        let Some(manager) = manager.upgrade() else {
            return;
        };
        match event {
            WalletEvent::AccountsChanged(accounts) => match manager.apply_accounts(&accounts).await {
                Ok(session) => {
                    manager.notify(SessionNotice::AccountsChanged(session.map(|s| s.address)))
                }
                Err(e) => tracing::warn!("Failed to apply account change: {}", e),
            },
            WalletEvent::ChainChanged(chain_id) => {
                tracing::info!(chain_id = %chain_id, "Wallet chain changed; reload requested");
                manager.notify(SessionNotice::ChainChanged(chain_id));
            }
        }
    }
}

/// Scoped wallet-event subscription; dropping it unsubscribes.
#[derive(Debug)]
pub struct SessionSubscription {
    task: JoinHandle<()>,
}

impl SessionSubscription {
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::memory::{DEV_ACCOUNT, MemoryWallet};
    use std::time::Duration;

    fn manager_with(wallet: &Arc<MemoryWallet>) -> Arc<SessionManager> {
        let provider: Arc<dyn WalletProvider> = wallet.clone();
        Arc::new(SessionManager::new(Some(provider)))
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn connect_without_wallet_is_unavailable() {
        let manager = SessionManager::new(None);
        let err = manager.connect().await.expect_err("no wallet");
        assert!(matches!(err, SessionError::WalletUnavailable { .. }));
        assert!(manager.current().is_none());
    }

    #[tokio::test]
    async fn connect_with_zero_accounts_leaves_session_empty() {
        let wallet = Arc::new(MemoryWallet::new(vec![], "0x1"));
        let manager = manager_with(&wallet);

        let err = manager.connect().await.expect_err("no accounts");
        assert!(matches!(err, SessionError::WalletUnavailable { .. }));
        assert!(manager.current().is_none());
    }

    #[tokio::test]
    async fn rejection_and_pending_codes_map_to_session_errors() {
        let wallet = Arc::new(MemoryWallet::with_dev_account());
        let manager = manager_with(&wallet);

        wallet.reject_next_request(WalletError::USER_REJECTED);
        assert!(matches!(
            manager.connect().await,
            Err(SessionError::UserRejected)
        ));

        wallet.reject_next_request(WalletError::REQUEST_PENDING);
        assert!(matches!(
            manager.connect().await,
            Err(SessionError::RequestPending)
        ));
        assert!(manager.current().is_none());
    }

    #[tokio::test]
    async fn connect_then_disconnect_bumps_epoch() {
        let wallet = Arc::new(MemoryWallet::with_dev_account());
        let manager = manager_with(&wallet);

        let session = manager.connect().await.expect("connect");
        assert_eq!(session.address, Address::from_str(DEV_ACCOUNT).expect("addr"));
        assert_eq!(session.chain_id, "0x7a69");
        assert!(manager.is_current(session.epoch));

        manager.disconnect();
        assert!(manager.current().is_none());
        assert!(!manager.is_current(session.epoch));
        assert!(manager.epoch() > session.epoch);
    }

    #[tokio::test]
    async fn restore_uses_existing_authorization_only() {
        let wallet = Arc::new(MemoryWallet::with_dev_account());
        let manager = manager_with(&wallet);

        assert!(manager.restore().await.expect("restore").is_none());
        manager.connect().await.expect("connect");
        manager.disconnect();

        let restored = manager.restore().await.expect("restore");
        assert!(restored.is_some());
        assert!(!wallet.requests().is_empty());
    }

    #[tokio::test]
    async fn account_events_replace_or_clear_session() {
        let wallet = Arc::new(MemoryWallet::with_dev_account());
        let manager = manager_with(&wallet);
        let _subscription = manager.attach().expect("wallet configured");
        let first = manager.connect().await.expect("connect");

        let other = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".to_string();
        wallet.set_accounts(vec![other.clone()]);
        let m = Arc::clone(&manager);
        wait_for(move || {
            m.current()
                .map(|s| s.epoch != first.epoch)
                .unwrap_or(false)
        })
        .await;
        assert_eq!(
            manager.current().expect("session").address,
            Address::from_str(&other).expect("addr")
        );

        wallet.set_accounts(vec![]);
        let m = Arc::clone(&manager);
        wait_for(move || m.current().is_none()).await;
    }

    #[tokio::test]
    async fn chain_change_requests_reload() {
        let wallet = Arc::new(MemoryWallet::with_dev_account());
        let manager = manager_with(&wallet);
        let _subscription = manager.attach().expect("wallet configured");
        let mut notices = manager.notices();

        wallet.switch_chain("0x1");
        let notice = tokio::time::timeout(Duration::from_secs(1), notices.recv())
            .await
            .expect("notice sent")
            .expect("sender alive");
        assert_eq!(notice, SessionNotice::ChainChanged("0x1".to_string()));
    }

    #[tokio::test]
    async fn dropping_subscription_stops_event_handling() {
        let wallet = Arc::new(MemoryWallet::with_dev_account());
        let manager = manager_with(&wallet);
        let subscription = manager.attach().expect("wallet configured");
        assert!(subscription.is_active());
        drop(subscription);
        tokio::task::yield_now().await;

        let mut notices = manager.notices();
        wallet.switch_chain("0x5");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_during_connect_wins() {
        let wallet = Arc::new(MemoryWallet::with_dev_account());
        wallet.set_response_delay(Duration::from_millis(50));
        let manager = manager_with(&wallet);

        let connecting = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.connect().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.disconnect();

        let result = connecting.await.expect("connect task");
        assert!(matches!(result, Err(SessionError::Superseded)), "got {result:?}");
        assert!(manager.current().is_none());
    }

    #[tokio::test]
    async fn account_removal_during_restore_wins() {
        let wallet = Arc::new(MemoryWallet::with_dev_account());
        let manager = manager_with(&wallet);
        manager.connect().await.expect("connect");
        manager.disconnect();
        wallet.set_response_delay(Duration::from_millis(50));

        let restoring = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.restore().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.apply_accounts(&[]).await.expect("empty accounts");

        let result = restoring.await.expect("restore task");
        assert!(matches!(result, Err(SessionError::Superseded)), "got {result:?}");
        assert!(manager.current().is_none());
    }

    #[test]
    fn attach_without_wallet_returns_none() {
        let manager = Arc::new(SessionManager::new(None));
        assert!(manager.attach().is_none());
    }
}
