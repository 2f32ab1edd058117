//! Application state container.
//!
//! All user-visible state lives behind [`App`]: actions come in through
//! [`App::dispatch`], state goes out through read-only selectors, and every
//! failure is caught at dispatch and turned into the banner. Nothing escapes
//! the dispatcher.

pub mod router;
pub mod view;

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::watch;

use crate::assist::{
    AssistClient, AssistKind, AssistOutcome, AssistRequest, GeminiClient, GenerativeBackend,
};
use crate::config::{Config, ContractsConfig};
use crate::contracts::{ContractAction, ContractFacade, MintOutcome};
use crate::error::{ContractError, ErrorKind, SessionError};
use crate::research::{NewResearchResult, ResearchResult, ResultStore};
use crate::session::{Session, SessionManager, SessionNotice};
use crate::wallet::WalletProvider;

use self::view::{Banner, Page, ViewState};

/// Delay before the mock SVM agent reports that it is processing.
pub const SVM_FOLLOWUP_DELAY: Duration = Duration::from_secs(2);

/// Everything a user (or the wallet) can ask the app to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Connect,
    Disconnect,
    /// Pick up an existing wallet authorization without prompting.
    Restore,
    /// Drop all local state and restore the session, as after a chain change.
    Reload,
    MintIdentity,
    GrantAccess {
        token_id: String,
        agent: String,
        data_type: String,
    },
    RevokeAccess {
        token_id: String,
        agent: String,
        data_type: String,
    },
    CheckAccess {
        token_id: String,
        agent: String,
        data_type: String,
    },
    SimulateResearch,
    /// Publish a stored result on-chain; `None` means the latest one.
    SubmitResult {
        id: Option<u64>,
    },
    LookupResult {
        topic: String,
        agent: String,
    },
    Summarize {
        id: Option<u64>,
    },
    SuggestNextSteps {
        id: Option<u64>,
    },
    ExplainTerm {
        term: String,
    },
    Navigate(Page),
    CloseModal(AssistKind),
    ToggleSvmAgent,
    WalletNotice(SessionNotice),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Restore => "restore",
            Self::Reload => "reload",
            Self::MintIdentity => "mint_identity",
            Self::GrantAccess { .. } => "grant_access",
            Self::RevokeAccess { .. } => "revoke_access",
            Self::CheckAccess { .. } => "check_access",
            Self::SimulateResearch => "simulate_research",
            Self::SubmitResult { .. } => "submit_result",
            Self::LookupResult { .. } => "lookup_result",
            Self::Summarize { .. } => "summarize",
            Self::SuggestNextSteps { .. } => "suggest_next_steps",
            Self::ExplainTerm { .. } => "explain_term",
            Self::Navigate(_) => "navigate",
            Self::CloseModal(_) => "close_modal",
            Self::ToggleSvmAgent => "toggle_svm_agent",
            Self::WalletNotice(_) => "wallet_notice",
        }
    }
}

/// Labels shared by the three access actions.
#[derive(Clone, Copy)]
enum AccessOp {
    Grant,
    Revoke,
    Check,
}

impl AccessOp {
    fn missing_fields(self) -> &'static str {
        match self {
            Self::Grant => "Please fill all grant access fields.",
            Self::Revoke => "Please fill all revoke access fields.",
            Self::Check => "Please fill all access check fields.",
        }
    }
}

pub struct App {
    session: Arc<SessionManager>,
    contracts: ContractFacade,
    results: ResultStore,
    assist: AssistClient,
    view: Mutex<ViewState>,
    changes: watch::Sender<u64>,
    svm_followup_delay: Duration,
}

impl App {
    pub fn new(
        session: Arc<SessionManager>,
        contracts: ContractsConfig,
        backend: Arc<dyn GenerativeBackend>,
    ) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            contracts: ContractFacade::new(Arc::clone(&session), contracts),
            session,
            results: ResultStore::new(),
            assist: AssistClient::new(backend),
            view: Mutex::new(ViewState::default()),
            changes,
            svm_followup_delay: SVM_FOLLOWUP_DELAY,
        }
    }

    /// Wire the app from resolved configuration and an optional wallet.
    pub fn from_config(config: &Config, wallet: Option<Arc<dyn WalletProvider>>) -> Self {
        let session = Arc::new(SessionManager::new(wallet));
        let backend: Arc<dyn GenerativeBackend> = Arc::new(GeminiClient::new(&config.assist));
        Self::new(session, config.contracts.clone(), backend)
    }

    pub fn with_svm_followup_delay(mut self, delay: Duration) -> Self {
        self.svm_followup_delay = delay;
        self
    }

    // -- selectors ---------------------------------------------------------

    pub fn session_manager(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn session(&self) -> Option<Session> {
        self.session.current()
    }

    pub fn banner(&self) -> Banner {
        self.view().banner.clone()
    }

    pub fn results(&self) -> Vec<ResearchResult> {
        self.results.list_all()
    }

    pub fn assist_request(&self, kind: AssistKind) -> AssistRequest {
        self.assist.snapshot(kind)
    }

    pub fn page(&self) -> Page {
        self.view().page
    }

    pub fn is_modal_open(&self, kind: AssistKind) -> bool {
        self.view().modals.is_open(kind)
    }

    pub fn open_modals(&self) -> Vec<AssistKind> {
        self.view().modals.open_kinds()
    }

    pub fn svm_agent_active(&self) -> bool {
        self.view().svm_agent_active
    }

    pub fn last_mint(&self) -> Option<MintOutcome> {
        self.view().last_mint.clone()
    }

    pub fn is_pending(&self, action: ContractAction) -> bool {
        self.contracts.is_pending(action)
    }

    pub fn contracts_config(&self) -> &ContractsConfig {
        self.contracts.config()
    }

    /// Receiver bumped after every view-state change.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    // -- dispatch ----------------------------------------------------------

    pub async fn dispatch(self: &Arc<Self>, action: Action) {
        tracing::debug!(action = action.name(), "Dispatching action");
        match action {
            Action::Connect => self.connect().await,
            Action::Disconnect => {
                self.session.disconnect();
                self.set_banner(Banner::info("Wallet disconnected."));
            }
            Action::Restore => self.restore().await,
            Action::Reload => self.reload().await,
            Action::MintIdentity => self.mint().await,
            Action::GrantAccess {
                token_id,
                agent,
                data_type,
            } => {
                self.access(AccessOp::Grant, &token_id, &agent, &data_type)
                    .await
            }
            Action::RevokeAccess {
                token_id,
                agent,
                data_type,
            } => {
                self.access(AccessOp::Revoke, &token_id, &agent, &data_type)
                    .await
            }
            Action::CheckAccess {
                token_id,
                agent,
                data_type,
            } => {
                self.access(AccessOp::Check, &token_id, &agent, &data_type)
                    .await
            }
            Action::SimulateResearch => self.simulate_research(),
            Action::SubmitResult { id } => self.submit_result(id).await,
            Action::LookupResult { topic, agent } => self.lookup_result(&topic, &agent).await,
            Action::Summarize { id } => self.summarize(id).await,
            Action::SuggestNextSteps { id } => self.suggest_next_steps(id).await,
            Action::ExplainTerm { term } => self.explain_term(&term).await,
            Action::Navigate(page) => self.update(|view| view.page = page),
            Action::CloseModal(kind) => self.update(|view| view.modals.close(kind)),
            Action::ToggleSvmAgent => self.toggle_svm_agent(),
            Action::WalletNotice(SessionNotice::AccountsChanged(Some(_))) => {
                self.set_banner(Banner::info("Wallet connected successfully."))
            }
            Action::WalletNotice(SessionNotice::AccountsChanged(None)) => {
                self.set_banner(Banner::info("Please connect your wallet."))
            }
            Action::WalletNotice(SessionNotice::ChainChanged(_)) => self.reload().await,
        }
    }

    fn view(&self) -> MutexGuard<'_, ViewState> {
        self.view.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update(&self, apply: impl FnOnce(&mut ViewState)) {
        apply(&mut self.view());
        self.changes.send_modify(|n| *n += 1);
    }

    fn set_banner(&self, banner: Banner) {
        self.update(|view| view.banner = banner);
    }

    fn fail(&self, kind: ErrorKind, error: impl Into<String>) {
        let error = error.into();
        tracing::warn!(kind = %kind, "{}", error);
        self.set_banner(Banner::failure(kind, error));
    }

    fn fail_contract(&self, context: &str, err: &ContractError) {
        let text = match err {
            ContractError::NotConnected => "Wallet not connected or contract not loaded.".to_string(),
            other => format!("{context}: {other}"),
        };
        self.fail(err.kind(), text);
    }

    async fn connect(&self) {
        match self.session.connect().await {
            Ok(_) => self.set_banner(Banner::info(
                "Successfully connected to wallet and contracts.",
            )),
            // The newer session change already set the banner.
            Err(SessionError::Superseded) => {
                tracing::debug!("Connect superseded by a session change")
            }
            Err(err) => {
                let text = match &err {
                    SessionError::UserRejected => "Connection rejected by user.".to_string(),
                    SessionError::RequestPending => {
                        "Wallet is already processing a connection request.".to_string()
                    }
                    SessionError::WalletUnavailable { reason } => format!(
                        "No wallet available: {reason}. Check WALLET_BACKEND and WALLET_RPC_URL."
                    ),
                    other => format!("Failed to connect wallet: {other}"),
                };
                self.fail(err.kind(), text);
            }
        }
    }

    async fn restore(&self) {
        let banner = match self.session.restore().await {
            Ok(Some(_)) => Banner::info("Connected to wallet and contracts."),
            Ok(None) => Banner::info("Please connect your wallet to continue."),
            Err(SessionError::Superseded) => {
                tracing::debug!("Restore superseded by a session change");
                return;
            }
            Err(e) => {
                tracing::warn!("Failed to check wallet connection: {}", e);
                Banner::info("Please connect your wallet to continue.")
            }
        };
        self.set_banner(banner);
    }

    async fn reload(&self) {
        tracing::info!("Reloading application state");
        self.results.clear();
        self.assist.reset();
        self.update(|view| {
            *view = ViewState {
                page: view.page,
                svm_generation: view.svm_generation + 1,
                ..ViewState::default()
            };
        });
        self.restore().await;
    }

    async fn mint(&self) {
        self.set_banner(Banner::info("Minting CARV ID..."));
        match self.contracts.mint_identity(None).await {
            Ok(outcome) => {
                let text = format!(
                    "CARV ID {} minted successfully! Transaction: {}",
                    outcome.token_id, outcome.transaction_id
                );
                self.update(|view| {
                    view.last_mint = Some(outcome);
                    view.banner = Banner::info(text);
                });
            }
            Err(err) => self.fail_contract("Failed to mint CARV ID", &err),
        }
    }

    async fn access(&self, op: AccessOp, token_id: &str, agent: &str, data_type: &str) {
        let loading = match op {
            AccessOp::Grant => "Granting data access...",
            AccessOp::Revoke => "Revoking data access...",
            AccessOp::Check => "Checking data access...",
        };
        self.set_banner(Banner::info(loading));

        let (token_id, agent, data_type) = (token_id.trim(), agent.trim(), data_type.trim());
        let outcome = match op {
            AccessOp::Grant => self
                .contracts
                .grant_access(token_id, agent, data_type)
                .await
                .map(|tx| {
                    format!(
                        "Access granted for CARV ID {token_id} to agent {agent} for data type {data_type}. Tx: {}",
                        tx.transaction_id
                    )
                }),
            AccessOp::Revoke => self
                .contracts
                .revoke_access(token_id, agent, data_type)
                .await
                .map(|tx| {
                    format!(
                        "Access revoked for CARV ID {token_id} from agent {agent} for data type {data_type}. Tx: {}",
                        tx.transaction_id
                    )
                }),
            AccessOp::Check => self
                .contracts
                .has_access(token_id, agent, data_type)
                .await
                .map(|granted| {
                    let verb = if granted { "has" } else { "does not have" };
                    format!("Agent {agent} {verb} access to {data_type} data of CARV ID {token_id}.")
                }),
        };

        match outcome {
            Ok(text) => self.set_banner(Banner::info(text)),
            Err(ContractError::MissingField { .. }) => {
                self.fail(ErrorKind::MissingField, op.missing_fields())
            }
            Err(err) => {
                let context = match op {
                    AccessOp::Grant => "Failed to grant access",
                    AccessOp::Revoke => "Failed to revoke access",
                    AccessOp::Check => "Failed to check access",
                };
                self.fail_contract(context, &err);
            }
        }
    }

    fn simulate_research(&self) {
        self.set_banner(Banner::info(
            "Simulating AI Agent research... (this would trigger an off-chain agent process)",
        ));
        let agent = self.session.current().map(|s| s.address);
        let stored = self.results.append(NewResearchResult::simulated(agent));
        tracing::info!(id = stored.id, accuracy = stored.accuracy.get(), "Simulated research run");
        self.set_banner(Banner::info(
            "Simulated AI research completed. Result added to local state (conceptual on-chain submission).",
        ));
    }

    /// Find a stored result by id, or the latest one.
    fn resolve_result(&self, id: Option<u64>) -> Option<ResearchResult> {
        match id {
            Some(id) => self.results.get(id),
            None => self.results.latest(),
        }
    }

    fn fail_missing_result(&self, id: Option<u64>) {
        match id {
            Some(id) => self.fail(
                ErrorKind::InvalidInput,
                format!("Research result #{id} not found."),
            ),
            None => self.fail(
                ErrorKind::MissingField,
                "No research results yet. Run a simulation first.",
            ),
        }
    }

    async fn submit_result(&self, id: Option<u64>) {
        let Some(result) = self.resolve_result(id) else {
            self.fail_missing_result(id);
            return;
        };
        self.set_banner(Banner::info("Submitting research result on-chain..."));
        match self.contracts.submit_aggregated_result(&result).await {
            Ok(tx) => self.set_banner(Banner::info(format!(
                "Research result #{} submitted on-chain. Tx: {}",
                result.id, tx.transaction_id
            ))),
            Err(err) => self.fail_contract("Failed to submit research result", &err),
        }
    }

    async fn lookup_result(&self, topic: &str, agent: &str) {
        self.set_banner(Banner::info("Looking up on-chain research result..."));
        match self.contracts.get_research_result(topic, agent).await {
            Ok(found) => self.set_banner(Banner::info(format!(
                "On-chain result for '{}': hash {}, accuracy {}%.",
                topic.trim(),
                found.result_hash,
                found.accuracy
            ))),
            Err(ContractError::MissingField { .. }) => {
                self.fail(ErrorKind::MissingField, "Please fill all result lookup fields.")
            }
            Err(err) => self.fail_contract("Failed to look up research result", &err),
        }
    }

    async fn summarize(&self, id: Option<u64>) {
        let Some(result) = self.resolve_result(id) else {
            self.fail_missing_result(id);
            return;
        };
        self.begin_assist(AssistKind::Summary, "Generating summary with Gemini API...");
        let outcome = self
            .assist
            .request_summary(&result.topic, result.accuracy, &result.result_hash)
            .await;
        self.finish_assist(AssistKind::Summary, outcome);
    }

    async fn suggest_next_steps(&self, id: Option<u64>) {
        let Some(result) = self.resolve_result(id) else {
            self.fail_missing_result(id);
            return;
        };
        self.begin_assist(AssistKind::NextSteps, "Suggesting next steps with Gemini API...");
        let outcome = self
            .assist
            .request_next_steps(&result.topic, result.accuracy)
            .await;
        self.finish_assist(AssistKind::NextSteps, outcome);
    }

    async fn explain_term(&self, term: &str) {
        if term.trim().is_empty() {
            self.fail(ErrorKind::MissingField, "Please enter a medical term to explain.");
            return;
        }
        self.begin_assist(AssistKind::ExplainTerm, "Explaining term with Gemini API...");
        match self.assist.request_explanation(term).await {
            Ok(outcome) => self.finish_assist(AssistKind::ExplainTerm, outcome),
            Err(err) => self.fail(err.kind(), "Please enter a medical term to explain."),
        }
    }

    fn begin_assist(&self, kind: AssistKind, loading: &str) {
        self.update(|view| {
            view.modals.open(kind);
            view.banner = Banner::info(loading);
        });
    }

    fn finish_assist(&self, kind: AssistKind, outcome: AssistOutcome) {
        let (success, retry, context) = match kind {
            AssistKind::Summary => (
                "Research summary generated successfully!",
                "Failed to generate summary. Please try again.",
                "Failed to generate summary",
            ),
            AssistKind::NextSteps => (
                "Next steps suggested successfully!",
                "Failed to suggest next steps. Please try again.",
                "Failed to suggest next steps",
            ),
            AssistKind::ExplainTerm => (
                "Medical term explained successfully!",
                "Failed to explain term. Please try again.",
                "Failed to explain term",
            ),
        };
        match outcome {
            AssistOutcome::Ready(_) => self.set_banner(Banner::info(success)),
            AssistOutcome::Failed {
                error: ErrorKind::UnexpectedResponseShape,
                ..
            } => self.fail(ErrorKind::UnexpectedResponseShape, retry),
            AssistOutcome::Failed { error, reason, .. } => {
                self.fail(error, format!("{context}: {reason}"))
            }
            // The newer request owns the banner.
            AssistOutcome::Superseded => self.changes.send_modify(|n| *n += 1),
        }
    }

    fn toggle_svm_agent(self: &Arc<Self>) {
        let mut generation = 0;
        let mut active = false;
        self.update(|view| {
            view.svm_agent_active = !view.svm_agent_active;
            view.svm_generation += 1;
            generation = view.svm_generation;
            active = view.svm_agent_active;
            view.banner = Banner::info(if active {
                "Simulating AI Agent activity on CARV SVM Chain..."
            } else {
                "CARV SVM Agent simulation paused."
            });
        });
        tracing::info!(active, "SVM agent simulation toggled");

        if active {
            let app = Arc::downgrade(self);
            let delay = self.svm_followup_delay;
            tokio::spawn(svm_followup(app, generation, delay));
        }
    }
}

async fn svm_followup(app: Weak<App>, generation: u64, delay: Duration) {
    tokio::time::sleep(delay).await;
    let Some(app) = app.upgrade() else {
        return;
    };
    let still_active = {
        let view = app.view();
        view.svm_agent_active && view.svm_generation == generation
    };
    if still_active {
        app.set_banner(Banner::info("CARV SVM Agent is actively processing data."));
    }
}
