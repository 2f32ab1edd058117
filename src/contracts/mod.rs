//! Contract facade.
//!
//! Typed calls against the identity-token and research-results contracts.
//! The facade marshals arguments and waits for confirmation; it holds no
//! business logic. Checks run in a fixed order: required fields, session,
//! argument parsing, contract configuration, then the in-flight guard.

pub mod abi;
pub mod inflight;

use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use alloy_sol_types::SolCall;
use rand::Rng;

use crate::config::{ContractTarget, ContractsConfig};
use crate::error::ContractError;
use crate::research::ResearchResult;
use crate::session::{SessionManager, Signer};
use crate::wallet;

use self::abi::{IIdentityToken, IResearchResults};
pub use self::inflight::{ContractAction, InFlightGuard, InFlightPermit};

/// Exclusive upper bound for randomly generated token ids.
pub const TOKEN_ID_RANGE: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintOutcome {
    pub transaction_id: B256,
    pub token_id: U256,
    pub metadata_uri: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOutcome {
    pub transaction_id: B256,
}

/// Result record as stored on the research-results contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnChainResult {
    pub result_hash: B256,
    pub accuracy: U256,
}

/// Parsed `(token id, agent, data type)` triple shared by the access calls.
#[derive(Debug, Clone, Copy)]
struct AccessArgs {
    token_id: U256,
    agent: Address,
    data_type_hash: B256,
}

pub struct ContractFacade {
    session: Arc<SessionManager>,
    config: ContractsConfig,
    in_flight: InFlightGuard,
}

impl ContractFacade {
    pub fn new(session: Arc<SessionManager>, config: ContractsConfig) -> Self {
        Self {
            session,
            config,
            in_flight: InFlightGuard::new(),
        }
    }

    pub fn config(&self) -> &ContractsConfig {
        &self.config
    }

    pub fn is_pending(&self, action: ContractAction) -> bool {
        self.in_flight.is_active(action)
    }

    /// Mint an identity token with a random id and placeholder metadata URI.
    ///
    /// `owner` defaults to the connected account.
    pub async fn mint_identity(&self, owner: Option<Address>) -> Result<MintOutcome, ContractError> {
        let signer = self.signer()?;
        let target = self.identity_address()?;
        let _permit = self.acquire(ContractAction::Mint)?;

        let token_id = U256::from(rand::thread_rng().gen_range(0..TOKEN_ID_RANGE));
        let metadata_uri = format!("{}/{}", self.config.metadata_base_uri, token_id);
        let call = IIdentityToken::mintCall {
            to: owner.unwrap_or(signer.address),
            tokenId: token_id,
            uri: metadata_uri.clone(),
        };

        tracing::info!(token_id = %token_id, "Minting identity token");
        let transaction_id = self
            .submit(&signer, target, call.abi_encode().into())
            .await?;
        Ok(MintOutcome {
            transaction_id,
            token_id,
            metadata_uri,
        })
    }

    /// Grant `agent` access to `data_type` data behind `token_id`.
    pub async fn grant_access(
        &self,
        token_id: &str,
        agent: &str,
        data_type: &str,
    ) -> Result<TransactionOutcome, ContractError> {
        let (signer, target, args) = self.prepare_access(token_id, agent, data_type)?;
        let _permit = self.acquire(ContractAction::GrantAccess)?;

        let call = IIdentityToken::grantAccessCall {
            tokenId: args.token_id,
            agentAddress: args.agent,
            dataTypeHash: args.data_type_hash,
        };
        tracing::info!(token_id = %args.token_id, agent = %args.agent, "Granting data access");
        let transaction_id = self
            .submit(&signer, target, call.abi_encode().into())
            .await?;
        Ok(TransactionOutcome { transaction_id })
    }

    pub async fn revoke_access(
        &self,
        token_id: &str,
        agent: &str,
        data_type: &str,
    ) -> Result<TransactionOutcome, ContractError> {
        let (signer, target, args) = self.prepare_access(token_id, agent, data_type)?;
        let _permit = self.acquire(ContractAction::RevokeAccess)?;

        let call = IIdentityToken::revokeAccessCall {
            tokenId: args.token_id,
            agentAddress: args.agent,
            dataTypeHash: args.data_type_hash,
        };
        tracing::info!(token_id = %args.token_id, agent = %args.agent, "Revoking data access");
        let transaction_id = self
            .submit(&signer, target, call.abi_encode().into())
            .await?;
        Ok(TransactionOutcome { transaction_id })
    }

    /// Read-only access check.
    pub async fn has_access(
        &self,
        token_id: &str,
        agent: &str,
        data_type: &str,
    ) -> Result<bool, ContractError> {
        let (signer, target, args) = self.prepare_access(token_id, agent, data_type)?;
        let call = IIdentityToken::hasAccessCall {
            tokenId: args.token_id,
            agentAddress: args.agent,
            dataTypeHash: args.data_type_hash,
        };
        let data = self.read(&signer, target, call.abi_encode().into()).await?;
        abi::decode_bool(&data).map_err(|reason| ContractError::Decode {
            method: "hasAccess",
            reason,
        })
    }

    /// Publish a locally stored result to the research-results contract.
    pub async fn submit_aggregated_result(
        &self,
        result: &ResearchResult,
    ) -> Result<TransactionOutcome, ContractError> {
        let signer = self.signer()?;
        let result_hash = parse_hash(&result.result_hash)?;
        let agent = parse_address(&result.agent_address)?;
        let target = self.research_results_address()?;
        let _permit = self.acquire(ContractAction::SubmitResult)?;

        let call = IResearchResults::submitAggregatedResultCall {
            researchTopic: result.topic.clone(),
            resultHash: result_hash,
            accuracy: U256::from(result.accuracy.get()),
            agentAddress: agent,
        };
        tracing::info!(id = result.id, topic = %result.topic, "Submitting aggregated result");
        let transaction_id = self
            .submit(&signer, target, call.abi_encode().into())
            .await?;
        Ok(TransactionOutcome { transaction_id })
    }

    pub async fn get_research_result(
        &self,
        topic: &str,
        agent: &str,
    ) -> Result<OnChainResult, ContractError> {
        let topic = required("research topic", topic)?;
        let agent = required("agent address", agent)?;
        let signer = self.signer()?;
        let agent = parse_address(agent)?;
        let target = self.research_results_address()?;

        let call = IResearchResults::getResearchResultCall {
            researchTopic: topic.to_string(),
            agentAddress: agent,
        };
        let data = self.read(&signer, target, call.abi_encode().into()).await?;
        let (result_hash, accuracy) =
            abi::decode_hash_and_uint(&data).map_err(|reason| ContractError::Decode {
                method: "getResearchResult",
                reason,
            })?;
        Ok(OnChainResult {
            result_hash,
            accuracy,
        })
    }

    fn signer(&self) -> Result<Signer, ContractError> {
        self.session
            .current()
            .map(|session| session.signer())
            .ok_or(ContractError::NotConnected)
    }

    fn acquire(&self, action: ContractAction) -> Result<InFlightPermit, ContractError> {
        self.in_flight
            .try_acquire(action)
            .ok_or(ContractError::ActionInFlight {
                action: action.as_str(),
            })
    }

    fn identity_address(&self) -> Result<Address, ContractError> {
        configured("identity", &self.config.identity)
    }

    fn research_results_address(&self) -> Result<Address, ContractError> {
        configured("research results", &self.config.research_results)
    }

    fn prepare_access(
        &self,
        token_id: &str,
        agent: &str,
        data_type: &str,
    ) -> Result<(Signer, Address, AccessArgs), ContractError> {
        let token_id = required("token id", token_id)?;
        let agent = required("agent address", agent)?;
        let data_type = required("data type", data_type)?;
        let signer = self.signer()?;

        let args = AccessArgs {
            token_id: U256::from_str(token_id).map_err(|e| ContractError::InvalidField {
                field: "token id",
                value: token_id.to_string(),
                reason: e.to_string(),
            })?,
            agent: parse_address(agent)?,
            data_type_hash: keccak256(data_type.as_bytes()),
        };
        let target = self.identity_address()?;
        Ok((signer, target, args))
    }

    async fn submit(&self, signer: &Signer, to: Address, data: Bytes) -> Result<B256, ContractError> {
        let tx_hash = wallet::send_transaction(signer.provider(), signer.address, to, &data)
            .await
            .map_err(|source| ContractError::Provider {
                method: "eth_sendTransaction",
                source,
            })?;
        tracing::debug!(tx = %tx_hash, "Transaction submitted; waiting for confirmation");

        self.wait_for_confirmation(signer, tx_hash).await?;

        if !self.session.is_current(signer.epoch) {
            tracing::warn!(
                tx = %tx_hash,
                "Session changed while the transaction was in flight"
            );
        }
        Ok(tx_hash)
    }

    async fn wait_for_confirmation(&self, signer: &Signer, tx_hash: B256) -> Result<(), ContractError> {
        let poll = self.config.confirmation_poll_interval;
        let waited = self.config.confirmation_timeout;

        let confirmation = async {
            loop {
                let receipt = wallet::transaction_receipt(signer.provider(), tx_hash)
                    .await
                    .map_err(|source| ContractError::Provider {
                        method: "eth_getTransactionReceipt",
                        source,
                    })?;
                if let Some(receipt) = receipt {
                    return Ok::<_, ContractError>(receipt);
                }
                tokio::time::sleep(poll).await;
            }
        };

        let receipt = tokio::time::timeout(waited, confirmation)
            .await
            .map_err(|_| ContractError::ConfirmationTimeout {
                tx_hash: tx_hash.to_string(),
                waited,
            })??;

        if !receipt.succeeded() {
            return Err(ContractError::Reverted {
                tx_hash: tx_hash.to_string(),
            });
        }
        tracing::info!(tx = %tx_hash, block = ?receipt.block_number, "Transaction confirmed");
        Ok(())
    }

    async fn read(&self, signer: &Signer, to: Address, data: Bytes) -> Result<Bytes, ContractError> {
        wallet::call(signer.provider(), signer.address, to, &data)
            .await
            .map_err(|source| ContractError::Provider {
                method: "eth_call",
                source,
            })
    }
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ContractError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ContractError::MissingField { field });
    }
    Ok(trimmed)
}

fn parse_address(raw: &str) -> Result<Address, ContractError> {
    Address::from_str(raw.trim()).map_err(|e| ContractError::InvalidField {
        field: "agent address",
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_hash(raw: &str) -> Result<B256, ContractError> {
    B256::from_str(raw.trim()).map_err(|e| ContractError::InvalidField {
        field: "result hash",
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn configured(contract: &'static str, target: &ContractTarget) -> Result<Address, ContractError> {
    match target {
        ContractTarget::Deployed(address) => Ok(*address),
        ContractTarget::Placeholder(placeholder) => Err(ContractError::NotConfigured {
            contract,
            placeholder: placeholder.clone(),
        }),
    }
}
