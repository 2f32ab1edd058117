//! Error types for medresearch.

use std::time::Duration;

use serde::Serialize;

/// Top-level error type for the application.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Contract error: {0}")]
    Contract(#[from] ContractError),

    #[error("Assist error: {0}")]
    Assist(#[from] AssistError),

    #[error("Data provider error: {0}")]
    Data(#[from] DataError),
}

/// Failure taxonomy surfaced to the view layer.
///
/// Every domain error maps onto exactly one kind so the banner and the
/// structured logs agree on what went wrong.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    WalletUnavailable,
    UserRejected,
    RequestPending,
    NotConnected,
    MissingField,
    InvalidInput,
    ActionInFlight,
    ContractNotConfigured,
    ContractFailure,
    UnexpectedResponseShape,
    NetworkFailure,
    Configuration,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WalletUnavailable => "wallet_unavailable",
            Self::UserRejected => "user_rejected",
            Self::RequestPending => "request_pending",
            Self::NotConnected => "not_connected",
            Self::MissingField => "missing_field",
            Self::InvalidInput => "invalid_input",
            Self::ActionInFlight => "action_in_flight",
            Self::ContractNotConfigured => "contract_not_configured",
            Self::ContractFailure => "contract_failure",
            Self::UnexpectedResponseShape => "unexpected_response_shape",
            Self::NetworkFailure => "network_failure",
            Self::Configuration => "configuration",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// EIP-1193 provider errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WalletError {
    /// Error object returned by the provider (`{ code, message }`).
    #[error("Provider returned error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Wallet transport failed: {0}")]
    Transport(String),

    #[error("Malformed provider response for {method}: {reason}")]
    MalformedResponse { method: String, reason: String },
}

impl WalletError {
    /// EIP-1193 `4001`: the user rejected the request.
    pub const USER_REJECTED: i64 = 4001;
    /// `-32002`: a request of the same type is already pending in the wallet.
    pub const REQUEST_PENDING: i64 = -32002;

    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Rpc { code, .. } if *code == Self::USER_REJECTED => ErrorKind::UserRejected,
            Self::Rpc { code, .. } if *code == Self::REQUEST_PENDING => ErrorKind::RequestPending,
            Self::Rpc { .. } => ErrorKind::ContractFailure,
            Self::Transport(_) => ErrorKind::NetworkFailure,
            Self::MalformedResponse { .. } => ErrorKind::UnexpectedResponseShape,
        }
    }
}

/// Wallet session errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No wallet is available: {reason}")]
    WalletUnavailable { reason: String },

    #[error("Connection rejected by user")]
    UserRejected,

    #[error("The wallet is already processing a connection request")]
    RequestPending,

    #[error("Wallet returned an invalid account '{account}'")]
    InvalidAccount { account: String },

    #[error("Failed to connect wallet: {0}")]
    Provider(#[source] WalletError),

    #[error("The session changed while the wallet was responding")]
    Superseded,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::WalletUnavailable { .. } => ErrorKind::WalletUnavailable,
            Self::UserRejected => ErrorKind::UserRejected,
            Self::RequestPending => ErrorKind::RequestPending,
            Self::InvalidAccount { .. } => ErrorKind::UnexpectedResponseShape,
            Self::Provider(err) => err.kind(),
            Self::Superseded => ErrorKind::NotConnected,
        }
    }
}

/// Contract facade errors.
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error("Wallet not connected")]
    NotConnected,

    #[error("Please fill the {field} field")]
    MissingField { field: &'static str },

    #[error("Invalid {field} '{value}': {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("A {action} call is already in flight")]
    ActionInFlight { action: &'static str },

    #[error("{contract} contract address is not configured (still '{placeholder}')")]
    NotConfigured {
        contract: &'static str,
        placeholder: String,
    },

    #[error("Transaction {tx_hash} reverted")]
    Reverted { tx_hash: String },

    #[error("Transaction {tx_hash} not confirmed after {waited:?}")]
    ConfirmationTimeout { tx_hash: String, waited: Duration },

    #[error("{method} failed: {source}")]
    Provider {
        method: &'static str,
        #[source]
        source: WalletError,
    },

    #[error("Could not decode {method} result: {reason}")]
    Decode { method: &'static str, reason: String },
}

impl ContractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotConnected => ErrorKind::NotConnected,
            Self::MissingField { .. } => ErrorKind::MissingField,
            Self::InvalidField { .. } => ErrorKind::InvalidInput,
            Self::ActionInFlight { .. } => ErrorKind::ActionInFlight,
            Self::NotConfigured { .. } => ErrorKind::ContractNotConfigured,
            Self::Reverted { .. } | Self::ConfirmationTimeout { .. } => ErrorKind::ContractFailure,
            Self::Provider { source, .. } => match source.kind() {
                ErrorKind::UserRejected => ErrorKind::UserRejected,
                ErrorKind::NetworkFailure => ErrorKind::NetworkFailure,
                _ => ErrorKind::ContractFailure,
            },
            Self::Decode { .. } => ErrorKind::UnexpectedResponseShape,
        }
    }
}

/// Generative-language assist errors.
#[derive(Debug, thiserror::Error)]
pub enum AssistError {
    #[error("Please enter a {field}")]
    MissingField { field: &'static str },

    #[error("Generative API request failed: {reason}")]
    NetworkFailure { reason: String },

    #[error("Generative API response missing {missing}")]
    UnexpectedResponseShape { missing: &'static str },
}

impl AssistError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingField { .. } => ErrorKind::MissingField,
            Self::NetworkFailure { .. } => ErrorKind::NetworkFailure,
            Self::UnexpectedResponseShape { .. } => ErrorKind::UnexpectedResponseShape,
        }
    }
}

/// Anonymized data provider errors.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Data API request failed: {0}")]
    Api(String),

    #[error("Failed to serialize records: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify any error into the user-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::Wallet(err) => err.kind(),
            Self::Session(err) => err.kind(),
            Self::Contract(err) => err.kind(),
            Self::Assist(err) => err.kind(),
            Self::Data(DataError::Api(_)) => ErrorKind::NetworkFailure,
            Self::Data(_) => ErrorKind::InvalidInput,
        }
    }
}

/// Result type alias for the application.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_eip1193_rejection_codes() {
        let rejected = WalletError::Rpc {
            code: WalletError::USER_REJECTED,
            message: "User denied account authorization".to_string(),
        };
        assert_eq!(rejected.kind(), ErrorKind::UserRejected);

        let pending = WalletError::Rpc {
            code: WalletError::REQUEST_PENDING,
            message: "Request already pending".to_string(),
        };
        assert_eq!(pending.kind(), ErrorKind::RequestPending);
        assert_eq!(pending.code(), Some(-32002));
    }

    #[test]
    fn contract_rejection_keeps_user_rejected_kind() {
        let err = Error::from(ContractError::Provider {
            method: "eth_sendTransaction",
            source: WalletError::Rpc {
                code: 4001,
                message: "denied".to_string(),
            },
        });
        assert_eq!(err.kind(), ErrorKind::UserRejected);
    }

    #[test]
    fn assist_errors_map_to_taxonomy() {
        assert_eq!(
            Error::from(AssistError::UnexpectedResponseShape {
                missing: "candidates"
            })
            .kind(),
            ErrorKind::UnexpectedResponseShape
        );
        assert_eq!(
            Error::from(AssistError::MissingField {
                field: "medical term"
            })
            .kind(),
            ErrorKind::MissingField
        );
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let encoded = serde_json::to_string(&ErrorKind::WalletUnavailable).expect("serialize");
        assert_eq!(encoded, "\"wallet_unavailable\"");
        assert_eq!(ErrorKind::ActionInFlight.to_string(), "action_in_flight");
    }
}
