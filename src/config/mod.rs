//! Configuration for medresearch.
//!
//! Settings are loaded with priority: env var > config.toml > default.
//! Secrets come from the environment only (see `bootstrap`), contract
//! addresses fall back to visible placeholders when absent.

pub(crate) mod helpers;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::Address;
use secrecy::SecretString;

use crate::error::ConfigError;
use crate::settings::Settings;

use self::helpers::{normalize_variant, optional_env, parse_env_or, positive_millis};

pub const IDENTITY_CONTRACT_PLACEHOLDER: &str = "YOUR_CARV_ID_NFT_CONTRACT_ADDRESS";
pub const RESEARCH_RESULTS_CONTRACT_PLACEHOLDER: &str =
    "YOUR_MEDICAL_RESEARCH_RESULTS_CONTRACT_ADDRESS";
const DEFAULT_WALLET_RPC_URL: &str = "http://127.0.0.1:8545";
const DEFAULT_METADATA_BASE_URI: &str = "https://example.com/carv-id";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_DATA_API_BASE_URL: &str = "https://interface.carv.io/ai-agent-backend";

/// Main configuration for the application.
#[derive(Debug, Clone)]
pub struct Config {
    pub wallet: WalletConfig,
    pub contracts: ContractsConfig,
    pub assist: AssistConfig,
    pub data: DataConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletBackend {
    /// JSON-RPC endpoint of a wallet or dev node holding unlocked accounts.
    Rpc,
    /// In-process development wallet; transactions confirm immediately.
    Memory,
    /// No wallet installed.
    None,
}

impl WalletBackend {
    fn parse(value: &str, key: &str) -> Result<Self, ConfigError> {
        match normalize_variant(value).as_str() {
            "rpc" | "json_rpc" => Ok(Self::Rpc),
            "memory" | "dev" => Ok(Self::Memory),
            "none" | "off" => Ok(Self::None),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected 'rpc', 'memory' or 'none', got '{value}'"),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub backend: WalletBackend,
    pub rpc_url: String,
    pub poll_interval: Duration,
}

impl WalletConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let backend = WalletBackend::parse(
            &optional_env("WALLET_BACKEND")?
                .or_else(|| settings.wallet.backend.clone())
                .unwrap_or_else(|| "rpc".to_string()),
            "WALLET_BACKEND",
        )?;

        let rpc_url = optional_env("WALLET_RPC_URL")?
            .or_else(|| settings.wallet.rpc_url.clone())
            .unwrap_or_else(|| DEFAULT_WALLET_RPC_URL.to_string());
        if backend == WalletBackend::Rpc {
            url::Url::parse(&rpc_url).map_err(|e| ConfigError::InvalidValue {
                key: "WALLET_RPC_URL".to_string(),
                message: format!("invalid URL '{rpc_url}': {e}"),
            })?;
        }

        let poll_interval = positive_millis(
            "WALLET_POLL_INTERVAL_MS",
            settings.wallet.poll_interval_ms,
            1_000,
        )?;

        Ok(Self {
            backend,
            rpc_url,
            poll_interval,
        })
    }
}

/// Where a contract lives, or the placeholder standing in for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractTarget {
    Deployed(Address),
    Placeholder(String),
}

impl ContractTarget {
    /// Anything that looks like a hex address must parse as one; any other
    /// value is kept as a placeholder so calls fail with a clear message.
    fn parse(raw: &str, key: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
            let address = Address::from_str(trimmed).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("invalid address '{trimmed}': {e}"),
            })?;
            return Ok(Self::Deployed(address));
        }
        Ok(Self::Placeholder(trimmed.to_string()))
    }

    pub fn address(&self) -> Option<Address> {
        match self {
            Self::Deployed(address) => Some(*address),
            Self::Placeholder(_) => None,
        }
    }
}

impl std::fmt::Display for ContractTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deployed(address) => write!(f, "{address}"),
            Self::Placeholder(placeholder) => write!(f, "{placeholder} (placeholder)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContractsConfig {
    pub identity: ContractTarget,
    pub research_results: ContractTarget,
    pub metadata_base_uri: String,
    pub confirmation_poll_interval: Duration,
    pub confirmation_timeout: Duration,
}

impl ContractsConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let identity = ContractTarget::parse(
            &optional_env("IDENTITY_CONTRACT_ADDRESS")?
                .or_else(|| settings.contracts.identity_address.clone())
                .unwrap_or_else(|| IDENTITY_CONTRACT_PLACEHOLDER.to_string()),
            "IDENTITY_CONTRACT_ADDRESS",
        )?;
        let research_results = ContractTarget::parse(
            &optional_env("RESEARCH_RESULTS_CONTRACT_ADDRESS")?
                .or_else(|| settings.contracts.research_results_address.clone())
                .unwrap_or_else(|| RESEARCH_RESULTS_CONTRACT_PLACEHOLDER.to_string()),
            "RESEARCH_RESULTS_CONTRACT_ADDRESS",
        )?;

        let metadata_base_uri = optional_env("IDENTITY_METADATA_BASE_URI")?
            .or_else(|| settings.contracts.metadata_base_uri.clone())
            .unwrap_or_else(|| DEFAULT_METADATA_BASE_URI.to_string())
            .trim_end_matches('/')
            .to_string();

        let confirmation_poll_interval = positive_millis(
            "CONFIRMATION_POLL_INTERVAL_MS",
            settings.contracts.confirmation_poll_interval_ms,
            1_000,
        )?;
        let timeout_secs: u64 = parse_env_or(
            "CONFIRMATION_TIMEOUT_SECS",
            settings.contracts.confirmation_timeout_secs,
            120,
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CONFIRMATION_TIMEOUT_SECS".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        Ok(Self {
            identity,
            research_results,
            metadata_base_uri,
            confirmation_poll_interval,
            confirmation_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

#[derive(Debug, Clone)]
pub struct AssistConfig {
    /// Passed as the `key` query parameter. Empty is allowed (keyless proxies).
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
}

impl AssistConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let api_key = SecretString::from(optional_env("GEMINI_API_KEY")?.unwrap_or_default());
        let base_url = optional_env("GEMINI_BASE_URL")?
            .or_else(|| settings.assist.base_url.clone())
            .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        url::Url::parse(&base_url).map_err(|e| ConfigError::InvalidValue {
            key: "GEMINI_BASE_URL".to_string(),
            message: format!("invalid URL '{base_url}': {e}"),
        })?;
        let model = optional_env("GEMINI_MODEL")?
            .or_else(|| settings.assist.model.clone())
            .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());

        Ok(Self {
            api_key,
            base_url,
            model,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DataConfig {
    pub api_key: Option<SecretString>,
    pub api_base_url: String,
}

impl DataConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: optional_env("DATA_API_KEY")?.map(SecretString::from),
            api_base_url: optional_env("DATA_API_BASE_URL")?
                .or_else(|| settings.data.api_base_url.clone())
                .unwrap_or_else(|| DEFAULT_DATA_API_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

impl Config {
    /// Load configuration from env files, the TOML file and the environment.
    ///
    /// An explicit `toml_path` must exist; the default path may be absent.
    pub fn from_env(toml_path: Option<&Path>) -> Result<Self, ConfigError> {
        crate::bootstrap::load_env_files();
        let settings = Self::load_settings(toml_path)?;
        Self::resolve(&settings)
    }

    fn load_settings(explicit_path: Option<&Path>) -> Result<Settings, ConfigError> {
        let path = explicit_path
            .map(Path::to_path_buf)
            .unwrap_or_else(Settings::default_toml_path);

        match Settings::load_toml(&path) {
            Ok(Some(settings)) => {
                tracing::debug!("Loaded TOML config from {}", path.display());
                Ok(settings)
            }
            Ok(None) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                Ok(Settings::default())
            }
            Err(e) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(e));
                }
                tracing::warn!("Failed to load default config file: {}", e);
                Ok(Settings::default())
            }
        }
    }

    /// Build config from already-loaded settings.
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            wallet: WalletConfig::resolve(settings)?,
            contracts: ContractsConfig::resolve(settings)?,
            assist: AssistConfig::resolve(settings)?,
            data: DataConfig::resolve(settings)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const KEYS: &[&str] = &[
        "WALLET_BACKEND",
        "WALLET_RPC_URL",
        "WALLET_POLL_INTERVAL_MS",
        "IDENTITY_CONTRACT_ADDRESS",
        "RESEARCH_RESULTS_CONTRACT_ADDRESS",
        "IDENTITY_METADATA_BASE_URI",
        "CONFIRMATION_POLL_INTERVAL_MS",
        "CONFIRMATION_TIMEOUT_SECS",
        "GEMINI_API_KEY",
        "GEMINI_BASE_URL",
        "GEMINI_MODEL",
        "DATA_API_KEY",
        "DATA_API_BASE_URL",
    ];

    fn clear_env() {
        // SAFETY: Guarded by ENV_MUTEX in tests.
        unsafe {
            for key in KEYS {
                std::env::remove_var(key);
            }
        }
    }

    #[test]
    fn resolves_placeholder_defaults() {
        let _guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        clear_env();

        let config = Config::resolve(&Settings::default()).expect("resolve");
        assert_eq!(config.wallet.backend, WalletBackend::Rpc);
        assert_eq!(config.wallet.rpc_url, "http://127.0.0.1:8545");
        assert_eq!(config.wallet.poll_interval, Duration::from_secs(1));
        assert_eq!(
            config.contracts.identity,
            ContractTarget::Placeholder(IDENTITY_CONTRACT_PLACEHOLDER.to_string())
        );
        assert!(config.contracts.research_results.address().is_none());
        assert_eq!(config.contracts.metadata_base_uri, "https://example.com/carv-id");
        assert_eq!(config.contracts.confirmation_timeout, Duration::from_secs(120));
        assert_eq!(config.assist.model, "gemini-2.0-flash");
        assert_eq!(config.assist.api_key.expose_secret(), "");
        assert!(config.data.api_key.is_none());
    }

    #[test]
    fn env_overrides_settings() {
        let _guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        clear_env();

        // SAFETY: Guarded by ENV_MUTEX in tests.
        unsafe {
            std::env::set_var("WALLET_BACKEND", "memory");
            std::env::set_var(
                "IDENTITY_CONTRACT_ADDRESS",
                "0x5FbDB2315678afecb367f032d93F642f64180aa3",
            );
            std::env::set_var("GEMINI_MODEL", "gemini-test");
        }

        let mut settings = Settings::default();
        settings.wallet.backend = Some("rpc".to_string());
        settings.assist.model = Some("from-file".to_string());
        settings.contracts.metadata_base_uri = Some("https://meta.example/ids/".to_string());

        let config = Config::resolve(&settings).expect("resolve");
        assert_eq!(config.wallet.backend, WalletBackend::Memory);
        assert!(matches!(config.contracts.identity, ContractTarget::Deployed(_)));
        assert_eq!(config.assist.model, "gemini-test");
        assert_eq!(config.contracts.metadata_base_uri, "https://meta.example/ids");

        clear_env();
    }

    #[test]
    fn rejects_malformed_hex_address() {
        let _guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        clear_env();

        // SAFETY: Guarded by ENV_MUTEX in tests.
        unsafe {
            std::env::set_var("RESEARCH_RESULTS_CONTRACT_ADDRESS", "0x1234");
        }

        let err = Config::resolve(&Settings::default()).unwrap_err();
        match err {
            ConfigError::InvalidValue { key, .. } => {
                assert_eq!(key, "RESEARCH_RESULTS_CONTRACT_ADDRESS")
            }
            other => panic!("unexpected error: {other}"),
        }

        clear_env();
    }

    #[test]
    fn rejects_zero_intervals_and_unknown_backend() {
        let _guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        clear_env();

        // SAFETY: Guarded by ENV_MUTEX in tests.
        unsafe {
            std::env::set_var("WALLET_POLL_INTERVAL_MS", "0");
        }
        let err = Config::resolve(&Settings::default()).unwrap_err();
        assert!(err.to_string().contains("WALLET_POLL_INTERVAL_MS"));

        clear_env();
        // SAFETY: Guarded by ENV_MUTEX in tests.
        unsafe {
            std::env::set_var("WALLET_BACKEND", "hardware");
        }
        let err = Config::resolve(&Settings::default()).unwrap_err();
        assert!(err.to_string().contains("WALLET_BACKEND"));

        clear_env();
    }
}
