//! User settings persistence.
//!
//! Stores user preferences in ~/.medresearch/config.toml.
//! Settings are loaded with env var > config.toml > default priority.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// User settings read from the TOML config file.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Settings {
    /// Wallet provider selection.
    #[serde(default)]
    pub wallet: WalletSettings,

    /// Identity-token and research-results contract wiring.
    #[serde(default)]
    pub contracts: ContractSettings,

    /// Generative-language endpoint.
    #[serde(default)]
    pub assist: AssistSettings,

    /// Anonymized data provider.
    #[serde(default)]
    pub data: DataSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct WalletSettings {
    /// "rpc", "memory" or "none".
    #[serde(default)]
    pub backend: Option<String>,

    /// JSON-RPC endpoint of the wallet/node (when backend = "rpc").
    #[serde(default)]
    pub rpc_url: Option<String>,

    /// How often account/chain changes are polled.
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractSettings {
    #[serde(default)]
    pub identity_address: Option<String>,

    #[serde(default)]
    pub research_results_address: Option<String>,

    /// Base URI for placeholder identity-token metadata.
    #[serde(default)]
    pub metadata_base_uri: Option<String>,

    #[serde(default)]
    pub confirmation_poll_interval_ms: Option<u64>,

    #[serde(default)]
    pub confirmation_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AssistSettings {
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct DataSettings {
    #[serde(default)]
    pub api_base_url: Option<String>,
}

impl Settings {
    /// Application home directory (~/.medresearch).
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".medresearch")
    }

    /// Default TOML config file path (~/.medresearch/config.toml).
    pub fn default_toml_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Load settings from a TOML file.
    ///
    /// Returns `None` if the file doesn't exist. Returns an error only
    /// if the file exists but can't be parsed.
    pub fn load_toml(path: &Path) -> Result<Option<Self>, String> {
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("failed to read {}: {}", path.display(), e)),
        };

        let settings: Self = toml::from_str(&data)
            .map_err(|e| format!("invalid TOML in {}: {}", path.display(), e))?;
        Ok(Some(settings))
    }

    /// Write a commented TOML config file with current settings.
    pub fn save_toml(&self, path: &Path) -> Result<(), String> {
        let raw = toml::to_string_pretty(self)
            .map_err(|e| format!("failed to serialize settings: {}", e))?;

        let content = format!(
            "# medresearch configuration file.\n\
             #\n\
             # Priority: env var > this file > defaults.\n\
             # Secrets (GEMINI_API_KEY, DATA_API_KEY) belong in ~/.medresearch/.env.\n\
             \n\
             {raw}"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("failed to create {}: {}", parent.display(), e))?;
        }
        std::fs::write(path, content).map_err(|e| format!("failed to write {}: {}", path.display(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_toml_path_under_home_dir() {
        let path = Settings::default_toml_path();
        assert!(path.to_string_lossy().contains(".medresearch"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn missing_toml_file_is_not_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loaded = Settings::load_toml(&dir.path().join("absent.toml")).expect("load");
        assert!(loaded.is_none());
    }

    #[test]
    fn toml_save_and_load_preserves_sections() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let settings = Settings {
            wallet: WalletSettings {
                backend: Some("memory".to_string()),
                poll_interval_ms: Some(250),
                ..Default::default()
            },
            contracts: ContractSettings {
                identity_address: Some("0x5FbDB2315678afecb367f032d93F642f64180aa3".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        settings.save_toml(&path).expect("save");
        let restored = Settings::load_toml(&path).expect("load").expect("present");
        assert_eq!(restored, settings);
    }

    #[test]
    fn invalid_toml_reports_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[wallet\nbackend = ").expect("write");
        let err = Settings::load_toml(&path).unwrap_err();
        assert!(err.contains("invalid TOML"));
        assert!(err.contains("config.toml"));
    }
}
