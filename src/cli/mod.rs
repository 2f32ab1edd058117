//! Command-line interface.

pub mod doctor;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::assist::{AssistClient, AssistOutcome, GeminiClient};
use crate::bootstrap;
use crate::config::Config;
use crate::settings::{ContractSettings, Settings, WalletSettings};
use crate::research::data_provider::{
    CSV_FILE_NAME, DEFAULT_DATA_TYPE, DEFAULT_RECORD_COUNT, DataProvider, DataReference,
    generate_anonymized_records, write_csv,
};

#[derive(Parser, Debug)]
#[command(name = "medresearch")]
#[command(
    version,
    about = "Decentralized medical research demo: CARV ID, simulated research and AI assist"
)]
pub struct Cli {
    /// Path to a TOML config file (default: ~/.medresearch/config.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start the interactive terminal front end (default)
    Run,

    /// Explain a medical term in plain language and exit
    Explain {
        /// Term to explain
        #[arg(required = true, num_args = 1..)]
        term: Vec<String>,
    },

    /// Generate anonymized records and make them available to researchers
    GenerateData {
        /// Number of records to generate
        #[arg(long, default_value_t = DEFAULT_RECORD_COUNT)]
        records: usize,

        /// Data type label used for registration and file naming
        #[arg(long, default_value = DEFAULT_DATA_TYPE)]
        data_type: String,

        /// Output directory for the CSV and any local fallback file
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Write a starter config file (and `.env` when a key is given)
    Init {
        /// JSON-RPC endpoint of the wallet or node
        #[arg(long)]
        wallet_rpc_url: Option<String>,

        /// Deployed identity-token contract address
        #[arg(long)]
        identity_address: Option<String>,

        /// Deployed research-results contract address
        #[arg(long)]
        research_results_address: Option<String>,

        /// Gemini API key, saved to ~/.medresearch/.env
        #[arg(long)]
        gemini_api_key: Option<String>,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Check configuration and external dependencies
    Doctor {
        /// Exit with an error when any check fails
        #[arg(long)]
        strict: bool,
    },
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }
}

/// One-shot term explanation. The fixed fallback text is printed on failure
/// so the output matches what the interactive modal would show.
pub async fn run_explain(config: &Config, term: &str) -> anyhow::Result<()> {
    let client = AssistClient::new(Arc::new(GeminiClient::new(&config.assist)));
    match client.request_explanation(term).await? {
        AssistOutcome::Ready(text) => {
            println!("{text}");
            Ok(())
        }
        AssistOutcome::Failed {
            fallback, reason, ..
        } => {
            println!("{fallback}");
            anyhow::bail!("failed to explain term: {reason}")
        }
        AssistOutcome::Superseded => anyhow::bail!("request superseded"),
    }
}

pub async fn run_generate_data(
    config: &Config,
    records: usize,
    data_type: &str,
    out: PathBuf,
) -> anyhow::Result<()> {
    let data = generate_anonymized_records(records);
    std::fs::create_dir_all(&out)?;
    let csv_path = out.join(CSV_FILE_NAME);
    write_csv(&data, &csv_path)?;
    println!("Wrote {} records to {}", data.len(), csv_path.display());

    let provider = DataProvider::new(&config.data, out);
    match provider.make_data_available(&data, data_type).await? {
        DataReference::Registered(reference) => {
            println!("Registered with data API: {reference}");
        }
        DataReference::Local { uri, path } => {
            println!("Stored locally at {} ({uri})", path.display());
        }
    }
    Ok(())
}

/// Options for `medresearch init`.
#[derive(Debug, Default)]
pub struct InitOptions {
    pub wallet_rpc_url: Option<String>,
    pub identity_address: Option<String>,
    pub research_results_address: Option<String>,
    pub gemini_api_key: Option<String>,
    pub force: bool,
}

/// Write the TOML config to `path` and any secret to `env_path`.
pub fn run_init(path: &Path, env_path: &Path, options: InitOptions) -> anyhow::Result<()> {
    if path.exists() && !options.force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            path.display()
        );
    }

    let settings = Settings {
        wallet: WalletSettings {
            backend: Some("rpc".to_string()),
            rpc_url: options.wallet_rpc_url,
            ..WalletSettings::default()
        },
        contracts: ContractSettings {
            identity_address: options.identity_address,
            research_results_address: options.research_results_address,
            ..ContractSettings::default()
        },
        ..Settings::default()
    };
    settings.save_toml(path).map_err(|e| anyhow::anyhow!(e))?;
    println!("Wrote {}", path.display());

    if let Some(key) = options.gemini_api_key.filter(|k| !k.trim().is_empty()) {
        bootstrap::write_env_file(env_path, &[("GEMINI_API_KEY", key.trim())])?;
        println!("Saved GEMINI_API_KEY to {}", env_path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_run() {
        let cli = Cli::try_parse_from(["medresearch"]).expect("parse");
        assert_eq!(cli.command(), Command::Run);
    }

    #[test]
    fn explain_joins_words() {
        let cli = Cli::try_parse_from(["medresearch", "explain", "atrial", "fibrillation"])
            .expect("parse");
        match cli.command() {
            Command::Explain { term } => assert_eq!(term.join(" "), "atrial fibrillation"),
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(Cli::try_parse_from(["medresearch", "explain"]).is_err());
    }

    #[test]
    fn generate_data_defaults() {
        let cli = Cli::try_parse_from(["medresearch", "generate-data", "--records", "5"])
            .expect("parse");
        assert_eq!(
            cli.command(),
            Command::GenerateData {
                records: 5,
                data_type: DEFAULT_DATA_TYPE.to_string(),
                out: PathBuf::from("."),
            }
        );
    }

    #[test]
    fn init_writes_config_and_env() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let env_path = dir.path().join(".env");
        let options = InitOptions {
            identity_address: Some("0x5FbDB2315678afecb367f032d93F642f64180aa3".to_string()),
            gemini_api_key: Some("abc".to_string()),
            ..InitOptions::default()
        };
        run_init(&path, &env_path, options).expect("init");

        let saved = Settings::load_toml(&path).expect("load").expect("present");
        assert_eq!(
            saved.contracts.identity_address.as_deref(),
            Some("0x5FbDB2315678afecb367f032d93F642f64180aa3")
        );
        assert_eq!(saved.wallet.backend.as_deref(), Some("rpc"));
        let env = std::fs::read_to_string(&env_path).expect("env file");
        assert_eq!(env, "GEMINI_API_KEY=\"abc\"\n");

        assert!(run_init(&path, &env_path, InitOptions::default()).is_err());
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["medresearch", "doctor", "--config", "/tmp/c.toml"])
            .expect("parse");
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert_eq!(cli.command(), Command::Doctor { strict: false });
    }
}
