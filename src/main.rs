use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use medresearch::app::App;
use medresearch::channels::ReplChannel;
use medresearch::bootstrap;
use medresearch::cli::{self, Cli, Command, InitOptions};
use medresearch::config::Config;
use medresearch::settings::Settings;
use medresearch::wallet;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("medresearch=info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let toml_path = cli.config.as_deref();
    match cli.command() {
        Command::Doctor { strict } => cli::doctor::run_doctor_command(toml_path, strict).await,
        Command::Init {
            wallet_rpc_url,
            identity_address,
            research_results_address,
            gemini_api_key,
            force,
        } => {
            let path = toml_path
                .map(PathBuf::from)
                .unwrap_or_else(Settings::default_toml_path);
            cli::run_init(
                &path,
                &bootstrap::home_env_path(),
                InitOptions {
                    wallet_rpc_url,
                    identity_address,
                    research_results_address,
                    gemini_api_key,
                    force,
                },
            )
        }
        command => {
            let config = Config::from_env(toml_path)?;
            match command {
                Command::Explain { term } => cli::run_explain(&config, &term.join(" ")).await,
                Command::GenerateData {
                    records,
                    data_type,
                    out,
                } => cli::run_generate_data(&config, records, &data_type, out).await,
                _ => {
                    let provider = wallet::from_config(&config.wallet);
                    if provider.is_none() {
                        tracing::warn!("No wallet backend configured; wallet actions are disabled");
                    }
                    let app = Arc::new(App::from_config(&config, provider));
                    ReplChannel::new(app).run().await
                }
            }
        }
    }
}
