use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use avs_device_client::{
    ClientConfig, ConnectionManager, DeviceOrchestrator, FileAudioEngine, TokenProvider,
};

/// AVS device client - persistent HTTP/2 voice service client
#[derive(Parser, Debug)]
#[command(name = "avs-device-client")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Credentials file with Client_ID, Client_Secret and refresh_token (JSON)
    #[arg(long = "credentials", value_name = "FILE", conflicts_with = "config")]
    credentials: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run dialog turns, one per line read from stdin
    Run {
        /// Raw PCM utterance (16 kHz, 16 bit, mono); repeat to queue several
        #[arg(short = 'u', long = "utterance", value_name = "FILE", required = true)]
        utterances: Vec<PathBuf>,

        /// Directory where received speech is written
        #[arg(short = 'o', long = "output-dir", default_value = ".")]
        output_dir: PathBuf,
    },

    /// Validate the configuration and fetch an access token
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let config = if let Some(config_path) = &cli.config {
        println!("Loading configuration from {}", config_path.display());
        ClientConfig::from_file(config_path)?
    } else if let Some(credentials_path) = &cli.credentials {
        println!("Loading credentials from {}", credentials_path.display());
        ClientConfig::from_credentials_file(credentials_path)?
    } else {
        ClientConfig::from_env()?
    };

    match cli.command {
        Commands::Check => check(&config).await,
        Commands::Run {
            utterances,
            output_dir,
        } => run(&config, utterances, output_dir).await,
    }
}

async fn check(config: &ClientConfig) -> anyhow::Result<()> {
    let provider = TokenProvider::new(config)?;
    provider
        .get_token()
        .await
        .context("Failed to obtain an access token")?;

    println!("Configuration valid for {}", config.endpoint);
    println!("Access token obtained from {}", config.auth_url);
    Ok(())
}

async fn run(
    config: &ClientConfig,
    utterances: Vec<PathBuf>,
    output_dir: PathBuf,
) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&output_dir)
        .await
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let connection = Arc::new(ConnectionManager::from_config(config)?);
    let audio = Arc::new(FileAudioEngine::new(utterances, output_dir));
    let device = DeviceOrchestrator::new(config, connection, audio);

    device.start().await.context("Failed to connect")?;
    println!("Connected to {}. Press Enter to talk, 'quit' to exit.", config.endpoint);

    let (triggers, rx) = mpsc::channel(1);
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if matches!(line.trim(), "q" | "quit" | "exit") {
                break;
            }
            if triggers.send(()).await.is_err() {
                break;
            }
        }
    });

    let shutdown = device.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            shutdown.cancel();
        }
    });

    device.run(rx).await;

    if let Err(e) = device.shutdown().await {
        warn!(error = %e, "Audio engine did not close cleanly");
    }
    reader.abort();
    Ok(())
}
