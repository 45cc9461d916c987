mod input;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crisis_ensemble::{EnsembleConfig, EnsembleCoordinator, EnsembleMode};
use serde_json::json;
use tracing::{info, warn};

use input::ReplayInput;

/// Replay recorded classifier outputs through the crisis ensemble engine.
#[derive(Debug, Parser)]
#[command(name = "crisis-replay", version)]
struct Cli {
    /// Ensemble config (TOML). Built-in defaults when omitted.
    #[arg(long, global = true, env = "CRISIS_ENSEMBLE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load and validate the config, then print the effective settings
    Validate,
    /// Run recorded outputs (one case or an array of cases) through the engine
    Analyze {
        /// JSON file with recorded classifier outputs
        #[arg(long)]
        input: PathBuf,
        /// Override the configured consensus mode
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
        /// Pretty-print each result
        #[arg(long)]
        pretty: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Consensus,
    Majority,
    Weighted,
}

impl From<ModeArg> for EnsembleMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Consensus => EnsembleMode::Consensus,
            ModeArg::Majority => EnsembleMode::Majority,
            ModeArg::Weighted => EnsembleMode::Weighted,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = EnsembleConfig::load(cli.config.as_deref())
        .context("Failed to load ensemble configuration")?;

    match cli.command {
        Command::Validate => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Analyze {
            input,
            mode,
            pretty,
        } => analyze(config, &input, mode.map(Into::into), pretty).await,
    }
}

async fn analyze(
    config: EnsembleConfig,
    input: &Path,
    mode: Option<EnsembleMode>,
    pretty: bool,
) -> Result<()> {
    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let cases = serde_json::from_str::<ReplayInput>(&raw)
        .with_context(|| format!("Invalid replay input in {}", input.display()))?
        .into_cases();

    let mut coordinator = EnsembleCoordinator::new(config)?;
    if let Some(mode) = mode {
        coordinator = coordinator.with_mode(mode);
    }

    info!(cases = cases.len(), mode = ?mode, "Replaying recorded outputs");

    let mut failures = 0usize;
    for (index, case) in cases.iter().enumerate() {
        let id = case.id.clone().unwrap_or_else(|| index.to_string());
        let message = case.message.as_deref().unwrap_or_default();

        let line = match coordinator.analyze(message, &case.classifiers()).await {
            Ok(result) => json!({ "id": id, "result": result }),
            Err(e) => {
                warn!(case = %id, error = %e, "Analysis unavailable");
                failures += 1;
                json!({ "id": id, "error": e.to_string() })
            }
        };

        if pretty {
            println!("{}", serde_json::to_string_pretty(&line)?);
        } else {
            println!("{line}");
        }
    }

    info!(total = cases.len(), failures, "Replay complete");
    Ok(())
}
