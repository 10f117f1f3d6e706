//! sommctl - identify wines from the command line.

use anyhow::{bail, Context, Result};
use base64::Engine as _;
use clap::{Parser, Subcommand};
use sommctl::client::{ApiClient, DEFAULT_BASE_URL};
use sommctl::dispatch::{
    handlers, Action, DispatchContext, DispatchEngine, Phase, ValidatorMode,
};
use sommctl::output;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Exit code when the identification ended in an error phase
const EXIT_IDENTIFY_FAILED: u8 = 1;
/// Exit code when the daemon is unreachable
const EXIT_DAEMON_UNAVAILABLE: u8 = 70;

#[derive(Parser)]
#[command(name = "sommctl")]
#[command(about = "Somm - wine identification client", long_about = None)]
#[command(version)]
struct Cli {
    /// Daemon base URL (falls back to SOMM_SERVER, then the default)
    #[arg(long)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Identify a wine from a description or a label photo
    Identify {
        /// Free-form description, e.g. "Chateau Margaux 2018"
        text: Option<String>,

        /// Path to a label photo (jpeg/png/webp)
        #[arg(long)]
        image: Option<PathBuf>,

        /// Extra text to go with a photo
        #[arg(long)]
        note: Option<String>,

        /// Add the wine to the cellar when identification succeeds
        #[arg(long)]
        add: bool,
    },

    /// Check daemon health
    Health,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SOMM_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let server = cli
        .server
        .clone()
        .or_else(|| std::env::var("SOMM_SERVER").ok())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let client = Arc::new(ApiClient::new(server).context("failed to build HTTP client")?);

    match cli.command {
        Commands::Health => {
            let report = match client.health().await {
                Ok(report) => report,
                Err(err) => {
                    eprintln!("[ERROR] daemon unreachable: {}", err);
                    return Ok(ExitCode::from(EXIT_DAEMON_UNAVAILABLE));
                }
            };
            println!(
                "somm daemon {} is {} (up {}s)",
                report.version, report.status, report.uptime_secs
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Identify {
            text,
            image,
            note,
            add,
        } => {
            let action = build_submit_action(text, image.as_deref(), note)?;
            let ctx = Arc::new(DispatchContext::default());
            output::attach(&ctx);
            let engine = DispatchEngine::new(
                ctx.clone(),
                handlers::base_handler(client),
                ValidatorMode::Warn,
            );

            engine.dispatch(action).await;

            if add && ctx.phase() == Phase::Confirming {
                if let Some((message_id, chip_id)) = find_chip(&ctx, "add_to_cellar") {
                    engine
                        .dispatch(Action::SelectChip {
                            message_id,
                            chip_id,
                        })
                        .await;
                }
            }

            if ctx.phase() == Phase::Error {
                return Ok(ExitCode::from(EXIT_IDENTIFY_FAILED));
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_submit_action(
    text: Option<String>,
    image: Option<&Path>,
    note: Option<String>,
) -> Result<Action> {
    match (text, image) {
        (_, Some(path)) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("failed to read image {}", path.display()))?;
            let mime_type = mime_for(path)?;
            Ok(Action::SubmitImage {
                image: base64::engine::general_purpose::STANDARD.encode(bytes),
                mime_type: mime_type.to_string(),
                supplementary_text: note,
            })
        }
        (Some(text), None) => Ok(Action::SubmitText { text }),
        (None, None) => bail!("provide a description or --image <path>"),
    }
}

fn mime_for(path: &Path) -> Result<&'static str> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => Ok("image/jpeg"),
        Some("png") => Ok("image/png"),
        Some("webp") => Ok("image/webp"),
        other => bail!("unsupported image type: {:?}", other),
    }
}

/// Locate a chip by id in the newest chips message.
fn find_chip(ctx: &DispatchContext, chip_id: &str) -> Option<(uuid::Uuid, String)> {
    ctx.with_transcript(|transcript| {
        transcript.messages().iter().rev().find_map(|m| {
            match &m.payload {
                somm_common::MessagePayload::Chips { chips, .. } => chips
                    .iter()
                    .find(|c| c.id == chip_id)
                    .map(|c| (m.id, c.id.clone())),
                _ => None,
            }
        })
    })
}
