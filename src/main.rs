//! CLI front-end: `run`, `stats`, `verify`, `watch`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use secure_doc_ai::pipeline::Pipeline;
use secure_doc_ai::PipelineConfig;

#[derive(Parser)]
#[command(name = "secure-doc-ai")]
#[command(about = "PII detection and redaction pipeline")]
#[command(version)]
struct Cli {
    /// Path to the pipeline's TOML configuration file.
    #[arg(long, global = true, env = "SECURE_DOC_AI_CONFIG", default_value = "secure-doc-ai.toml")]
    config: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline on a single document.
    Run {
        /// Path to the input PDF or image.
        path: PathBuf,
        /// Original filename to record in the audit log (defaults to the path's filename).
        #[arg(long)]
        filename: Option<String>,
    },
    /// Print aggregate job statistics.
    Stats,
    /// Verify a previously signed document's embedded signature.
    Verify {
        /// Path to a signed PDF.
        path: PathBuf,
    },
    /// Watch a directory, running the pipeline on every new file placed in it.
    Watch {
        /// Directory to watch (defaults to the configured processing directory).
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let default_filter = if cli.verbose { "secure_doc_ai=info" } else { "secure_doc_ai=warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PipelineConfig::load(&cli.config)?;
    let pipeline = Pipeline::new(config, None)?;

    match cli.command {
        Commands::Run { path, filename } => {
            let filename = filename.unwrap_or_else(|| {
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "unnamed".to_string())
            });
            let job_id = Pipeline::new_job_id();
            let result = pipeline.run(&job_id, &path, &filename).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if result.status != secure_doc_ai::models::JobStatus::Completed {
                std::process::exit(1);
            }
        }
        Commands::Stats => {
            let stats = pipeline.stats()?;
            println!("{stats:#?}");
        }
        Commands::Verify { path } => {
            let ok = pipeline.verify(&path)?;
            println!("{}", if ok { "valid" } else { "invalid" });
            if !ok {
                std::process::exit(1);
            }
        }
        Commands::Watch { dir } => {
            watch(&pipeline, dir).await?;
        }
    }

    Ok(())
}

/// Polls a directory for new files and runs the pipeline on each one it
/// finds. A real deployment would use filesystem notifications instead
/// of polling; this stands in for that trigger.
async fn watch(pipeline: &Pipeline, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let dir = dir.ok_or_else(|| anyhow::anyhow!("no directory given and none configured"))?;
    tracing::info!(dir = %dir.display(), "watching for new documents");
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(2));
    loop {
        interval.tick().await;
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let job_id = Pipeline::new_job_id();
            let result = pipeline.run(&job_id, &path, &filename).await;
            tracing::info!(job_id, status = result.status.as_str(), "watch job finished");
        }
    }
}
