use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use docpress::config::Config;
use docpress::jobs::JobStatus;
use docpress::orchestrator::DocumentGenerator;
use docpress::store::ContentStore;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Docpress - template to PDF generation with a durable result cache
#[derive(Parser, Debug)]
#[command(name = "docpress")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate one document and print the finished job as JSON
    Generate {
        /// Template id
        #[arg(short, long)]
        template: String,

        /// JSON file with the template data
        #[arg(short, long)]
        data: PathBuf,

        /// JSON file with generation options
        #[arg(short, long)]
        options: Option<PathBuf>,

        /// Seconds to wait for the job
        #[arg(long, default_value_t = 120)]
        timeout: u64,
    },

    /// Print content store statistics as JSON
    Stats,

    /// Remove expired store entries
    Sweep,
}

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .map_err(anyhow::Error::msg)
        .context("Failed to load configuration")?;
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid configuration")?;

    docpress::logging::init_subscriber(&config.logging)
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to initialize logging subsystem")?;

    tracing::info!(
        config_file = %args.config.display(),
        cache_dir = %config.store.cache_dir.display(),
        templates = config.templates.len(),
        "Configuration loaded successfully"
    );

    match args.command {
        Command::Generate {
            template,
            data,
            options,
            timeout,
        } => {
            let data = read_json(&data)?;
            let options = match options {
                Some(path) => read_json(&path)?,
                None => Value::Null,
            };

            let generator = DocumentGenerator::start(&config).await?;
            let view = generator
                .generate_and_wait(&template, data, options, Duration::from_secs(timeout))
                .await?;
            generator.shutdown().await;

            println!("{}", serde_json::to_string_pretty(&view)?);
            if view.status == JobStatus::Failed {
                bail!("generation job {} failed", view.id);
            }
        }
        Command::Stats => {
            let store = ContentStore::open_on_disk(&config.store).await?;
            println!("{}", serde_json::to_string_pretty(&store.stats())?);
        }
        Command::Sweep => {
            let store = ContentStore::open_on_disk(&config.store).await?;
            let removed = store.sweep_expired().await?;
            println!("{}", serde_json::json!({ "entries_removed": removed }));
        }
    }

    Ok(())
}
