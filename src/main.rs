use eyeem_vision::{AnalysisTask, Config, VisionClient, DEFAULT_TASKS};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "eyeem-vision")]
#[command(about = "Score images with the EyeEm Vision API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Analysis task: TAGS, CAPTIONS, AESTHETIC_SCORE or CUSTOM_ENDPOINTS.
    /// Repeat for several; unknown names are ignored.
    #[arg(short, long = "task", global = true)]
    tasks: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze an image reachable by URL
    Url {
        /// Public image URL
        url: String,
    },

    /// Upload and analyze a local image file
    File {
        /// Path to a JPEG, PNG, GIF, BMP or WebP image
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    init_logging();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "eyeem_vision=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    info!("Configuration loaded successfully");
    info!("  +----- API base URL: {}", config.api_base_url);
    info!("  +-- Request timeout: {:?}", config.request_timeout());

    let mut client = VisionClient::from_config(&config)?;
    info!(
        "  +- Custom endpoints: {}",
        client.custom_endpoints().len()
    );

    let tasks = select_tasks(&cli.tasks);
    if tasks.contains(&AnalysisTask::CustomEndpoints) && client.custom_endpoints().is_empty() {
        warn!("CUSTOM_ENDPOINTS requested but no custom endpoints are configured");
    }

    client
        .connect(&config.client_id, &config.client_secret)
        .await
        .context("Failed to obtain access token")?;

    let result = match cli.command {
        Commands::Url { url } => client.score_image_url(&url, &tasks).await,
        Commands::File { path } => client.score_image_file(&path, &tasks).await,
    }
    .context("Image analysis failed")?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn select_tasks(names: &[String]) -> Vec<AnalysisTask> {
    if names.is_empty() {
        DEFAULT_TASKS.to_vec()
    } else {
        AnalysisTask::parse_lenient(names)
    }
}
