mod config;
mod extract;
mod oneshot;
mod reply;
mod server;
mod vision;

use crate::config::Config;
use crate::server::{build_router, AppState};
use crate::vision::VisionClient;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "carlens", about = "Photo-to-JSON car identification gateway")]
struct Cli {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(Parser)]
enum SubCommand {
    /// Run the HTTP gateway (default)
    Serve,
    /// Identify a local photo once and print the recovered JSON
    Recognize {
        #[arg(short, long)]
        photo: String,
    },
    /// Show resolved configuration
    Status,
    /// Check config, prompt, sample photo and credentials
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carlens=info".into()),
        )
        .init();

    if dotenvy::dotenv().is_err() {
        warn!(".env file not found, using system environment");
    }

    let cli = Cli::parse();
    let config = Config::load(Path::new(&cli.config))?;

    match cli.command {
        Some(SubCommand::Status) => {
            println!("Model: {} via {}", config.vision.model, config.vision.endpoint);
            println!("Listen: {}:{}", config.server.host, config.server.port);
            println!("Prompt: {}", config.vision.prompt_path);
            println!("Sample photo: {}", config.reply.sample_photo_path);
            println!(
                "API key: {}",
                if config.vision.resolve_api_key().is_some() { "configured" } else { "MISSING" }
            );
            return Ok(());
        }
        Some(SubCommand::Doctor) => {
            return run_doctor(&config);
        }
        Some(SubCommand::Recognize { photo }) => {
            return oneshot::run_oneshot(&config, Path::new(&photo)).await;
        }
        _ => {} // Serve (default)
    }

    info!("🚗 carlens v{}", env!("CARGO_PKG_VERSION"));
    info!("Model: {} via {}", config.vision.model, config.vision.endpoint);
    if config.vision.resolve_api_key().is_none() {
        warn!("⚠️  no API key configured — /recognize will fail until OPENAI_API_KEY is set");
    }

    let state = AppState {
        vision: Arc::new(VisionClient::new(&config.vision)),
        config: Arc::new(config.clone()),
        started_at: chrono::Utc::now(),
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🌐 Listening on http://{}", addr);
    axum::serve(listener, router).await?;
    Ok(())
}

fn run_doctor(config: &Config) -> anyhow::Result<()> {
    println!("🩺 carlens Doctor\n");

    let prompt = Path::new(&config.vision.prompt_path);
    if prompt.exists() {
        let size = std::fs::metadata(prompt).map(|m| m.len()).unwrap_or(0);
        let status = if size > 10 { "✅" } else { "⚠️  (nearly empty)" };
        println!("{} Prompt: {} ({} bytes)", status, config.vision.prompt_path, size);
    } else {
        println!("❌ Prompt missing: {}", config.vision.prompt_path);
    }

    let photo = Path::new(&config.reply.sample_photo_path);
    if photo.exists() {
        println!("✅ Sample photo: {}", config.reply.sample_photo_path);
    } else {
        println!("❌ Sample photo missing: {}", config.reply.sample_photo_path);
    }

    if config.vision.resolve_api_key().is_some() {
        println!("✅ API key configured");
    } else {
        println!("❌ API key missing — set OPENAI_API_KEY or [vision] api_key");
    }

    println!("\n🧠 Model: {} via {}", config.vision.model, config.vision.endpoint);
    println!("   Timeout: {}s", config.vision.timeout_secs);
    println!("   Upload cap: {} bytes", config.server.max_upload_bytes);

    println!("\n✨ Doctor complete.");
    Ok(())
}
