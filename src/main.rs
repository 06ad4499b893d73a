use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use danmaku_session::config::EngineConfig;
use danmaku_session::db::pool::{create_pool, run_migrations};
use danmaku_session::engine::panel::CommentPanel;
use danmaku_session::replay::runner::Replay;
use danmaku_session::replay::transport::ReplayTransport;

/// Replay a scripted comment session and print every panel event as JSON.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "danmaku.toml")]
    config: String,

    /// JSON Lines script to replay. Reads stdin when omitted or `-`.
    #[arg(long)]
    script: Option<PathBuf>,

    /// Overrides `database.url` from the config file.
    #[arg(long)]
    database_url: Option<String>,

    /// Keep mute settings in memory only.
    #[arg(long)]
    no_persist: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the event stream.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = EngineConfig::load(&args.config).map_err(anyhow::Error::msg)?;
    if let Some(url) = args.database_url {
        config.database.url = url;
    }
    if args.no_persist {
        config.database.persist = false;
    }

    let pool = if config.database.persist {
        let pool = create_pool(&config.database.url)
            .await
            .context("failed to connect to database")?;
        run_migrations(&pool)
            .await
            .context("failed to run database migrations")?;
        Some(pool)
    } else {
        None
    };

    let transport = Arc::new(ReplayTransport::new());
    let panel = CommentPanel::new(transport.clone(), &config, pool);
    let mut replay = Replay::new(panel, transport, std::io::stdout().lock());

    let steps = match args.script.filter(|p| p.as_os_str() != "-") {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("failed to open script {}", path.display()))?;
            replay.run(file).await?
        }
        None => replay.run(tokio::io::stdin()).await?,
    };

    info!(steps, "done");
    Ok(())
}
