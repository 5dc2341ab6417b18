use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use sitesearch_core::SledStore;
use sitesearch_crawler::{CrawlerConfig, Orchestrator};
use sitesearch_server::{build_app, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// JSON file with the site list and crawler settings
    #[arg(long, default_value = "./sites.json")]
    config: String,
    /// Index database directory
    #[arg(long, default_value = "./index")]
    db: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = CrawlerConfig::from_json_file(&args.config)?;
    let store = Arc::new(SledStore::open(&args.db).with_context(|| format!("opening {}", args.db))?);
    let orchestrator = Orchestrator::with_http(config, store)?;
    let state = AppState::new(orchestrator).with_admin_token(std::env::var("ADMIN_TOKEN").ok());
    let app: Router = build_app(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
