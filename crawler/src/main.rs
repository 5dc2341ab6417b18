use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sitesearch_core::{SledStore, Store};
use sitesearch_crawler::{CrawlerConfig, Orchestrator};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "crawler")]
#[command(about = "Crawl the configured sites into the search index")]
struct Cli {
    /// JSON file with the site list and crawler settings
    #[arg(long, default_value = "./sites.json")]
    config: String,
    /// Index database directory
    #[arg(long, default_value = "./index")]
    db: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Re-index every configured site
    Crawl,
    /// Re-index the configured site owning URL, starting from URL
    Page {
        #[arg(long)]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let config = CrawlerConfig::from_json_file(&cli.config)?;
    let store = Arc::new(SledStore::open(&cli.db).with_context(|| format!("opening {}", cli.db))?);
    let orchestrator = Orchestrator::with_http(config, store.clone())?;

    match cli.command {
        Command::Crawl => {
            orchestrator.start()?;
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("interrupted");
                        orchestrator.stop().await?;
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(500)) => {
                        if !orchestrator.is_indexing_in_progress() {
                            break;
                        }
                    }
                }
            }
        }
        Command::Page { url } => {
            let indexed = orchestrator.try_index_single_page(&url).await?;
            tracing::info!(%url, indexed, "page run finished");
        }
    }

    for site in store.list_sites()? {
        eprintln!(
            "{} {} pages={} lemmas={}{}",
            site.status,
            site.url,
            store.count_pages(site.id)?,
            store.count_lemmas(site.id)?,
            site.last_error.as_deref().map(|e| format!(" error={e}")).unwrap_or_default()
        );
    }
    store.flush()?;
    Ok(())
}
