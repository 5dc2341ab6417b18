pub mod config;
pub mod fetch;
pub mod orchestrator;
pub mod scheduler;
pub mod scope;
pub mod visited;

pub use config::{CrawlerConfig, SiteConfig};
pub use fetch::{ContentKind, FetchError, FetchedPage, Fetcher, HttpFetcher};
pub use orchestrator::{Orchestrator, OrchestratorError, STOPPED_BY_USER};
pub use scheduler::{CrawlContext, CrawlScheduler, CrawlSummary, TaskOutcome};
pub use scope::{Scope, ScopeFilter};
pub use visited::VisitedSet;
