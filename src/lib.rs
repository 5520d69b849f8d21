// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod notify;
pub mod scheduler;
pub mod subscribers;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::catalog::{AiringItem, CatalogFetcher, PagedCatalog};
pub use crate::engine::{FanOutEngine, RunReport};
pub use crate::error::RunError;
pub use crate::ledger::{NotificationLedger, NotifiedSet};
pub use crate::notify::{Digest, Notifier};
pub use crate::subscribers::{Subscriber, SubscriberStore};

use std::sync::Arc;

use axum::Router;

use crate::api::AppState;
use crate::catalog::tmdb::TmdbPageSource;
use crate::config::NotifierConfig;
use crate::ledger::file::FileLedger;
use crate::metrics::Metrics;
use crate::notify::{email::EmailNotifier, LogNotifier};
use crate::scheduler::{spawn_scheduler, SchedulerCfg};
use crate::subscribers::file::FileSubscriberStore;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Wire the production collaborators described by `cfg` into an engine.
/// With `dry_run` the digests are logged instead of emailed.
pub fn build_engine(cfg: &NotifierConfig, dry_run: bool) -> anyhow::Result<FanOutEngine> {
    let catalog = PagedCatalog::new(TmdbPageSource::from_config(&cfg.catalog));
    let ledger = FileLedger::new(cfg.storage.ledger_path.clone());
    let subscribers = FileSubscriberStore::new(cfg.storage.subscribers_path.clone());
    let notifier: Arc<dyn Notifier> = if dry_run {
        Arc::new(LogNotifier)
    } else {
        Arc::new(EmailNotifier::from_config(&cfg.email)?)
    };

    // Safe diagnostics: never the key itself
    tracing::info!(
        catalog = %cfg.catalog.base_url,
        key_len = cfg.catalog.api_key.len(),
        ledger = %cfg.storage.ledger_path.display(),
        subscribers = %cfg.storage.subscribers_path.display(),
        ledger_kind = ledger.name(),
        subscriber_kind = subscribers.name(),
        notifier = notifier.name(),
        "engine wired"
    );

    Ok(FanOutEngine::new(
        Arc::new(catalog),
        Arc::new(ledger),
        Arc::new(subscribers),
        notifier,
    )
    .with_max_concurrent_dispatches(cfg.max_concurrent_dispatches))
}

/// Install the Prometheus recorder, start the scheduler, and return the full HTTP surface.
/// The recorder must exist before the first scheduled run describes its metrics.
pub fn app(engine: Arc<FanOutEngine>, schedule: SchedulerCfg) -> anyhow::Result<Router> {
    let metrics = Metrics::init()?;
    spawn_scheduler(Arc::clone(&engine), schedule);
    Ok(api::router(AppState::new(engine)).merge(metrics.router()))
}

/// Install a tracing subscriber. `LOG_FORMAT=json` switches to JSON lines.
/// No-op if one is already installed.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("airing_notifier=info,scheduler=info,run_once=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}
