//! Airing Notifier: Binary Entrypoint
//! Serves the HTTP invocation surface and runs the daily fan-out in the background.

use std::sync::Arc;

use airing_notifier::config::NotifierConfig;
use airing_notifier::scheduler::SchedulerCfg;
use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    // Shuttle may already have installed a subscriber; this is then a no-op.
    airing_notifier::init_tracing();

    let cfg = NotifierConfig::load_default()?;
    let dry_run = std::env::var("NOTIFIER_DRY_RUN").is_ok_and(|v| v == "1");
    let engine = Arc::new(airing_notifier::build_engine(&cfg, dry_run)?);

    let router = airing_notifier::app(engine, SchedulerCfg::from(&cfg.schedule))?;

    Ok(router.into())
}
