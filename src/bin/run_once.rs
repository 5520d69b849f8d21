//! One-shot fan-out for cron-style scheduling.
//! Exit code: 0 on success, 1 on a fatal run error, 2 when the ledger commit failed after sending.

use std::process::ExitCode;

use airing_notifier::config::NotifierConfig;
use airing_notifier::RunError;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    airing_notifier::init_tracing();

    let dry_run = std::env::var("NOTIFIER_DRY_RUN").is_ok_and(|v| v == "1");
    let engine = match NotifierConfig::load_default()
        .and_then(|cfg| airing_notifier::build_engine(&cfg, dry_run))
    {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("startup failed: {e:#}");
            return ExitCode::from(1);
        }
    };

    match engine.run().await {
        Ok(report) => {
            match serde_json::to_string(&report) {
                Ok(s) => println!("{s}"),
                Err(e) => tracing::warn!("report not serializable: {e}"),
            }
            ExitCode::SUCCESS
        }
        Err(e @ RunError::LedgerWrite { .. }) => {
            tracing::error!(stage = e.stage(), "{e:#}");
            ExitCode::from(2)
        }
        Err(e) => {
            tracing::error!(stage = e.stage(), "{e:#}");
            ExitCode::from(1)
        }
    }
}
