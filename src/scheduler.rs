// src/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::ScheduleConfig;
use crate::engine::FanOutEngine;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub interval_secs: u64,
    /// Fire once immediately instead of waiting a full interval.
    pub run_on_start: bool,
}

impl From<&ScheduleConfig> for SchedulerCfg {
    fn from(c: &ScheduleConfig) -> Self {
        Self {
            interval_secs: c.interval_secs.max(1),
            run_on_start: c.run_on_start,
        }
    }
}

/// Spawn the periodic fan-out. A failed run is logged; the next tick still fires.
pub fn spawn_scheduler(engine: Arc<FanOutEngine>, cfg: SchedulerCfg) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs(cfg.interval_secs.max(1));
        let mut ticker = if cfg.run_on_start {
            tokio::time::interval(period)
        } else {
            tokio::time::interval_at(tokio::time::Instant::now() + period, period)
        };
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match engine.run().await {
                Ok(report) => tracing::info!(
                    target: "scheduler",
                    sent = report.sent_count,
                    failed = report.failed_count,
                    candidates = report.candidate_count,
                    "scheduled fan-out tick"
                ),
                Err(e) => tracing::warn!(
                    target: "scheduler",
                    stage = e.stage(),
                    error = %e,
                    "scheduled fan-out tick failed"
                ),
            }
        }
    })
}
