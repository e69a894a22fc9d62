use std::future::Future;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use gn_core::{Error, Result};
use tracing::{error, info, warn};

use crate::batch::RunSummary;

/// Parse a cron expression. Standard 5-field expressions get a leading
/// seconds field of `0`; 6 and 7 field forms are used as given.
pub fn parse_schedule(expression: &str) -> Result<Schedule> {
    let expression = expression.trim();
    let normalized = match expression.split_whitespace().count() {
        5 => format!("0 {expression}"),
        6 | 7 => expression.to_string(),
        n => {
            return Err(Error::config_key(
                "PROCESSOR_CRON_SCHEDULE",
                format!("expected 5, 6 or 7 fields, got {n} in {expression:?}"),
            ))
        }
    };
    Schedule::from_str(&normalized).map_err(|e| {
        Error::config_key("PROCESSOR_CRON_SCHEDULE", format!("invalid cron expression {expression:?}: {e}"))
    })
}

pub fn next_run(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

async fn run_once<F, Fut>(job: &mut F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RunSummary>>,
{
    info!("🚀 Starting post-processing run");
    match job().await {
        Ok(summary) => info!("✅ Post-processing run finished: {}", summary),
        Err(e) => error!("❌ Post-processing run failed: {}", e),
    }
}

/// Run `job` at every fire time of `schedule` until `shutdown` resolves.
/// A failed run is logged and the next one is still scheduled. Shutdown also
/// interrupts a run in progress; its unfinished articles stay unprocessed.
pub async fn run_scheduled<F, Fut, S>(schedule: &Schedule, run_now: bool, mut job: F, shutdown: S) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RunSummary>>,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    if run_now {
        tokio::select! {
            _ = run_once(&mut job) => {}
            _ = &mut shutdown => {
                info!("🛑 Shutdown requested during run, leaving scheduler");
                return Ok(());
            }
        }
    }

    loop {
        let now = Utc::now();
        let Some(next) = next_run(schedule, now) else {
            warn!("Cron schedule has no upcoming fire times; stopping");
            return Ok(());
        };
        let wait = (next - now).to_std().unwrap_or_default();
        info!("⏰ Next run scheduled at {}", next);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = &mut shutdown => {
                info!("🛑 Shutdown requested, leaving scheduler");
                return Ok(());
            }
        }

        tokio::select! {
            _ = run_once(&mut job) => {}
            _ = &mut shutdown => {
                info!("🛑 Shutdown requested during run, leaving scheduler");
                return Ok(());
            }
        }
    }
}
