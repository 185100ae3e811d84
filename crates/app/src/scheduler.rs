//! Monthly maintenance loop.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Datelike, TimeZone, Utc};
use engine::Engine;

use crate::settings::Scheduler;

/// First `run_day`/`run_hour` slot strictly after `now`.
fn next_run(now: DateTime<Utc>, run_day: u32, run_hour: u32) -> Option<DateTime<Utc>> {
    let slot = |year: i32, month: u32| {
        Utc.with_ymd_and_hms(year, month, run_day, run_hour, 0, 0)
            .single()
    };
    let this_month = slot(now.year(), now.month())?;
    if this_month > now {
        return Some(this_month);
    }
    if now.month() == 12 {
        slot(now.year() + 1, 1)
    } else {
        slot(now.year(), now.month() + 1)
    }
}

async fn tick(engine: &Engine, max_run: Duration) {
    let now = Utc::now();

    match engine
        .extend_recurring_periods(now, Instant::now() + max_run)
        .await
    {
        Ok(report) => tracing::info!(
            examined = report.examined,
            extended = report.extended,
            skipped = report.skipped,
            periods_created = report.periods_created,
            failed = report.failed,
            timed_out = report.timed_out,
            "scheduled extension finished"
        ),
        Err(err) => tracing::error!("scheduled extension failed: {err}"),
    }

    match engine.ensure_everything_else_budgets(now).await {
        Ok(recreated) => tracing::info!(recreated, "everything-else sweep finished"),
        Err(err) => tracing::error!("everything-else sweep failed: {err}"),
    }

    match engine.refresh_period_statuses(now).await {
        Ok(changed) => tracing::info!(changed, "period statuses refreshed"),
        Err(err) => tracing::error!("status refresh failed: {err}"),
    }
}

pub async fn run(engine: Arc<Engine>, settings: Scheduler) {
    let max_run = Duration::from_secs(settings.max_run_minutes * 60);
    loop {
        let now = Utc::now();
        let Some(at) = next_run(now, settings.run_day, settings.run_hour_utc) else {
            tracing::error!(
                run_day = settings.run_day,
                run_hour_utc = settings.run_hour_utc,
                "cannot compute the next scheduled run"
            );
            return;
        };
        tracing::info!("next scheduled run at {at}");
        tokio::time::sleep((at - now).to_std().unwrap_or_default()).await;
        tick(&engine, max_run).await;
    }
}
