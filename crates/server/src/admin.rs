//! Operator endpoints: calendar generation, summary backfill, the period
//! extender and period totals recalculation. All of them require the admin
//! role.

use api_types::admin::{
    BackfillRequest, BackfillView, CalendarGenerate, CalendarGenerated, ExtendRequest,
    ExtensionView, TotalsRequest, TotalsView,
};
use axum::{Extension, Json, extract::State};
use chrono::Utc;
use engine::{EngineError, Principal, TotalsTarget};
use std::time::{Duration, Instant};

use crate::{ServerError, server::ServerState};

const DEFAULT_EXTENSION_BUDGET: Duration = Duration::from_secs(9 * 60);

pub async fn calendar(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Json(payload): Json<CalendarGenerate>,
) -> Result<Json<CalendarGenerated>, ServerError> {
    let periods = state
        .engine
        .generate_calendar(
            &principal,
            payload.year_start,
            payload.year_end,
            payload.reset.unwrap_or(false),
        )
        .await?;

    Ok(Json(CalendarGenerated { periods }))
}

pub async fn backfill(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Json(payload): Json<BackfillRequest>,
) -> Result<Json<BackfillView>, ServerError> {
    let report = state
        .engine
        .backfill_summaries(
            &principal,
            payload.dry_run.unwrap_or(false),
            payload.user_id.as_deref(),
        )
        .await?;

    Ok(Json(BackfillView {
        keys: report.keys,
        rebuilt: report.rebuilt,
        failed: report.failed,
        dry_run: report.dry_run,
    }))
}

/// Runs the extender once, on demand.
pub async fn extend(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Json(payload): Json<ExtendRequest>,
) -> Result<Json<ExtensionView>, ServerError> {
    if !principal.is_admin() {
        return Err(EngineError::Forbidden("admin role required".to_string()).into());
    }
    let budget = payload
        .max_run_seconds
        .map_or(DEFAULT_EXTENSION_BUDGET, Duration::from_secs);
    let report = state
        .engine
        .extend_recurring_periods(Utc::now(), Instant::now() + budget)
        .await?;

    Ok(Json(ExtensionView {
        examined: report.examined,
        extended: report.extended,
        skipped: report.skipped,
        periods_created: report.periods_created,
        failed: report.failed,
        timed_out: report.timed_out,
    }))
}

/// Rebuilds the running totals of one resource's periods, or of one period,
/// from the live transactions.
pub async fn totals(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Json(payload): Json<TotalsRequest>,
) -> Result<Json<TotalsView>, ServerError> {
    let target = match (payload.resource_id, payload.period_id) {
        (Some(resource_id), None) => TotalsTarget::Resource(resource_id),
        (None, Some(period_id)) => TotalsTarget::Period(period_id),
        _ => {
            return Err(EngineError::InvalidField(
                "exactly one of resource_id and period_id is required".to_string(),
            )
            .into());
        }
    };
    let report = state
        .engine
        .recalculate_period_totals(&principal, target)
        .await?;

    Ok(Json(TotalsView {
        periods: report.periods,
        corrected: report.corrected,
    }))
}
