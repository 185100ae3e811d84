//! Period summary endpoints

use api_types::summary::{SummaryQuery, SummaryView};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use engine::{PeriodType, Principal, SummaryScope};

use crate::{ServerError, mapping::summary_view, server::ServerState};

fn parse_period_type(raw: &str) -> Result<PeriodType, ServerError> {
    PeriodType::try_from(raw).map_err(|_| ServerError::Generic(format!("invalid period type: {raw}")))
}

pub async fn get(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path((period_type, source_period_id)): Path<(String, String)>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<SummaryView>, ServerError> {
    let period_type = parse_period_type(&period_type)?;
    let summary = state
        .engine
        .get_period_summary(
            &principal,
            period_type,
            &source_period_id,
            query.include_entries.unwrap_or(true),
        )
        .await?;

    Ok(Json(summary_view(summary)))
}

/// Rebuilds the caller's summary from the stored periods.
pub async fn recalculate(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path((period_type, source_period_id)): Path<(String, String)>,
) -> Result<Json<SummaryView>, ServerError> {
    let period_type = parse_period_type(&period_type)?;
    let summary = state
        .engine
        .recalculate_period_summary(
            SummaryScope::User(principal.uid),
            period_type,
            &source_period_id,
        )
        .await?;

    Ok(Json(summary_view(summary)))
}
