//! Recurring resource and resource period endpoints

use api_types::{
    period::{AllocationUpdate, PeriodList, PeriodView},
    resource::{
        DurationChanged, DurationOperation as ApiOperation, DurationUpdate, ResourceKind,
        ResourceNew, ResourceUpdate, ResourceView,
    },
};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use engine::{Money, NewResourceCmd, Principal, ResourceDetails, UpdateResourceCmd};

use crate::{
    ServerError,
    mapping::{currency_from_api, frequency_from_api, period_view, resource_view, to_utc},
    server::ServerState,
};

fn details_from_api(payload: &ResourceNew) -> ResourceDetails {
    match payload.kind {
        ResourceKind::Budget => ResourceDetails::Budget {
            category_ids: payload.category_ids.clone().unwrap_or_default(),
            is_system_everything_else: false,
        },
        ResourceKind::Outflow => ResourceDetails::Outflow {
            merchant: payload.merchant.clone(),
            due_day: payload.due_day,
            is_essential: payload.is_essential.unwrap_or(false),
        },
        ResourceKind::Inflow => ResourceDetails::Inflow {
            payer: payload.payer.clone(),
            is_regular_salary: payload.is_regular_salary.unwrap_or(false),
        },
    }
}

pub async fn list(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
) -> Result<Json<Vec<ResourceView>>, ServerError> {
    let resources = state.engine.resources(&principal).await?;
    Ok(Json(resources.into_iter().map(resource_view).collect()))
}

/// Creates a resource and projects it over the rolling window.
pub async fn create(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Json(payload): Json<ResourceNew>,
) -> Result<(StatusCode, Json<ResourceView>), ServerError> {
    let details = details_from_api(&payload);
    let mut cmd = NewResourceCmd::new(
        payload.name,
        Money::new(payload.amount_minor),
        frequency_from_api(payload.frequency),
        details,
    )
    .private(payload.is_private.unwrap_or(false));
    if let Some(currency) = payload.currency {
        cmd = cmd.currency(currency_from_api(currency));
    }
    if let Some(group_id) = payload.group_id {
        cmd = cmd.group(group_id);
    }
    if let Some(start) = payload.start_date {
        cmd = cmd.start_date(to_utc(start));
    }
    if let Some(period) = payload.selected_start_period {
        cmd = cmd.selected_start_period(period);
    }
    if let Some(end) = payload.end_date {
        cmd = cmd.end_date(to_utc(end));
    }

    let resource = state
        .engine
        .create_recurring_resource(&principal, cmd, Utc::now())
        .await?;

    Ok((StatusCode::CREATED, Json(resource_view(resource))))
}

pub async fn get(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<Json<ResourceView>, ServerError> {
    let resource = state.engine.resource(&principal, &id).await?;
    Ok(Json(resource_view(resource)))
}

pub async fn update(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(payload): Json<ResourceUpdate>,
) -> Result<Json<ResourceView>, ServerError> {
    let cmd = UpdateResourceCmd {
        name: payload.name,
        amount: payload.amount_minor.map(Money::new),
        category_ids: payload.category_ids,
        merchant: payload.merchant,
        due_day: payload.due_day,
        is_essential: payload.is_essential,
        is_active: payload.is_active,
    };
    let resource = state
        .engine
        .update_recurring_resource(&principal, &id, cmd)
        .await?;

    Ok(Json(resource_view(resource)))
}

pub async fn delete(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServerError> {
    state
        .engine
        .delete_recurring_resource(&principal, &id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn periods(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<Json<PeriodList>, ServerError> {
    let periods = state.engine.resource_periods(&principal, &id).await?;
    Ok(Json(PeriodList {
        periods: periods.into_iter().map(period_view).collect(),
    }))
}

/// Extends or shortens a limited budget.
pub async fn duration(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(payload): Json<DurationUpdate>,
) -> Result<Json<DurationChanged>, ServerError> {
    let operation = match payload.operation {
        ApiOperation::Extend => engine::DurationOperation::Extend,
        ApiOperation::Shorten => engine::DurationOperation::Shorten,
    };
    let change = state
        .engine
        .update_budget_duration(
            &principal,
            &id,
            to_utc(payload.new_end_date),
            operation,
            Utc::now(),
        )
        .await?;

    Ok(Json(DurationChanged {
        periods_affected: change.periods_affected,
        new_end_date: change.new_end_date,
        operation_details: change.operation_details,
    }))
}

pub async fn period(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<Json<PeriodView>, ServerError> {
    let period = state.engine.resource_period(&principal, &id).await?;
    Ok(Json(period_view(period)))
}

/// Overrides the allocation of a single period.
pub async fn allocation(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(payload): Json<AllocationUpdate>,
) -> Result<Json<PeriodView>, ServerError> {
    let period = state
        .engine
        .set_period_allocation(&principal, &id, Money::new(payload.allocated_minor))
        .await?;
    Ok(Json(period_view(period)))
}
