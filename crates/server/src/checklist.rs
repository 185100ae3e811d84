//! Budget period checklist endpoints

use api_types::period::{ChecklistItemNew, ChecklistItemUpdate, ChecklistItemView};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use engine::{ChecklistPatch, Money, Principal};

use crate::{ServerError, mapping::checklist_item_view, server::ServerState};

pub async fn add(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(period_id): Path<String>,
    Json(payload): Json<ChecklistItemNew>,
) -> Result<(StatusCode, Json<ChecklistItemView>), ServerError> {
    let item = state
        .engine
        .add_checklist_item(
            &principal,
            &period_id,
            &payload.name,
            Money::new(payload.expected_amount_minor),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(checklist_item_view(item))))
}

pub async fn update(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path((period_id, item_id)): Path<(String, String)>,
    Json(payload): Json<ChecklistItemUpdate>,
) -> Result<Json<ChecklistItemView>, ServerError> {
    let patch = ChecklistPatch {
        name: payload.name,
        expected_amount: payload.expected_amount_minor.map(Money::new),
        actual_amount: payload.actual_amount_minor.map(Money::new),
    };
    let item = state
        .engine
        .update_checklist_item(&principal, &period_id, &item_id, patch)
        .await?;

    Ok(Json(checklist_item_view(item)))
}

pub async fn toggle(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path((period_id, item_id)): Path<(String, String)>,
) -> Result<Json<ChecklistItemView>, ServerError> {
    let item = state
        .engine
        .toggle_checklist_item(&principal, &period_id, &item_id)
        .await?;

    Ok(Json(checklist_item_view(item)))
}

pub async fn delete(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path((period_id, item_id)): Path<(String, String)>,
) -> Result<StatusCode, ServerError> {
    state
        .engine
        .delete_checklist_item(&principal, &period_id, &item_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
