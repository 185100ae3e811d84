//! User bootstrap endpoint

use api_types::user::UserRegistered;
use axum::{Extension, Json, extract::State};
use chrono::Utc;
use engine::Principal;

use crate::{ServerError, server::ServerState};

/// Registers the caller, creating their everything-else budget if missing.
pub async fn register(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
) -> Result<Json<UserRegistered>, ServerError> {
    let everything_else = state
        .engine
        .register_user(&principal.uid, Utc::now())
        .await?;

    Ok(Json(UserRegistered {
        user_id: principal.uid,
        everything_else_id: everything_else.id,
    }))
}
