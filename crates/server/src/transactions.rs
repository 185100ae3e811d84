//! Transactions API endpoints

use api_types::transaction::{TransactionNew, TransactionUpdate, TransactionView};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use engine::{Money, NewTransactionCmd, Principal, UpdateTransactionCmd};
use uuid::Uuid;

use crate::{
    ServerError,
    mapping::{currency_from_api, split_from_api, to_utc, transaction_view},
    server::ServerState,
};

pub async fn create(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Json(payload): Json<TransactionNew>,
) -> Result<(StatusCode, Json<TransactionView>), ServerError> {
    let mut cmd = NewTransactionCmd::new(
        to_utc(payload.occurred_at),
        Money::new(payload.amount_minor),
    );
    if let Some(currency) = payload.currency {
        cmd = cmd.currency(currency_from_api(currency));
    }
    if let Some(description) = payload.description {
        cmd = cmd.description(description);
    }
    if let Some(merchant) = payload.merchant {
        cmd = cmd.merchant(merchant);
    }
    if let Some(group_id) = payload.group_id {
        cmd = cmd.group(group_id);
    }
    for split in payload.splits.unwrap_or_default() {
        cmd = cmd.split(split_from_api(split)?);
    }

    let tx = state.engine.create_transaction(&principal, cmd).await?;

    Ok((StatusCode::CREATED, Json(transaction_view(tx))))
}

pub async fn get(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransactionView>, ServerError> {
    let tx = state.engine.transaction(&principal, id).await?;
    Ok(Json(transaction_view(tx)))
}

pub async fn update(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransactionUpdate>,
) -> Result<Json<TransactionView>, ServerError> {
    let splits = payload
        .splits
        .map(|splits| {
            splits
                .into_iter()
                .map(split_from_api)
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;
    let cmd = UpdateTransactionCmd {
        occurred_at: payload.occurred_at.map(to_utc),
        amount: payload.amount_minor.map(Money::new),
        description: payload.description,
        merchant: payload.merchant,
        splits,
    };

    let tx = state
        .engine
        .update_transaction(&principal, id, cmd)
        .await?;
    Ok(Json(transaction_view(tx)))
}

/// Soft-deletes a transaction and reverses its effects.
pub async fn delete(
    Extension(principal): Extension<Principal>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServerError> {
    state.engine.delete_transaction(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
