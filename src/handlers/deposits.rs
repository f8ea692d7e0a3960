use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::db::models::Transaction;
use crate::error::AppError;
use crate::payments::GatewayOrder;
use crate::services::DepositCallback;

#[derive(Debug, Deserialize)]
pub struct InitiateDepositPayload {
    pub user_id: Uuid,
    pub amount: BigDecimal,
}

#[derive(Debug, Serialize)]
pub struct InitiateDepositResponse {
    pub order: GatewayOrder,
    pub transaction: Transaction,
}

#[derive(Debug, Deserialize)]
pub struct DepositCallbackPayload {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

pub async fn initiate(
    State(state): State<AppState>,
    Json(payload): Json<InitiateDepositPayload>,
) -> Result<impl IntoResponse, AppError> {
    let (order, transaction) = state
        .deposits
        .initiate(payload.user_id, payload.amount)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(InitiateDepositResponse { order, transaction }),
    ))
}

/// Signed gateway callback. Settlement is single-shot, so a replayed
/// callback gets a 400 instead of a second credit.
pub async fn callback(
    State(state): State<AppState>,
    Json(payload): Json<DepositCallbackPayload>,
) -> Result<impl IntoResponse, AppError> {
    let completed = state
        .deposits
        .confirm(DepositCallback {
            order_id: payload.order_id,
            payment_id: payload.payment_id,
            signature: payload.signature,
        })
        .await?;

    Ok(Json(completed))
}

/// Signed gateway failure callback: moves the pending deposit to failed.
pub async fn failure(
    State(state): State<AppState>,
    Json(payload): Json<DepositCallbackPayload>,
) -> Result<impl IntoResponse, AppError> {
    let failed = state
        .deposits
        .fail(DepositCallback {
            order_id: payload.order_id,
            payment_id: payload.payment_id,
            signature: payload.signature,
        })
        .await?;

    Ok(Json(failed))
}
