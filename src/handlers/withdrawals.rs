use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use bigdecimal::BigDecimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::db::queries;
use crate::error::AppError;
use crate::services::BankAccount;

#[derive(Debug, Deserialize)]
pub struct WithdrawalPayload {
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub account_name: String,
    pub account_number: String,
    pub ifsc_code: String,
    pub bank_name: String,
}

pub async fn request(
    State(state): State<AppState>,
    Json(payload): Json<WithdrawalPayload>,
) -> Result<impl IntoResponse, AppError> {
    let filed = state
        .withdrawals
        .request(
            payload.user_id,
            payload.amount,
            BankAccount {
                account_name: payload.account_name,
                account_number: payload.account_number,
                ifsc_code: payload.ifsc_code,
                bank_name: payload.bank_name,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(filed)))
}

pub async fn list_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let requests = queries::list_withdrawals_by_user(&state.db, user_id).await?;
    Ok(Json(requests))
}
