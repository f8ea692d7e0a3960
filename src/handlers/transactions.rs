use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::db::queries;
use crate::error::AppError;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    pub fn clamp(&self) -> (i64, i64) {
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

pub async fn get_wallet(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let wallet = queries::get_wallet(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("wallet for user {}", user_id)))?;

    Ok(Json(wallet))
}

pub async fn list_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let (limit, offset) = pagination.clamp();
    let transactions =
        queries::list_transactions_by_user(&state.db, user_id, limit, offset).await?;

    Ok(Json(transactions))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let tx = queries::get_transaction(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("transaction {}", id)))?;

    Ok(Json(tx))
}
