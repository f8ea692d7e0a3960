use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::db::models::{CommissionTier, SystemSettings};
use crate::db::queries;
use crate::domain::{TransactionType, UserStatus};
use crate::error::AppError;
use crate::handlers::require_admin;
use crate::handlers::transactions::Pagination;

const DASHBOARD_FEED_LIMIT: i64 = 5;

#[derive(Debug, serde::Serialize)]
pub struct DashboardResponse {
    #[serde(flatten)]
    pub totals: crate::db::models::DashboardTotals,
    pub recent_users: Vec<crate::db::models::User>,
    pub recent_deposits: Vec<crate::db::models::Transaction>,
    pub recent_withdrawals: Vec<crate::db::models::WithdrawalRequest>,
}

/// Totals plus the latest activity feeds, in one payload.
pub async fn dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &headers)?;

    let totals = queries::dashboard_totals(&state.db).await?;
    let recent_users = queries::list_users(&state.db, DASHBOARD_FEED_LIMIT, 0).await?;
    let recent_deposits = queries::recent_transactions_of_type(
        &state.db,
        TransactionType::Deposit,
        DASHBOARD_FEED_LIMIT,
    )
    .await?;
    let recent_withdrawals =
        queries::list_all_withdrawals(&state.db, DASHBOARD_FEED_LIMIT, 0).await?;

    Ok(Json(DashboardResponse {
        totals,
        recent_users,
        recent_deposits,
        recent_withdrawals,
    }))
}

pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &headers)?;
    let (limit, offset) = pagination.clamp();
    let users = queries::list_users(&state.db, limit, offset).await?;

    Ok(Json(users))
}

#[derive(Debug, Deserialize)]
pub struct StatusPayload {
    pub status: UserStatus,
}

pub async fn set_user_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusPayload>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &headers)?;
    let updated = queries::update_user_status(&state.db, id, payload.status.as_str())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {}", id)))?;

    tracing::info!("user {} status set to {}", id, payload.status.as_str());
    Ok(Json(updated))
}

/// Rebuild the persisted team counts for a user and their sponsor chain.
/// Registration keeps counts current; this is the manual repair hook.
pub async fn recompute_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &headers)?;
    let total = state.referrals.recompute_team_size(id).await?;

    Ok(Json(serde_json::json!({ "user_id": id, "total_team_size": total })))
}

#[derive(Debug, Deserialize)]
pub struct RecentTransactionsQuery {
    pub tx_type: TransactionType,
    pub limit: Option<i64>,
}

/// Latest ledger activity of one type, for the dashboard feed.
pub async fn recent_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<RecentTransactionsQuery>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &headers)?;
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let transactions =
        queries::recent_transactions_of_type(&state.db, query.tx_type, limit).await?;

    Ok(Json(transactions))
}

pub async fn get_withdrawal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &headers)?;
    let request = queries::get_withdrawal_request(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("withdrawal request {}", id)))?;

    Ok(Json(request))
}

pub async fn list_withdrawals(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &headers)?;
    let (limit, offset) = pagination.clamp();
    let requests = queries::list_all_withdrawals(&state.db, limit, offset).await?;

    Ok(Json(requests))
}

#[derive(Debug, Deserialize)]
pub struct ApprovePayload {
    pub admin_id: Uuid,
    pub remarks: Option<String>,
    pub external_tx_id: Option<String>,
}

pub async fn approve_withdrawal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<ApprovePayload>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &headers)?;
    let approved = state
        .withdrawals
        .approve(id, payload.admin_id, payload.remarks, payload.external_tx_id)
        .await?;

    Ok(Json(approved))
}

#[derive(Debug, Deserialize)]
pub struct RejectPayload {
    pub admin_id: Uuid,
    pub remarks: Option<String>,
}

pub async fn reject_withdrawal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<RejectPayload>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &headers)?;
    let rejected = state
        .withdrawals
        .reject(id, payload.admin_id, payload.remarks)
        .await?;

    Ok(Json(rejected))
}

pub async fn get_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &headers)?;
    let snapshot = state.settings.current();

    Ok(Json(snapshot.as_ref().clone()))
}

#[derive(Debug, Deserialize)]
pub struct SettingsPayload {
    pub sponsor_commission_percentage: bigdecimal::BigDecimal,
    pub profit_share_percentage: bigdecimal::BigDecimal,
    pub min_deposit_amount: bigdecimal::BigDecimal,
    pub min_withdrawal_amount: bigdecimal::BigDecimal,
    pub max_withdrawal_amount: bigdecimal::BigDecimal,
    pub admin_account_name: String,
    pub admin_account_number: String,
    pub admin_ifsc_code: String,
    pub admin_bank_name: String,
    pub profit_pool_user_id: Option<Uuid>,
    pub tiers: Vec<CommissionTier>,
}

pub async fn update_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SettingsPayload>,
) -> Result<impl IntoResponse, AppError> {
    require_admin(&state, &headers)?;

    let settings = SystemSettings {
        sponsor_commission_percentage: payload.sponsor_commission_percentage,
        profit_share_percentage: payload.profit_share_percentage,
        min_deposit_amount: payload.min_deposit_amount,
        min_withdrawal_amount: payload.min_withdrawal_amount,
        max_withdrawal_amount: payload.max_withdrawal_amount,
        admin_account_name: payload.admin_account_name,
        admin_account_number: payload.admin_account_number,
        admin_ifsc_code: payload.admin_ifsc_code,
        admin_bank_name: payload.admin_bank_name,
        profit_pool_user_id: payload.profit_pool_user_id,
        updated_at: chrono::Utc::now(),
    };

    let snapshot = state.settings.update(settings, payload.tiers).await?;

    Ok(Json(snapshot))
}
