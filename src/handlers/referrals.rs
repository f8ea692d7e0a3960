use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Serialize;
use uuid::Uuid;

use crate::AppState;
use crate::db::models::User;
use crate::db::queries;
use crate::error::AppError;

#[derive(Debug, Serialize)]
pub struct TeamMember {
    pub id: Uuid,
    pub name: String,
    pub referral_code: String,
    pub direct_referrals: i64,
    pub total_team_size: i64,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct TeamResponse {
    pub direct_referrals: i64,
    pub total_team_size: i64,
    pub members: Vec<TeamMember>,
}

impl From<User> for TeamMember {
    fn from(user: User) -> Self {
        TeamMember {
            id: user.id,
            name: user.name,
            referral_code: user.referral_code,
            direct_referrals: user.direct_referrals,
            total_team_size: user.total_team_size,
            status: user.status,
        }
    }
}

/// Direct referrals only, annotated with each member's persisted counts.
pub async fn list_direct(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, id).await?;
    let members = state.referrals.direct_downline(user.id).await?;

    Ok(Json(TeamResponse {
        direct_referrals: user.direct_referrals,
        total_team_size: user.total_team_size,
        members: members.into_iter().map(TeamMember::from).collect(),
    }))
}

/// Full transitive downline.
pub async fn list_team(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, id).await?;
    let members = state.referrals.all_downline(user.id).await?;

    Ok(Json(TeamResponse {
        direct_referrals: user.direct_referrals,
        total_team_size: user.total_team_size,
        members: members.into_iter().map(TeamMember::from).collect(),
    }))
}

async fn require_user(state: &AppState, id: Uuid) -> Result<User, AppError> {
    queries::get_user(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {}", id)))
}
