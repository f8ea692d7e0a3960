use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::db::{models::User, queries};
use crate::error::AppError;
use crate::referral::graph::RegistrationInput;

#[derive(Debug, Deserialize)]
pub struct RegisterPayload {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub sponsor_referral_code: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub user: User,
    pub referral_link: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .referrals
        .register(RegistrationInput {
            user_id: payload.user_id,
            name: payload.name,
            email: payload.email,
            phone: payload.phone,
            sponsor_referral_code: payload.sponsor_referral_code,
        })
        .await?;

    let response = profile_response(&state, user);
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let user = queries::get_user(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {}", id)))?;

    Ok(Json(profile_response(&state, user)))
}

fn profile_response(state: &AppState, user: User) -> ProfileResponse {
    let referral_link = format!(
        "{}?ref={}",
        state.referral_base_url.trim_end_matches('/'),
        user.referral_code
    );

    ProfileResponse {
        user,
        referral_link,
    }
}
