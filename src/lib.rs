pub mod cli;
pub mod commission;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod notify;
pub mod payments;
pub mod referral;
pub mod services;
pub mod validation;

use axum::{
    Router,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::referral::ReferralGraphService;
use crate::services::{DepositService, SettingsService, WithdrawalService};

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub referrals: Arc<ReferralGraphService>,
    pub deposits: Arc<DepositService>,
    pub withdrawals: Arc<WithdrawalService>,
    pub settings: Arc<SettingsService>,
    pub admin_api_token: String,
    pub referral_base_url: String,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/register", post(handlers::register::register))
        .route("/users/:id", get(handlers::register::get_profile))
        .route("/users/:id/referrals", get(handlers::referrals::list_direct))
        .route("/users/:id/team", get(handlers::referrals::list_team))
        .route("/users/:id/wallet", get(handlers::transactions::get_wallet))
        .route(
            "/users/:id/transactions",
            get(handlers::transactions::list_by_user),
        )
        .route(
            "/users/:id/withdrawals",
            get(handlers::withdrawals::list_by_user),
        )
        .route("/transactions/:id", get(handlers::transactions::get_transaction))
        .route("/deposits", post(handlers::deposits::initiate))
        .route("/deposits/callback", post(handlers::deposits::callback))
        .route(
            "/deposits/callback/failure",
            post(handlers::deposits::failure),
        )
        .route("/withdrawals", post(handlers::withdrawals::request))
        .route("/admin/dashboard", get(handlers::admin::dashboard))
        .route("/admin/users", get(handlers::admin::list_users))
        .route("/admin/users/:id/status", put(handlers::admin::set_user_status))
        .route(
            "/admin/users/:id/recompute-team",
            post(handlers::admin::recompute_team),
        )
        .route(
            "/admin/transactions",
            get(handlers::admin::recent_transactions),
        )
        .route("/admin/withdrawals", get(handlers::admin::list_withdrawals))
        .route("/admin/withdrawals/:id", get(handlers::admin::get_withdrawal))
        .route(
            "/admin/withdrawals/:id/approve",
            post(handlers::admin::approve_withdrawal),
        )
        .route(
            "/admin/withdrawals/:id/reject",
            post(handlers::admin::reject_withdrawal),
        )
        .route(
            "/admin/settings",
            get(handlers::admin::get_settings).put(handlers::admin::update_settings),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
