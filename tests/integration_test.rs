//! End-to-end flows against a real Postgres instance.
//!
//! Run with a database available:
//!   TEST_DATABASE_URL=postgres://... cargo test -- --ignored

use bigdecimal::BigDecimal;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use serde_json::json;
use sha2::Sha256;
use sqlx::{PgPool, migrate::Migrator};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use upline_core::commission::CommissionService;
use upline_core::db::models::{Transaction, User};
use upline_core::db::queries;
use upline_core::domain::{
    TransactionStatus, TransactionType, UserStatus, generate_referral_code,
};
use upline_core::notify::Notifier;
use upline_core::payments::GatewayClient;
use upline_core::referral::{DownlineCache, ReferralGraphService};
use upline_core::services::{
    DepositService, SettingsCache, SettingsService, WithdrawalService,
};
use upline_core::{AppState, create_app};

const ADMIN_TOKEN: &str = "test-admin-token";
const GATEWAY_SECRET: &str = "test-gateway-secret";

async fn setup_test_app() -> (String, PgPool) {
    let database_url = std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .expect("TEST_DATABASE_URL must be set");

    let pool = PgPool::connect(&database_url).await.unwrap();
    let migrator = Migrator::new(Path::join(
        Path::new(env!("CARGO_MANIFEST_DIR")),
        "migrations",
    ))
    .await
    .unwrap();
    migrator.run(&pool).await.unwrap();

    let gateway = GatewayClient::new(
        "http://127.0.0.1:9".to_string(),
        "test-key".to_string(),
        GATEWAY_SECRET.to_string(),
    );
    let settings_cache = SettingsCache::start(pool.clone(), std::time::Duration::from_secs(60))
        .await
        .unwrap();
    let notifier = Arc::new(Notifier::new(None, None));
    let downline_cache = Arc::new(DownlineCache::default());
    let referrals = Arc::new(ReferralGraphService::new(pool.clone(), downline_cache));
    let commissions = CommissionService::new(pool.clone());
    let deposits = Arc::new(DepositService::new(
        pool.clone(),
        gateway,
        commissions,
        settings_cache.clone(),
        notifier.clone(),
    ));
    let withdrawals = Arc::new(WithdrawalService::new(
        pool.clone(),
        settings_cache.clone(),
        notifier,
    ));
    let settings = Arc::new(SettingsService::new(pool.clone(), settings_cache));

    let state = AppState {
        db: pool.clone(),
        referrals,
        deposits,
        withdrawals,
        settings,
        admin_api_token: ADMIN_TOKEN.to_string(),
        referral_base_url: "http://localhost:3000/register".to_string(),
    };
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let actual_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", actual_addr), pool)
}

/// Seed a sponsorless root user with a wallet, bypassing registration.
async fn seed_root(pool: &PgPool) -> User {
    let now = chrono::Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        name: "Root".to_string(),
        email: format!("root-{}@example.com", Uuid::new_v4()),
        phone: Some("+919876543210".to_string()),
        referral_code: generate_referral_code(),
        sponsor_id: None,
        direct_referrals: 0,
        total_team_size: 0,
        level_income: BigDecimal::from(0),
        sponsor_income: BigDecimal::from(0),
        profit_share: BigDecimal::from(0),
        is_admin: false,
        status: UserStatus::Active.as_str().to_string(),
        created_at: now,
        updated_at: now,
    };

    let mut tx = pool.begin().await.unwrap();
    let created = queries::insert_user(&mut tx, &user).await.unwrap();
    queries::insert_wallet(&mut tx, created.id).await.unwrap();
    tx.commit().await.unwrap();

    created
}

async fn register(
    client: &reqwest::Client,
    base_url: &str,
    sponsor_code: &str,
) -> serde_json::Value {
    let res = client
        .post(format!("{}/register", base_url))
        .json(&json!({
            "user_id": Uuid::new_v4(),
            "name": "Member",
            "email": format!("member-{}@example.com", Uuid::new_v4()),
            "phone": "+919812345678",
            "sponsor_referral_code": sponsor_code,
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

fn sign_callback(order_id: &str, payment_id: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(GATEWAY_SECRET.as_bytes()).unwrap();
    mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Record a pending gateway deposit directly, standing in for order creation.
async fn seed_pending_deposit(pool: &PgPool, user_id: Uuid, amount: &str) -> String {
    let order_id = format!("order_{}", Uuid::new_v4());
    let pending = Transaction::new(
        user_id,
        TransactionType::Deposit,
        BigDecimal::from_str(amount).unwrap(),
        TransactionStatus::Pending,
        "Deposit via payment gateway",
    )
    .with_gateway_order(order_id.clone());

    let mut tx = pool.begin().await.unwrap();
    queries::insert_transaction(&mut tx, &pending).await.unwrap();
    tx.commit().await.unwrap();

    order_id
}

#[tokio::test]
#[ignore]
async fn registration_chain_updates_team_counts() {
    let (base_url, pool) = setup_test_app().await;
    let client = reqwest::Client::new();

    let root = seed_root(&pool).await;
    let b = register(&client, &base_url, &root.referral_code).await;
    let b_code = b["referral_code"].as_str().unwrap();

    register(&client, &base_url, b_code).await;
    register(&client, &base_url, b_code).await;

    let res = client
        .get(format!("{}/users/{}", base_url, root.id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let profile: serde_json::Value = res.json().await.unwrap();
    assert_eq!(profile["direct_referrals"], 1);
    assert_eq!(profile["total_team_size"], 3);
    assert!(
        profile["referral_link"]
            .as_str()
            .unwrap()
            .contains(&root.referral_code)
    );

    let b_id = b["id"].as_str().unwrap();
    let res = client
        .get(format!("{}/users/{}/referrals", base_url, b_id))
        .send()
        .await
        .unwrap();
    let team: serde_json::Value = res.json().await.unwrap();
    assert_eq!(team["direct_referrals"], 2);
    assert_eq!(team["total_team_size"], 2);
    assert_eq!(team["members"].as_array().unwrap().len(), 2);
}

#[tokio::test]
#[ignore]
async fn registration_rejects_unknown_sponsor_code() {
    let (base_url, _pool) = setup_test_app().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/register", base_url))
        .json(&json!({
            "user_id": Uuid::new_v4(),
            "name": "Orphan",
            "email": "orphan@example.com",
            "sponsor_referral_code": "ZZZZZZZZZZZZZZZZ",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore]
async fn deposit_callback_credits_wallet_and_commissions() {
    let (base_url, pool) = setup_test_app().await;
    let client = reqwest::Client::new();

    let root = seed_root(&pool).await;
    let b = register(&client, &base_url, &root.referral_code).await;
    let b_id: Uuid = b["id"].as_str().unwrap().parse().unwrap();

    let order_id = seed_pending_deposit(&pool, b_id, "1000").await;
    let payment_id = "pay_test_1";

    let res = client
        .post(format!("{}/deposits/callback", base_url))
        .json(&json!({
            "order_id": order_id,
            "payment_id": payment_id,
            "signature": sign_callback(&order_id, payment_id),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let depositor_wallet = queries::get_wallet(&pool, b_id).await.unwrap().unwrap();
    assert_eq!(depositor_wallet.balance, BigDecimal::from_str("1000.00").unwrap());
    assert_eq!(
        depositor_wallet.total_invested,
        BigDecimal::from_str("1000.00").unwrap()
    );

    // Seeded defaults: 5% level-1 commission plus 2% sponsor commission.
    let sponsor_wallet = queries::get_wallet(&pool, root.id).await.unwrap().unwrap();
    assert_eq!(
        sponsor_wallet.level_income,
        BigDecimal::from_str("50.00").unwrap()
    );
    assert_eq!(
        sponsor_wallet.sponsor_income,
        BigDecimal::from_str("20.00").unwrap()
    );
    assert_eq!(sponsor_wallet.balance, BigDecimal::from_str("70.00").unwrap());

    // Replaying the callback must not credit twice.
    let res = client
        .post(format!("{}/deposits/callback", base_url))
        .json(&json!({
            "order_id": order_id,
            "payment_id": payment_id,
            "signature": sign_callback(&order_id, payment_id),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let depositor_wallet = queries::get_wallet(&pool, b_id).await.unwrap().unwrap();
    assert_eq!(depositor_wallet.balance, BigDecimal::from_str("1000.00").unwrap());
}

#[tokio::test]
#[ignore]
async fn bad_signature_does_not_block_later_settlement() {
    let (base_url, pool) = setup_test_app().await;
    let client = reqwest::Client::new();

    let root = seed_root(&pool).await;
    let order_id = seed_pending_deposit(&pool, root.id, "500").await;

    // A forged callback must be rejected without touching the pending row.
    let res = client
        .post(format!("{}/deposits/callback", base_url))
        .json(&json!({
            "order_id": order_id,
            "payment_id": "pay_bad",
            "signature": "deadbeef",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let wallet = queries::get_wallet(&pool, root.id).await.unwrap().unwrap();
    assert_eq!(wallet.balance, BigDecimal::from(0));

    // The genuine gateway callback still settles and credits.
    let res = client
        .post(format!("{}/deposits/callback", base_url))
        .json(&json!({
            "order_id": order_id,
            "payment_id": "pay_good",
            "signature": sign_callback(&order_id, "pay_good"),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let settled: serde_json::Value = res.json().await.unwrap();
    assert_eq!(settled["status"], "completed");

    let wallet = queries::get_wallet(&pool, root.id).await.unwrap().unwrap();
    assert_eq!(wallet.balance, BigDecimal::from_str("500.00").unwrap());
}

#[tokio::test]
#[ignore]
async fn signed_failure_callback_settles_to_failed() {
    let (base_url, pool) = setup_test_app().await;
    let client = reqwest::Client::new();

    let root = seed_root(&pool).await;
    let order_id = seed_pending_deposit(&pool, root.id, "500").await;

    // An unsigned failure report must be rejected.
    let res = client
        .post(format!("{}/deposits/callback/failure", base_url))
        .json(&json!({
            "order_id": order_id,
            "payment_id": "pay_fail",
            "signature": "deadbeef",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(format!("{}/deposits/callback/failure", base_url))
        .json(&json!({
            "order_id": order_id,
            "payment_id": "pay_fail",
            "signature": sign_callback(&order_id, "pay_fail"),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let failed: serde_json::Value = res.json().await.unwrap();
    assert_eq!(failed["status"], "failed");

    // A failed order can no longer be settled as a success.
    let res = client
        .post(format!("{}/deposits/callback", base_url))
        .json(&json!({
            "order_id": order_id,
            "payment_id": "pay_late",
            "signature": sign_callback(&order_id, "pay_late"),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let wallet = queries::get_wallet(&pool, root.id).await.unwrap().unwrap();
    assert_eq!(wallet.balance, BigDecimal::from(0));
}

#[tokio::test]
#[ignore]
async fn concurrent_registrations_keep_counts_consistent() {
    let (base_url, pool) = setup_test_app().await;

    let root = seed_root(&pool).await;
    let code = root.referral_code.clone();

    // Fire a burst of registrations under the same sponsor; the recompute
    // serialization must leave the persisted counts exact.
    let mut handles = Vec::new();
    for _ in 0..5 {
        let base_url = base_url.clone();
        let code = code.clone();
        handles.push(tokio::spawn(async move {
            let client = reqwest::Client::new();
            register(&client, &base_url, &code).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let persisted = queries::get_user(&pool, root.id).await.unwrap().unwrap();
    assert_eq!(persisted.direct_referrals, 5);
    assert_eq!(persisted.total_team_size, 5);
}

#[tokio::test]
#[ignore]
async fn withdrawal_reject_refunds_and_approve_settles() {
    let (base_url, pool) = setup_test_app().await;
    let client = reqwest::Client::new();

    let root = seed_root(&pool).await;

    // Fund the wallet through the deposit path.
    let order_id = seed_pending_deposit(&pool, root.id, "1000").await;
    let res = client
        .post(format!("{}/deposits/callback", base_url))
        .json(&json!({
            "order_id": order_id,
            "payment_id": "pay_fund",
            "signature": sign_callback(&order_id, "pay_fund"),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let withdrawal = json!({
        "user_id": root.id,
        "amount": "500",
        "account_name": "Root Holder",
        "account_number": "000111222333",
        "ifsc_code": "TEST0001234",
        "bank_name": "Test Bank",
    });

    // File, then reject: the debit must come back.
    let res = client
        .post(format!("{}/withdrawals", base_url))
        .json(&withdrawal)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let filed: serde_json::Value = res.json().await.unwrap();
    let request_id = filed["id"].as_str().unwrap();

    let wallet = queries::get_wallet(&pool, root.id).await.unwrap().unwrap();
    assert_eq!(wallet.balance, BigDecimal::from_str("500.00").unwrap());

    let res = client
        .post(format!("{}/admin/withdrawals/{}/reject", base_url, request_id))
        .header("Authorization", format!("Bearer {}", ADMIN_TOKEN))
        .json(&json!({ "admin_id": Uuid::new_v4(), "remarks": "bank details mismatch" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let wallet = queries::get_wallet(&pool, root.id).await.unwrap().unwrap();
    assert_eq!(wallet.balance, BigDecimal::from_str("1000.00").unwrap());

    // Rejecting again must fail: the transition is single-shot.
    let res = client
        .post(format!("{}/admin/withdrawals/{}/reject", base_url, request_id))
        .header("Authorization", format!("Bearer {}", ADMIN_TOKEN))
        .json(&json!({ "admin_id": Uuid::new_v4() }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // File again and approve: the debit sticks.
    let res = client
        .post(format!("{}/withdrawals", base_url))
        .json(&withdrawal)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let filed: serde_json::Value = res.json().await.unwrap();
    let request_id = filed["id"].as_str().unwrap();

    let res = client
        .post(format!("{}/admin/withdrawals/{}/approve", base_url, request_id))
        .header("Authorization", format!("Bearer {}", ADMIN_TOKEN))
        .json(&json!({ "admin_id": Uuid::new_v4(), "external_tx_id": "utr-12345" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let approved: serde_json::Value = res.json().await.unwrap();
    assert_eq!(approved["status"], "approved");
    assert_eq!(approved["external_tx_id"], "utr-12345");

    let wallet = queries::get_wallet(&pool, root.id).await.unwrap().unwrap();
    assert_eq!(wallet.balance, BigDecimal::from_str("500.00").unwrap());
}

#[tokio::test]
#[ignore]
async fn withdrawal_rejected_when_balance_insufficient() {
    let (base_url, pool) = setup_test_app().await;
    let client = reqwest::Client::new();

    let root = seed_root(&pool).await;

    let res = client
        .post(format!("{}/withdrawals", base_url))
        .json(&json!({
            "user_id": root.id,
            "amount": "500",
            "account_name": "Root Holder",
            "account_number": "000111222333",
            "ifsc_code": "TEST0001234",
            "bank_name": "Test Bank",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let wallet = queries::get_wallet(&pool, root.id).await.unwrap().unwrap();
    assert_eq!(wallet.balance, BigDecimal::from(0));
}

#[tokio::test]
#[ignore]
async fn admin_surface_requires_bearer_token() {
    let (base_url, _pool) = setup_test_app().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/admin/dashboard", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(format!("{}/admin/dashboard", base_url))
        .header("Authorization", format!("Bearer {}", ADMIN_TOKEN))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let dashboard: serde_json::Value = res.json().await.unwrap();
    assert!(dashboard["total_users"].as_i64().unwrap() >= 0);
    assert!(dashboard["system_balance"].is_string() || dashboard["system_balance"].is_number());
    assert!(dashboard["recent_users"].is_array());
    assert!(dashboard["recent_deposits"].is_array());
    assert!(dashboard["recent_withdrawals"].is_array());
}

#[tokio::test]
#[ignore]
async fn health_reports_database_status() {
    let (base_url, _pool) = setup_test_app().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"]["status"], "healthy");
    assert!(body["database"]["latency_ms"].as_u64().is_some());
    assert!(body["pool"]["size"].as_u64().is_some());
}
