use clap::Parser;
use sqlx::migrate::Migrator;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::prelude::*;

use upline_core::cli::{Cli, Commands, DbCommands};
use upline_core::commission::CommissionService;
use upline_core::config::Config;
use upline_core::notify::Notifier;
use upline_core::payments::GatewayClient;
use upline_core::referral::{DownlineCache, ReferralGraphService};
use upline_core::services::settings::SETTINGS_REFRESH_INTERVAL;
use upline_core::services::{
    DepositService, SettingsCache, SettingsService, WithdrawalService,
};
use upline_core::{AppState, create_app, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        None | Some(Commands::Serve) => serve(config).await,
        Some(Commands::Db(DbCommands::Migrate)) => {
            upline_core::cli::handle_db_migrate(&config).await
        }
        Some(Commands::SeedAdmin { name, email, phone }) => {
            upline_core::cli::handle_seed_admin(&config, &name, &email, phone.as_deref()).await
        }
        Some(Commands::Config) => upline_core::cli::handle_config_validate(&config),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config).await?;

    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("Database migrations completed");

    let gateway = GatewayClient::new(
        config.payment_gateway_url.clone(),
        config.payment_key_id.clone(),
        config.payment_key_secret.clone(),
    );
    tracing::info!("Payment gateway client initialized with URL: {}", config.payment_gateway_url);

    let settings_cache = SettingsCache::start(pool.clone(), SETTINGS_REFRESH_INTERVAL)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load system settings: {}", e))?;
    let notifier = Arc::new(Notifier::new(
        config.email_webhook_url.clone(),
        config.sms_webhook_url.clone(),
    ));

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
        db: pool,
        referrals,
        deposits,
        withdrawals,
        settings,
        admin_api_token: config.admin_api_token.clone(),
        referral_base_url: config.referral_base_url.clone(),
    };
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
