use arc_swap::ArcSwap;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::db::models::{CommissionTier, SettingsSnapshot, SystemSettings};
use crate::db::queries;
use crate::error::AppError;
use crate::validation;

pub const SETTINGS_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Lock-free handle to the current settings snapshot.
///
/// Deposit validation and commission planning read settings on every
/// request, so the snapshot is swapped atomically: a refresh in flight
/// never blocks a reader, and a single request always sees one consistent
/// settings+tiers pair.
pub struct SettingsCache {
    inner: ArcSwap<SettingsSnapshot>,
}

impl SettingsCache {
    /// Load the initial snapshot and spawn the background refresher.
    pub async fn start(pool: PgPool, refresh_interval: Duration) -> Result<Arc<Self>, AppError> {
        let snapshot = Self::fetch(&pool).await?;
        let cache = Arc::new(SettingsCache {
            inner: ArcSwap::from_pointee(snapshot),
        });

        let cache_clone = cache.clone();
        let pool_clone = pool.clone();
        tokio::spawn(async move {
            loop {
                sleep(refresh_interval).await;
                match Self::fetch(&pool_clone).await {
                    Ok(snapshot) => cache_clone.inner.store(Arc::new(snapshot)),
                    Err(err) => {
                        tracing::warn!("settings refresh failed, keeping last snapshot: {}", err)
                    }
                }
            }
        });

        Ok(cache)
    }

    pub fn get(&self) -> Arc<SettingsSnapshot> {
        self.inner.load_full()
    }

    pub async fn reload_once(&self, pool: &PgPool) -> Result<(), AppError> {
        let snapshot = Self::fetch(pool).await?;
        self.inner.store(Arc::new(snapshot));
        Ok(())
    }

    async fn fetch(pool: &PgPool) -> Result<SettingsSnapshot, AppError> {
        let settings = queries::get_settings(pool).await?.ok_or_else(|| {
            AppError::Internal("system settings row is missing; run migrations".to_string())
        })?;
        let tiers = queries::get_commission_tiers(pool).await?;

        Ok(SettingsSnapshot { settings, tiers })
    }
}

pub struct SettingsService {
    pool: PgPool,
    cache: Arc<SettingsCache>,
}

impl SettingsService {
    pub fn new(pool: PgPool, cache: Arc<SettingsCache>) -> Self {
        Self { pool, cache }
    }

    pub fn current(&self) -> Arc<SettingsSnapshot> {
        self.cache.get()
    }

    /// Replace the settings row and the full tier list in one transaction,
    /// then refresh the cache so the new values take effect immediately.
    pub async fn update(
        &self,
        settings: SystemSettings,
        tiers: Vec<CommissionTier>,
    ) -> Result<SettingsSnapshot, AppError> {
        validation::validate_percentage(
            "sponsor_commission_percentage",
            &settings.sponsor_commission_percentage,
        )?;
        validation::validate_percentage(
            "profit_share_percentage",
            &settings.profit_share_percentage,
        )?;
        validation::validate_positive_amount(&settings.min_deposit_amount)?;
        validation::validate_positive_amount(&settings.min_withdrawal_amount)?;

        if settings.max_withdrawal_amount < settings.min_withdrawal_amount {
            return Err(AppError::Validation(
                "max_withdrawal_amount must not be below min_withdrawal_amount".to_string(),
            ));
        }

        let mut sorted = tiers;
        sorted.sort_by_key(|t| t.level);
        for (i, tier) in sorted.iter().enumerate() {
            if tier.level as usize != i + 1 {
                return Err(AppError::Validation(
                    "commission tier levels must be contiguous from 1".to_string(),
                ));
            }
            validation::validate_percentage("tier_percentage", &tier.percentage)?;
        }

        let mut tx = self.pool.begin().await?;
        queries::upsert_settings(&mut tx, &settings).await?;
        queries::replace_commission_tiers(&mut tx, &sorted).await?;
        tx.commit().await?;

        self.cache.reload_once(&self.pool).await?;
        tracing::info!("system settings updated, {} commission tiers", sorted.len());

        Ok(self.cache.get().as_ref().clone())
    }
}
