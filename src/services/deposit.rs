use bigdecimal::{BigDecimal, ToPrimitive};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::commission::CommissionService;
use crate::db::models::Transaction;
use crate::db::queries;
use crate::domain::{TransactionStatus, TransactionType, UserStatus, round_money};
use crate::error::AppError;
use crate::notify::Notifier;
use crate::payments::{GatewayClient, GatewayOrder};
use crate::services::settings::SettingsCache;
use crate::validation;

/// Deposit lifecycle: gateway order creation, signed callback settlement,
/// wallet credit, and commission distribution up the sponsor chain.
pub struct DepositService {
    pool: PgPool,
    gateway: GatewayClient,
    commissions: CommissionService,
    settings: Arc<SettingsCache>,
    notifier: Arc<Notifier>,
}

#[derive(Debug, Clone)]
pub struct DepositCallback {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

impl DepositService {
    pub fn new(
        pool: PgPool,
        gateway: GatewayClient,
        commissions: CommissionService,
        settings: Arc<SettingsCache>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            pool,
            gateway,
            commissions,
            settings,
            notifier,
        }
    }

    /// Create a gateway order for a deposit and record the pending ledger
    /// row carrying the order id. Nothing is credited until the signed
    /// callback settles the row.
    pub async fn initiate(
        &self,
        user_id: Uuid,
        amount: BigDecimal,
    ) -> Result<(GatewayOrder, Transaction), AppError> {
        validation::validate_positive_amount(&amount)?;
        let amount = round_money(&amount);

        let snapshot = self.settings.get();
        if amount < snapshot.settings.min_deposit_amount {
            return Err(AppError::Validation(format!(
                "deposit amount is below the minimum of {}",
                snapshot.settings.min_deposit_amount
            )));
        }

        let user = queries::get_user(&self.pool, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))?;
        if user.status != UserStatus::Active.as_str() {
            return Err(AppError::Validation(
                "only active users can deposit".to_string(),
            ));
        }

        let subunits = (&amount * BigDecimal::from(100))
            .with_scale(0)
            .to_i64()
            .ok_or_else(|| {
                AppError::Validation("deposit amount is out of range".to_string())
            })?;

        let receipt = Uuid::new_v4().to_string();
        let order = self.gateway.create_order(subunits, &receipt).await?;

        let pending = Transaction::new(
            user.id,
            TransactionType::Deposit,
            amount,
            TransactionStatus::Pending,
            "Deposit via payment gateway",
        )
        .with_gateway_order(order.id.clone());

        let mut tx = self.pool.begin().await?;
        let recorded = queries::insert_transaction(&mut tx, &pending).await?;
        tx.commit().await?;

        tracing::info!(
            "deposit order {} created for user {} ({})",
            order.id,
            user.id,
            recorded.amount
        );

        Ok((order, recorded))
    }

    /// Settle a signed gateway callback: verify the signature, flip the
    /// pending row to completed, credit the wallet in the same transaction,
    /// then distribute commissions up the sponsor chain.
    ///
    /// The settlement is single-shot: a replayed callback finds no pending
    /// row and is rejected without crediting again.
    pub async fn confirm(&self, callback: DepositCallback) -> Result<Transaction, AppError> {
        let pending = queries::get_transaction_by_order_id(&self.pool, &callback.order_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("deposit order {}", callback.order_id))
            })?;

        // An unverified caller must not be able to change the row's state:
        // the pending deposit stays pending so the genuine gateway callback
        // can still settle it.
        if !self.gateway.verify_signature(
            &callback.order_id,
            &callback.payment_id,
            &callback.signature,
        ) {
            tracing::warn!(
                "rejected deposit callback with bad signature for order {}",
                callback.order_id
            );
            return Err(AppError::Unauthorized(
                "payment signature verification failed".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let completed = queries::settle_pending_transaction(
            &mut tx,
            pending.id,
            TransactionStatus::Completed.as_str(),
            Some(&callback.payment_id),
        )
        .await?
        .ok_or_else(|| {
            AppError::BadRequest(format!(
                "deposit order {} is already settled",
                callback.order_id
            ))
        })?;

        let credited = queries::credit_deposit(&mut tx, completed.user_id, &completed.amount).await?;
        if !credited {
            return Err(AppError::Internal(format!(
                "wallet missing for user {}",
                completed.user_id
            )));
        }
        tx.commit().await?;

        tracing::info!(
            "deposit of {} settled for user {} (order {})",
            completed.amount,
            completed.user_id,
            callback.order_id
        );

        let depositor = queries::get_user(&self.pool, completed.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", completed.user_id)))?;
        let snapshot = self.settings.get();
        self.commissions
            .distribute_deposit_commissions(&depositor, &completed.amount, &snapshot)
            .await?;

        self.notifier.spawn_email(
            depositor.email.clone(),
            "Deposit confirmed".to_string(),
            format!("Your deposit of {} has been credited.", completed.amount),
        );
        self.notifier.spawn_sms(
            depositor.phone.clone(),
            format!("Deposit of {} credited to your wallet.", completed.amount),
        );

        Ok(completed)
    }

    /// Settle a signed failure callback from the gateway. The signature
    /// requirement is the same as for a success: only the gateway can move
    /// a pending deposit to failed.
    pub async fn fail(&self, callback: DepositCallback) -> Result<Transaction, AppError> {
        let pending = queries::get_transaction_by_order_id(&self.pool, &callback.order_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("deposit order {}", callback.order_id))
            })?;

        if !self.gateway.verify_signature(
            &callback.order_id,
            &callback.payment_id,
            &callback.signature,
        ) {
            tracing::warn!(
                "rejected deposit failure callback with bad signature for order {}",
                callback.order_id
            );
            return Err(AppError::Unauthorized(
                "payment signature verification failed".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let failed = queries::settle_pending_transaction(
            &mut tx,
            pending.id,
            TransactionStatus::Failed.as_str(),
            Some(&callback.payment_id),
        )
        .await?
        .ok_or_else(|| {
            AppError::BadRequest(format!(
                "deposit order {} is already settled",
                callback.order_id
            ))
        })?;
        tx.commit().await?;

        tracing::info!(
            "deposit order {} marked failed by gateway callback",
            callback.order_id
        );

        Ok(failed)
    }
}
