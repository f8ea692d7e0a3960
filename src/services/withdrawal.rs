use bigdecimal::BigDecimal;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::models::{Transaction, WithdrawalRequest};
use crate::db::queries;
use crate::domain::{
    TransactionStatus, TransactionType, UserStatus, WithdrawalStatus, round_money,
};
use crate::error::AppError;
use crate::notify::Notifier;
use crate::services::settings::SettingsCache;
use crate::validation;

#[derive(Debug, Clone)]
pub struct BankAccount {
    pub account_name: String,
    pub account_number: String,
    pub ifsc_code: String,
    pub bank_name: String,
}

/// Withdrawal lifecycle. The wallet is debited when the request is made, so
/// requested funds can never be double-spent while an admin reviews; a
/// rejection refunds the debit.
pub struct WithdrawalService {
    pool: PgPool,
    settings: Arc<SettingsCache>,
    notifier: Arc<Notifier>,
}

impl WithdrawalService {
    pub fn new(pool: PgPool, settings: Arc<SettingsCache>, notifier: Arc<Notifier>) -> Self {
        Self {
            pool,
            settings,
            notifier,
        }
    }

    /// File a withdrawal request. The guarded debit and the pending request
    /// row are written in one transaction: either the balance covers the
    /// amount and both happen, or neither does.
    pub async fn request(
        &self,
        user_id: Uuid,
        amount: BigDecimal,
        account: BankAccount,
    ) -> Result<WithdrawalRequest, AppError> {
        validation::validate_positive_amount(&amount)?;
        let amount = round_money(&amount);

        let snapshot = self.settings.get();
        if amount < snapshot.settings.min_withdrawal_amount {
            return Err(AppError::Validation(format!(
                "withdrawal amount is below the minimum of {}",
                snapshot.settings.min_withdrawal_amount
            )));
        }
        if amount > snapshot.settings.max_withdrawal_amount {
            return Err(AppError::Validation(format!(
                "withdrawal amount exceeds the maximum of {}",
                snapshot.settings.max_withdrawal_amount
            )));
        }

        let account = BankAccount {
            account_name: validation::sanitize_string(&account.account_name),
            account_number: validation::sanitize_string(&account.account_number),
            ifsc_code: validation::sanitize_string(&account.ifsc_code),
            bank_name: validation::sanitize_string(&account.bank_name),
        };
        validation::validate_required("account_name", &account.account_name)?;
        validation::validate_required("account_number", &account.account_number)?;
        validation::validate_required("ifsc_code", &account.ifsc_code)?;
        validation::validate_required("bank_name", &account.bank_name)?;
        for (field, value) in [
            ("account_name", &account.account_name),
            ("account_number", &account.account_number),
            ("ifsc_code", &account.ifsc_code),
            ("bank_name", &account.bank_name),
        ] {
            validation::validate_max_len(field, value, validation::ACCOUNT_FIELD_MAX_LEN)?;
        }

        let user = queries::get_user(&self.pool, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))?;
        if user.status != UserStatus::Active.as_str() {
            return Err(AppError::Validation(
                "only active users can withdraw".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let debited = queries::try_debit(&mut tx, user.id, &amount).await?;
        if !debited {
            return Err(AppError::InsufficientBalance(format!(
                "balance does not cover withdrawal of {}",
                amount
            )));
        }

        let request = WithdrawalRequest {
            id: Uuid::new_v4(),
            user_id: user.id,
            amount: amount.clone(),
            account_name: account.account_name,
            account_number: account.account_number,
            ifsc_code: account.ifsc_code,
            bank_name: account.bank_name,
            status: WithdrawalStatus::Pending.as_str().to_string(),
            processed_by: None,
            remarks: None,
            external_tx_id: None,
            created_at: Utc::now(),
            processed_at: None,
        };
        let filed = queries::insert_withdrawal_request(&mut tx, &request).await?;
        tx.commit().await?;

        tracing::info!(
            "withdrawal request {} filed by user {} for {}",
            filed.id,
            user.id,
            amount
        );

        self.notifier.spawn_email(
            user.email,
            "Withdrawal request received".to_string(),
            format!("Your withdrawal request for {} is pending review.", amount),
        );
        self.notifier.spawn_sms(
            user.phone,
            format!("Withdrawal request for {} received and pending review.", amount),
        );

        Ok(filed)
    }

    /// Approve a pending request. The transition out of `pending` is
    /// single-shot, so a request can never be paid out twice; the completed
    /// withdrawal lands on the ledger in the same transaction.
    pub async fn approve(
        &self,
        request_id: Uuid,
        admin_id: Uuid,
        remarks: Option<String>,
        external_tx_id: Option<String>,
    ) -> Result<WithdrawalRequest, AppError> {
        if let Some(remarks) = &remarks {
            validation::validate_max_len("remarks", remarks, validation::REMARKS_MAX_LEN)?;
        }

        let mut tx = self.pool.begin().await?;
        let approved = queries::transition_withdrawal(
            &mut tx,
            request_id,
            WithdrawalStatus::Approved.as_str(),
            admin_id,
            remarks.as_deref(),
            external_tx_id.as_deref(),
        )
        .await?
        .ok_or_else(|| {
            AppError::BadRequest(format!(
                "withdrawal request {} is not pending",
                request_id
            ))
        })?;

        let ledger_row = Transaction::new(
            approved.user_id,
            TransactionType::Withdrawal,
            approved.amount.clone(),
            TransactionStatus::Completed,
            "Withdrawal approved and paid out",
        );
        queries::insert_transaction(&mut tx, &ledger_row).await?;
        tx.commit().await?;

        tracing::info!(
            "withdrawal request {} approved by admin {}",
            approved.id,
            admin_id
        );

        self.notify_outcome(&approved, "approved").await?;

        Ok(approved)
    }

    /// Reject a pending request and refund the debit taken when it was
    /// filed. Refund, transition, and the failed ledger row are one
    /// transaction.
    pub async fn reject(
        &self,
        request_id: Uuid,
        admin_id: Uuid,
        remarks: Option<String>,
    ) -> Result<WithdrawalRequest, AppError> {
        if let Some(remarks) = &remarks {
            validation::validate_max_len("remarks", remarks, validation::REMARKS_MAX_LEN)?;
        }

        let mut tx = self.pool.begin().await?;
        let rejected = queries::transition_withdrawal(
            &mut tx,
            request_id,
            WithdrawalStatus::Rejected.as_str(),
            admin_id,
            remarks.as_deref(),
            None,
        )
        .await?
        .ok_or_else(|| {
            AppError::BadRequest(format!(
                "withdrawal request {} is not pending",
                request_id
            ))
        })?;

        let refunded = queries::refund(&mut tx, rejected.user_id, &rejected.amount).await?;
        if !refunded {
            return Err(AppError::Internal(format!(
                "wallet missing for user {}",
                rejected.user_id
            )));
        }

        let ledger_row = Transaction::new(
            rejected.user_id,
            TransactionType::Withdrawal,
            rejected.amount.clone(),
            TransactionStatus::Failed,
            "Withdrawal rejected, amount refunded",
        );
        queries::insert_transaction(&mut tx, &ledger_row).await?;
        tx.commit().await?;

        tracing::info!(
            "withdrawal request {} rejected by admin {}, {} refunded",
            rejected.id,
            admin_id,
            rejected.amount
        );

        self.notify_outcome(&rejected, "rejected").await?;

        Ok(rejected)
    }

    async fn notify_outcome(
        &self,
        request: &WithdrawalRequest,
        outcome: &str,
    ) -> Result<(), AppError> {
        if let Some(user) = queries::get_user(&self.pool, request.user_id).await? {
            self.notifier.spawn_email(
                user.email,
                format!("Withdrawal {}", outcome),
                format!(
                    "Your withdrawal request for {} has been {}.",
                    request.amount, outcome
                ),
            );
            self.notifier.spawn_sms(
                user.phone,
                format!(
                    "Your withdrawal request for {} has been {}.",
                    request.amount, outcome
                ),
            );
        }

        Ok(())
    }
}
