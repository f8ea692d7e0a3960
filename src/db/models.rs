use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::BigDecimal;
use uuid::Uuid;

use crate::domain::{TransactionStatus, TransactionType};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub referral_code: String,
    pub sponsor_id: Option<Uuid>,
    pub direct_referrals: i64,
    pub total_team_size: i64,
    pub level_income: BigDecimal,
    pub sponsor_income: BigDecimal,
    pub profit_share: BigDecimal,
    pub is_admin: bool,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Exactly one direct sponsor→referred relationship; created at registration,
/// never mutated. `level` is always 1 — deeper levels are derived by walking
/// the chain, not stored.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ReferralEdge {
    pub id: Uuid,
    pub sponsor_id: Uuid,
    pub referred_id: Uuid,
    pub level: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: Uuid,
    pub balance: BigDecimal,
    pub total_invested: BigDecimal,
    pub total_income: BigDecimal,
    pub level_income: BigDecimal,
    pub sponsor_income: BigDecimal,
    pub profit_share: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tx_type: String,
    pub amount: BigDecimal,
    pub status: String,
    pub description: String,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        user_id: Uuid,
        tx_type: TransactionType,
        amount: BigDecimal,
        status: TransactionStatus,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            tx_type: tx_type.as_str().to_string(),
            amount,
            status: status.as_str().to_string(),
            description: description.into(),
            gateway_order_id: None,
            gateway_payment_id: None,
            created_at: Utc::now(),
        }
    }

    /// Attach the gateway order reference to a pending deposit row. The
    /// payment id arrives later, with the settlement callback.
    pub fn with_gateway_order(mut self, order_id: String) -> Self {
        self.gateway_order_id = Some(order_id);
        self
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub account_name: String,
    pub account_number: String,
    pub ifsc_code: String,
    pub bank_name: String,
    pub status: String,
    pub processed_by: Option<Uuid>,
    pub remarks: Option<String>,
    pub external_tx_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// The singleton settings row. The ordered level-commission tier list lives
/// in its own table and is carried alongside in [`SettingsSnapshot`].
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SystemSettings {
    pub sponsor_commission_percentage: BigDecimal,
    pub profit_share_percentage: BigDecimal,
    pub min_deposit_amount: BigDecimal,
    pub min_withdrawal_amount: BigDecimal,
    pub max_withdrawal_amount: BigDecimal,
    pub admin_account_name: String,
    pub admin_account_number: String,
    pub admin_ifsc_code: String,
    pub admin_bank_name: String,
    pub profit_pool_user_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CommissionTier {
    pub level: i32,
    pub percentage: BigDecimal,
}

/// Settings row plus tiers, as read by the commission calculator and the
/// deposit/withdrawal validators. Tiers are kept sorted by level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    pub settings: SystemSettings,
    pub tiers: Vec<CommissionTier>,
}

impl SettingsSnapshot {
    pub fn tier_percentage(&self, level: u32) -> Option<&BigDecimal> {
        self.tiers
            .iter()
            .find(|t| t.level == level as i32)
            .map(|t| &t.percentage)
    }

    /// Ancestors beyond this depth receive no level income.
    pub fn max_tier_level(&self) -> u32 {
        self.tiers.iter().map(|t| t.level as u32).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DashboardTotals {
    pub total_users: i64,
    pub system_balance: BigDecimal,
    pub total_deposits: BigDecimal,
    pub total_withdrawals: BigDecimal,
    pub total_commissions: BigDecimal,
    pub daily_transactions: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn transaction_constructor_sets_type_and_status() {
        let user = Uuid::new_v4();
        let tx = Transaction::new(
            user,
            TransactionType::Deposit,
            BigDecimal::from(100),
            TransactionStatus::Completed,
            "Funds added to wallet",
        );

        assert_eq!(tx.user_id, user);
        assert_eq!(tx.tx_type, "deposit");
        assert_eq!(tx.status, "completed");
        assert!(tx.gateway_order_id.is_none());
    }

    #[test]
    fn transaction_gateway_order_attaches() {
        let tx = Transaction::new(
            Uuid::new_v4(),
            TransactionType::Deposit,
            BigDecimal::from(100),
            TransactionStatus::Pending,
            "Payment via gateway",
        )
        .with_gateway_order("order_1".into());

        assert_eq!(tx.gateway_order_id.as_deref(), Some("order_1"));
        assert!(tx.gateway_payment_id.is_none());
    }

    #[test]
    fn settings_snapshot_tier_lookup() {
        let snapshot = SettingsSnapshot {
            settings: SystemSettings {
                sponsor_commission_percentage: BigDecimal::from(2),
                profit_share_percentage: BigDecimal::from(1),
                min_deposit_amount: BigDecimal::from(100),
                min_withdrawal_amount: BigDecimal::from(100),
                max_withdrawal_amount: BigDecimal::from(100000),
                admin_account_name: String::new(),
                admin_account_number: String::new(),
                admin_ifsc_code: String::new(),
                admin_bank_name: String::new(),
                profit_pool_user_id: None,
                updated_at: Utc::now(),
            },
            tiers: vec![
                CommissionTier {
                    level: 1,
                    percentage: BigDecimal::from_str("5").unwrap(),
                },
                CommissionTier {
                    level: 2,
                    percentage: BigDecimal::from_str("3").unwrap(),
                },
            ],
        };

        assert_eq!(snapshot.tier_percentage(1), Some(&BigDecimal::from(5)));
        assert_eq!(snapshot.tier_percentage(3), None);
        assert_eq!(snapshot.max_tier_level(), 2);
    }
}
