//! Level-commission planning and distribution for completed deposits.
//!
//! Planning is pure: given the resolved sponsor chain and the current
//! settings snapshot it yields the exact list of credits. Applying the plan
//! is one database transaction per deposit, so either every ancestor is
//! credited or none are.

use bigdecimal::BigDecimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{SettingsSnapshot, Transaction, User};
use crate::db::queries;
use crate::domain::{TransactionStatus, TransactionType, UserStatus, percentage_of};
use crate::error::AppError;

/// One ancestor on the upward chain, distance 1 = direct sponsor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AncestorRef {
    pub user_id: Uuid,
    pub level: u32,
    pub status: UserStatus,
}

/// A single credit the plan instructs us to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct CommissionCredit {
    pub user_id: Uuid,
    pub tx_type: TransactionType,
    pub amount: BigDecimal,
    pub description: String,
}

/// Compute every commission credit a completed deposit produces.
///
/// Level income goes to each ancestor whose distance has a configured tier;
/// sponsor income additionally goes to the direct sponsor; profit share goes
/// to the configured pool account. Suspended and banned ancestors are
/// skipped without stopping the walk, and credits that round to zero are
/// dropped entirely.
pub fn plan_commissions(
    amount: &BigDecimal,
    chain: &[AncestorRef],
    snapshot: &SettingsSnapshot,
) -> Vec<CommissionCredit> {
    let zero = BigDecimal::from(0);
    let max_level = snapshot.max_tier_level();
    let mut credits = Vec::new();

    for ancestor in chain {
        if ancestor.level > max_level {
            break;
        }
        if ancestor.status != UserStatus::Active {
            tracing::debug!(
                "skipping commission for {} user {} at level {}",
                ancestor.status.as_str(),
                ancestor.user_id,
                ancestor.level
            );
            continue;
        }

        if let Some(percentage) = snapshot.tier_percentage(ancestor.level) {
            let share = percentage_of(amount, percentage);
            if share > zero {
                credits.push(CommissionCredit {
                    user_id: ancestor.user_id,
                    tx_type: TransactionType::LevelIncome,
                    amount: share,
                    description: format!(
                        "Level {} commission on deposit of {}",
                        ancestor.level, amount
                    ),
                });
            }
        }
    }

    if let Some(sponsor) = chain.first().filter(|a| a.level == 1) {
        if sponsor.status == UserStatus::Active {
            let share = percentage_of(amount, &snapshot.settings.sponsor_commission_percentage);
            if share > zero {
                credits.push(CommissionCredit {
                    user_id: sponsor.user_id,
                    tx_type: TransactionType::SponsorIncome,
                    amount: share,
                    description: format!("Sponsor commission on deposit of {}", amount),
                });
            }
        }
    }

    if let Some(pool_user) = snapshot.settings.profit_pool_user_id {
        let share = percentage_of(amount, &snapshot.settings.profit_share_percentage);
        if share > zero {
            credits.push(CommissionCredit {
                user_id: pool_user,
                tx_type: TransactionType::ProfitShare,
                amount: share,
                description: format!("Profit share on deposit of {}", amount),
            });
        }
    }

    credits
}

pub struct CommissionService {
    pool: PgPool,
}

impl CommissionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Distribute commissions for a completed deposit. Resolves the sponsor
    /// chain, plans the credits, and applies all of them in one transaction:
    /// wallet balance, per-category user accumulators, and a completed
    /// ledger row per credit.
    pub async fn distribute_deposit_commissions(
        &self,
        depositor: &User,
        amount: &BigDecimal,
        snapshot: &SettingsSnapshot,
    ) -> Result<Vec<Transaction>, AppError> {
        let chain = self
            .resolve_ancestor_chain(depositor, snapshot.max_tier_level())
            .await?;
        let plan = plan_commissions(amount, &chain, snapshot);

        if plan.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        let mut applied = Vec::with_capacity(plan.len());

        for credit in &plan {
            let credited =
                queries::credit_income(&mut tx, credit.user_id, credit.tx_type, &credit.amount)
                    .await?;
            if !credited {
                tracing::error!(
                    "commission credit skipped: user {} has no wallet",
                    credit.user_id
                );
                continue;
            }

            queries::increment_user_income(&mut tx, credit.user_id, credit.tx_type, &credit.amount)
                .await?;

            let ledger_row = Transaction::new(
                credit.user_id,
                credit.tx_type,
                credit.amount.clone(),
                TransactionStatus::Completed,
                credit.description.clone(),
            );
            applied.push(queries::insert_transaction(&mut tx, &ledger_row).await?);
        }

        tx.commit().await?;

        tracing::info!(
            "distributed {} commission credits for deposit of {} by user {}",
            applied.len(),
            amount,
            depositor.id
        );

        Ok(applied)
    }

    /// Walk the sponsor chain upward, at most `max_level` hops. A sponsor id
    /// pointing at a missing user row aborts the remainder of the walk with
    /// a logged error; credits for the ancestors already resolved still
    /// apply. A visited set guards against corrupt cyclic chains.
    async fn resolve_ancestor_chain(
        &self,
        depositor: &User,
        max_level: u32,
    ) -> Result<Vec<AncestorRef>, AppError> {
        let mut chain = Vec::new();
        let mut seen = vec![depositor.id];
        let mut next_sponsor = depositor.sponsor_id;
        let mut level = 1u32;

        while let Some(sponsor_id) = next_sponsor {
            if level > max_level {
                break;
            }
            if seen.contains(&sponsor_id) {
                tracing::error!("cycle detected in sponsor chain at user {}", sponsor_id);
                break;
            }

            let Some(sponsor) = queries::get_user(&self.pool, sponsor_id).await? else {
                tracing::error!(
                    "commission walk aborted: sponsor {} of level {} is missing",
                    sponsor_id,
                    level
                );
                break;
            };

            let status = sponsor
                .status
                .parse::<UserStatus>()
                .unwrap_or(UserStatus::Suspended);
            chain.push(AncestorRef {
                user_id: sponsor.id,
                level,
                status,
            });

            seen.push(sponsor.id);
            next_sponsor = sponsor.sponsor_id;
            level += 1;
        }

        Ok(chain)
    }
}
