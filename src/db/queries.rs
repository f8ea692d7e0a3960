use sqlx::types::BigDecimal;
use sqlx::{PgPool, Postgres, Result, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::db::models::{
    CommissionTier, DashboardTotals, ReferralEdge, SystemSettings, Transaction, User, Wallet,
    WithdrawalRequest,
};
use crate::domain::TransactionType;

// --- User queries ---

pub async fn insert_user(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user: &User,
) -> Result<User> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (
            id, name, email, phone, referral_code, sponsor_id,
            direct_referrals, total_team_size, level_income, sponsor_income, profit_share,
            is_admin, status, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        RETURNING *
        "#,
    )
    .bind(user.id)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.phone)
    .bind(&user.referral_code)
    .bind(user.sponsor_id)
    .bind(user.direct_referrals)
    .bind(user.total_team_size)
    .bind(&user.level_income)
    .bind(&user.sponsor_income)
    .bind(&user.profit_share)
    .bind(user.is_admin)
    .bind(&user.status)
    .bind(user.created_at)
    .bind(user.updated_at)
    .fetch_one(&mut **executor)
    .await
}

pub async fn get_user(pool: &PgPool, id: Uuid) -> Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn get_user_by_referral_code(pool: &PgPool, code: &str) -> Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE referral_code = $1")
        .bind(code)
        .fetch_optional(pool)
        .await
}

pub async fn list_users(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<User>> {
    sqlx::query_as::<_, User>(
        "SELECT * FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn update_user_status(pool: &PgPool, id: Uuid, status: &str) -> Result<Option<User>> {
    sqlx::query_as::<_, User>(
        "UPDATE users SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(status)
    .fetch_optional(pool)
    .await
}

/// Write back recomputed team counts. Returns false when the user row has
/// vanished (dangling edge); callers log and move on rather than aborting
/// the surrounding aggregation.
pub async fn update_team_counts(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
    direct_referrals: i64,
    total_team_size: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET direct_referrals = $2, total_team_size = $3, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .bind(direct_referrals)
    .bind(total_team_size)
    .execute(&mut **executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Atomic per-category income accumulator bump on the user record.
pub async fn increment_user_income(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
    tx_type: TransactionType,
    amount: &BigDecimal,
) -> Result<()> {
    let sql = match tx_type {
        TransactionType::LevelIncome => {
            "UPDATE users SET level_income = level_income + $2, updated_at = NOW() WHERE id = $1"
        }
        TransactionType::SponsorIncome => {
            "UPDATE users SET sponsor_income = sponsor_income + $2, updated_at = NOW() WHERE id = $1"
        }
        TransactionType::ProfitShare => {
            "UPDATE users SET profit_share = profit_share + $2, updated_at = NOW() WHERE id = $1"
        }
        _ => return Ok(()),
    };

    sqlx::query(sql)
        .bind(user_id)
        .bind(amount)
        .execute(&mut **executor)
        .await?;

    Ok(())
}

// --- Referral edge queries ---

const TEAM_RECOMPUTE_LOCK_KEY: i64 = 0x55504c494e45; // "UPLINE"

/// Transaction-scoped advisory lock serializing team-size recomputations.
///
/// Under READ COMMITTED, two recomputations racing on overlapping chains
/// could each snapshot the edge set before the other's edge commits and
/// write back stale absolute counts. Holding this lock for the duration of
/// the recompute transaction forces them into sequence, so the later one
/// always sees every edge committed before it started. Released
/// automatically at commit/rollback.
pub async fn lock_team_recompute(
    executor: &mut SqlxTransaction<'_, Postgres>,
) -> Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(TEAM_RECOMPUTE_LOCK_KEY)
        .execute(&mut **executor)
        .await?;

    Ok(())
}

pub async fn insert_referral_edge(
    executor: &mut SqlxTransaction<'_, Postgres>,
    edge: &ReferralEdge,
) -> Result<ReferralEdge> {
    sqlx::query_as::<_, ReferralEdge>(
        r#"
        INSERT INTO referral_edges (id, sponsor_id, referred_id, level, created_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(edge.id)
    .bind(edge.sponsor_id)
    .bind(edge.referred_id)
    .bind(edge.level)
    .bind(edge.created_at)
    .fetch_one(&mut **executor)
    .await
}

/// Flat (sponsor_id, referred_id) snapshot of the whole forest, the input to
/// the adjacency index.
pub async fn fetch_all_edges(pool: &PgPool) -> Result<Vec<(Uuid, Uuid)>> {
    sqlx::query_as::<_, (Uuid, Uuid)>("SELECT sponsor_id, referred_id FROM referral_edges")
        .fetch_all(pool)
        .await
}

/// Same snapshot, read inside the transaction that will write counts back so
/// one recomputation sees a consistent edge set.
pub async fn fetch_all_edges_tx(
    executor: &mut SqlxTransaction<'_, Postgres>,
) -> Result<Vec<(Uuid, Uuid)>> {
    sqlx::query_as::<_, (Uuid, Uuid)>("SELECT sponsor_id, referred_id FROM referral_edges")
        .fetch_all(&mut **executor)
        .await
}

pub async fn direct_downline_users(pool: &PgPool, sponsor_id: Uuid) -> Result<Vec<User>> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT u.* FROM users u
        JOIN referral_edges e ON e.referred_id = u.id
        WHERE e.sponsor_id = $1
        ORDER BY e.created_at DESC
        "#,
    )
    .bind(sponsor_id)
    .fetch_all(pool)
    .await
}

// --- Wallet queries ---

pub async fn insert_wallet(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<()> {
    sqlx::query("INSERT INTO wallets (user_id) VALUES ($1)")
        .bind(user_id)
        .execute(&mut **executor)
        .await?;

    Ok(())
}

pub async fn get_wallet(pool: &PgPool, user_id: Uuid) -> Result<Option<Wallet>> {
    sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

pub async fn credit_deposit(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
    amount: &BigDecimal,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE wallets
        SET balance = balance + $2, total_invested = total_invested + $2, updated_at = NOW()
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .execute(&mut **executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Commission credit: balance, total income and the matching per-category
/// subtotal all move together, atomically.
pub async fn credit_income(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
    tx_type: TransactionType,
    amount: &BigDecimal,
) -> Result<bool> {
    let sql = match tx_type {
        TransactionType::LevelIncome => {
            r#"
            UPDATE wallets
            SET balance = balance + $2, total_income = total_income + $2,
                level_income = level_income + $2, updated_at = NOW()
            WHERE user_id = $1
            "#
        }
        TransactionType::SponsorIncome => {
            r#"
            UPDATE wallets
            SET balance = balance + $2, total_income = total_income + $2,
                sponsor_income = sponsor_income + $2, updated_at = NOW()
            WHERE user_id = $1
            "#
        }
        TransactionType::ProfitShare => {
            r#"
            UPDATE wallets
            SET balance = balance + $2, total_income = total_income + $2,
                profit_share = profit_share + $2, updated_at = NOW()
            WHERE user_id = $1
            "#
        }
        _ => return Ok(false),
    };

    let result = sqlx::query(sql)
        .bind(user_id)
        .bind(amount)
        .execute(&mut **executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Guarded debit: succeeds only when the balance covers the amount, so a
/// withdrawal can never partially debit or overdraw.
pub async fn try_debit(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
    amount: &BigDecimal,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE wallets
        SET balance = balance - $2, updated_at = NOW()
        WHERE user_id = $1 AND balance >= $2
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .execute(&mut **executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn refund(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
    amount: &BigDecimal,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE wallets SET balance = balance + $2, updated_at = NOW() WHERE user_id = $1",
    )
    .bind(user_id)
    .bind(amount)
    .execute(&mut **executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

// --- Transaction (ledger) queries ---

pub async fn insert_transaction(
    executor: &mut SqlxTransaction<'_, Postgres>,
    tx: &Transaction,
) -> Result<Transaction> {
    sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions (
            id, user_id, tx_type, amount, status, description,
            gateway_order_id, gateway_payment_id, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(tx.id)
    .bind(tx.user_id)
    .bind(&tx.tx_type)
    .bind(&tx.amount)
    .bind(&tx.status)
    .bind(&tx.description)
    .bind(&tx.gateway_order_id)
    .bind(&tx.gateway_payment_id)
    .bind(tx.created_at)
    .fetch_one(&mut **executor)
    .await
}

pub async fn get_transaction_by_order_id(
    pool: &PgPool,
    gateway_order_id: &str,
) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE gateway_order_id = $1",
    )
    .bind(gateway_order_id)
    .fetch_optional(pool)
    .await
}

/// Single-shot settlement of a pending gateway transaction. Returns None when
/// the row was already settled, so a replayed callback cannot credit twice.
pub async fn settle_pending_transaction(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    new_status: &str,
    gateway_payment_id: Option<&str>,
) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        r#"
        UPDATE transactions
        SET status = $2, gateway_payment_id = COALESCE($3, gateway_payment_id)
        WHERE id = $1 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(new_status)
    .bind(gateway_payment_id)
    .fetch_optional(&mut **executor)
    .await
}

pub async fn get_transaction(pool: &PgPool, id: Uuid) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_transactions_by_user(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        r#"
        SELECT * FROM transactions
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn recent_transactions_of_type(
    pool: &PgPool,
    tx_type: TransactionType,
    limit: i64,
) -> Result<Vec<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE tx_type = $1 ORDER BY created_at DESC LIMIT $2",
    )
    .bind(tx_type.as_str())
    .bind(limit)
    .fetch_all(pool)
    .await
}

// --- Withdrawal request queries ---

pub async fn insert_withdrawal_request(
    executor: &mut SqlxTransaction<'_, Postgres>,
    request: &WithdrawalRequest,
) -> Result<WithdrawalRequest> {
    sqlx::query_as::<_, WithdrawalRequest>(
        r#"
        INSERT INTO withdrawal_requests (
            id, user_id, amount, account_name, account_number, ifsc_code, bank_name,
            status, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(request.id)
    .bind(request.user_id)
    .bind(&request.amount)
    .bind(&request.account_name)
    .bind(&request.account_number)
    .bind(&request.ifsc_code)
    .bind(&request.bank_name)
    .bind(&request.status)
    .bind(request.created_at)
    .fetch_one(&mut **executor)
    .await
}

pub async fn get_withdrawal_request(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<WithdrawalRequest>> {
    sqlx::query_as::<_, WithdrawalRequest>("SELECT * FROM withdrawal_requests WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_withdrawals_by_user(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Vec<WithdrawalRequest>> {
    sqlx::query_as::<_, WithdrawalRequest>(
        "SELECT * FROM withdrawal_requests WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn list_all_withdrawals(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Vec<WithdrawalRequest>> {
    sqlx::query_as::<_, WithdrawalRequest>(
        "SELECT * FROM withdrawal_requests ORDER BY created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

/// Single-shot state transition out of `pending`. Returns None when the
/// request was already processed (or does not exist), so approval/rejection
/// can never be applied twice.
pub async fn transition_withdrawal(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    new_status: &str,
    processed_by: Uuid,
    remarks: Option<&str>,
    external_tx_id: Option<&str>,
) -> Result<Option<WithdrawalRequest>> {
    sqlx::query_as::<_, WithdrawalRequest>(
        r#"
        UPDATE withdrawal_requests
        SET status = $2, processed_by = $3, remarks = $4, external_tx_id = $5,
            processed_at = NOW()
        WHERE id = $1 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(new_status)
    .bind(processed_by)
    .bind(remarks)
    .bind(external_tx_id)
    .fetch_optional(&mut **executor)
    .await
}

// --- Settings queries ---

pub async fn get_settings(pool: &PgPool) -> Result<Option<SystemSettings>> {
    sqlx::query_as::<_, SystemSettings>(
        r#"
        SELECT sponsor_commission_percentage, profit_share_percentage,
               min_deposit_amount, min_withdrawal_amount, max_withdrawal_amount,
               admin_account_name, admin_account_number, admin_ifsc_code, admin_bank_name,
               profit_pool_user_id, updated_at
        FROM system_settings
        WHERE singleton
        "#,
    )
    .fetch_optional(pool)
    .await
}

pub async fn get_commission_tiers(pool: &PgPool) -> Result<Vec<CommissionTier>> {
    sqlx::query_as::<_, CommissionTier>(
        "SELECT level, percentage FROM commission_tiers ORDER BY level ASC",
    )
    .fetch_all(pool)
    .await
}

pub async fn upsert_settings(
    executor: &mut SqlxTransaction<'_, Postgres>,
    settings: &SystemSettings,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO system_settings (
            singleton, sponsor_commission_percentage, profit_share_percentage,
            min_deposit_amount, min_withdrawal_amount, max_withdrawal_amount,
            admin_account_name, admin_account_number, admin_ifsc_code, admin_bank_name,
            profit_pool_user_id, updated_at
        ) VALUES (TRUE, $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
        ON CONFLICT (singleton) DO UPDATE SET
            sponsor_commission_percentage = EXCLUDED.sponsor_commission_percentage,
            profit_share_percentage = EXCLUDED.profit_share_percentage,
            min_deposit_amount = EXCLUDED.min_deposit_amount,
            min_withdrawal_amount = EXCLUDED.min_withdrawal_amount,
            max_withdrawal_amount = EXCLUDED.max_withdrawal_amount,
            admin_account_name = EXCLUDED.admin_account_name,
            admin_account_number = EXCLUDED.admin_account_number,
            admin_ifsc_code = EXCLUDED.admin_ifsc_code,
            admin_bank_name = EXCLUDED.admin_bank_name,
            profit_pool_user_id = EXCLUDED.profit_pool_user_id,
            updated_at = NOW()
        "#,
    )
    .bind(&settings.sponsor_commission_percentage)
    .bind(&settings.profit_share_percentage)
    .bind(&settings.min_deposit_amount)
    .bind(&settings.min_withdrawal_amount)
    .bind(&settings.max_withdrawal_amount)
    .bind(&settings.admin_account_name)
    .bind(&settings.admin_account_number)
    .bind(&settings.admin_ifsc_code)
    .bind(&settings.admin_bank_name)
    .bind(settings.profit_pool_user_id)
    .execute(&mut **executor)
    .await?;

    Ok(())
}

pub async fn replace_commission_tiers(
    executor: &mut SqlxTransaction<'_, Postgres>,
    tiers: &[CommissionTier],
) -> Result<()> {
    sqlx::query("DELETE FROM commission_tiers")
        .execute(&mut **executor)
        .await?;

    for tier in tiers {
        sqlx::query("INSERT INTO commission_tiers (level, percentage) VALUES ($1, $2)")
            .bind(tier.level)
            .bind(&tier.percentage)
            .execute(&mut **executor)
            .await?;
    }

    Ok(())
}

// --- Dashboard aggregates ---

pub async fn dashboard_totals(pool: &PgPool) -> Result<DashboardTotals> {
    sqlx::query_as::<_, DashboardTotals>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM users) AS total_users,
            (SELECT COALESCE(SUM(balance), 0) FROM wallets) AS system_balance,
            COALESCE(SUM(amount) FILTER (WHERE tx_type = 'deposit' AND status = 'completed'), 0) AS total_deposits,
            COALESCE(SUM(amount) FILTER (WHERE tx_type = 'withdrawal' AND status = 'completed'), 0) AS total_withdrawals,
            COALESCE(SUM(amount) FILTER (
                WHERE tx_type IN ('level_income', 'sponsor_income', 'profit_share')
                AND status = 'completed'
            ), 0) AS total_commissions,
            COUNT(*) FILTER (WHERE created_at >= NOW() - INTERVAL '1 day') AS daily_transactions
        FROM transactions
        "#,
    )
    .fetch_one(pool)
    .await
}
