//! Domain vocabulary: ledger/status enums, money rounding, referral codes.

use bigdecimal::BigDecimal;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const REFERRAL_CODE_LEN: usize = 16;
const REFERRAL_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Ledger entry types. One row per credit/debit, immutable once written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    LevelIncome,
    SponsorIncome,
    ProfitShare,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::LevelIncome => "level_income",
            TransactionType::SponsorIncome => "sponsor_income",
            TransactionType::ProfitShare => "profit_share",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Rejected => "rejected",
        }
    }
}

/// Users are never hard-deleted; they move between these states instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Suspended,
    Banned,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Suspended => "suspended",
            UserStatus::Banned => "banned",
        }
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(UserStatus::Active),
            "suspended" => Ok(UserStatus::Suspended),
            "banned" => Ok(UserStatus::Banned),
            other => Err(format!("unknown user status: {}", other)),
        }
    }
}

/// Round a monetary amount half-up to two decimal places.
///
/// Commission math multiplies arbitrary deposit amounts by configured
/// percentages; every credit passes through here so all ancestors see the
/// same rounding and no cross-ancestor drift accumulates.
pub fn round_money(value: &BigDecimal) -> BigDecimal {
    let half_cent = BigDecimal::from_str("0.005").expect("constant parses");
    // with_scale drops digits past the target scale, so adding half a cent
    // first gives half-up behaviour for the non-negative amounts we handle.
    (value + half_cent).with_scale(2)
}

/// `amount * percentage / 100`, rounded to the currency subunit.
pub fn percentage_of(amount: &BigDecimal, percentage: &BigDecimal) -> BigDecimal {
    round_money(&(amount * percentage / BigDecimal::from(100)))
}

/// Random 16-character referral code (uppercase letters and digits), as
/// handed out to users at registration. Uniqueness is enforced by the
/// database; callers retry on collision.
pub fn generate_referral_code() -> String {
    let mut rng = rand::thread_rng();
    (0..REFERRAL_CODE_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..REFERRAL_CODE_CHARSET.len());
            REFERRAL_CODE_CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn rounds_half_up_to_cents() {
        assert_eq!(round_money(&dec("50")), dec("50.00"));
        assert_eq!(round_money(&dec("12.344")), dec("12.34"));
        assert_eq!(round_money(&dec("12.346")), dec("12.35"));
        assert_eq!(round_money(&dec("12.345")), dec("12.35"));
        assert_eq!(round_money(&dec("0")), dec("0.00"));
    }

    #[test]
    fn computes_percentage_of_amount() {
        assert_eq!(percentage_of(&dec("1000"), &dec("5")), dec("50.00"));
        assert_eq!(percentage_of(&dec("1000"), &dec("3")), dec("30.00"));
        assert_eq!(percentage_of(&dec("999"), &dec("3.5")), dec("34.97"));
        assert_eq!(percentage_of(&dec("0.01"), &dec("1")), dec("0.00"));
    }

    #[test]
    fn referral_codes_use_expected_alphabet() {
        let code = generate_referral_code();
        assert_eq!(code.len(), REFERRAL_CODE_LEN);
        assert!(code
            .chars()
            .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit()));
    }

    #[test]
    fn transaction_type_round_trips_as_str() {
        assert_eq!(TransactionType::LevelIncome.as_str(), "level_income");
        assert_eq!(
            serde_json::to_string(&TransactionType::SponsorIncome).unwrap(),
            "\"sponsor_income\""
        );
    }

    #[test]
    fn user_status_parses() {
        assert_eq!("active".parse::<UserStatus>().unwrap(), UserStatus::Active);
        assert!("deleted".parse::<UserStatus>().is_err());
    }
}
