//! Application services: the money flows and the settings they read.

pub mod deposit;
pub mod settings;
pub mod withdrawal;

pub use deposit::{DepositCallback, DepositService};
pub use settings::{SettingsCache, SettingsService};
pub use withdrawal::{BankAccount, WithdrawalService};
