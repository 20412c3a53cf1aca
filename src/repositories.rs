use async_trait::async_trait;

use crate::models::{
    accounts::{Account, NewAccount},
    referrals::Referral,
    withdrawals::{NewWithdrawal, WithdrawalRequest},
};

pub mod memory;
pub mod postgres;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Record not found: {0}")]
    Missing(String),
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.constraint().unwrap_or("unique").to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

/// Entry point to the persistent ledger. Every read-check-write sequence runs
/// inside a [`LedgerTransaction`].
#[async_trait]
pub trait LedgerStore: Clone + Send + Sync + 'static {
    type Transaction: LedgerTransaction;

    async fn begin(&self) -> Result<Self::Transaction, StoreError>;
}

/// A unit of work against the ledger. Dropping it without calling
/// [`LedgerTransaction::commit`] discards every write made through it.
#[async_trait]
pub trait LedgerTransaction: Send + Sized + 'static {
    async fn create_account(&mut self, account: &NewAccount) -> Result<Account, StoreError>;

    async fn get_account(&mut self, id: &str) -> Result<Option<Account>, StoreError>;

    /// Fetches an account and holds its row lock until the transaction ends.
    async fn get_account_for_update(&mut self, id: &str) -> Result<Option<Account>, StoreError>;

    async fn find_account_by_referral_code(
        &mut self,
        code: &str,
    ) -> Result<Option<Account>, StoreError>;

    async fn list_accounts(&mut self) -> Result<Vec<Account>, StoreError>;

    async fn save_account(&mut self, account: &Account) -> Result<(), StoreError>;

    async fn create_referral(
        &mut self,
        referrer_id: &str,
        referred_id: &str,
    ) -> Result<Referral, StoreError>;

    async fn count_referrals_as_referrer(&mut self, account_id: &str) -> Result<i64, StoreError>;

    async fn list_referrals_as_referrer(
        &mut self,
        account_id: &str,
    ) -> Result<Vec<Referral>, StoreError>;

    async fn list_referrals_as_referred(
        &mut self,
        account_id: &str,
    ) -> Result<Vec<Referral>, StoreError>;

    async fn create_withdrawal(
        &mut self,
        withdrawal: &NewWithdrawal,
    ) -> Result<WithdrawalRequest, StoreError>;

    /// Fetches a withdrawal and holds its row lock until the transaction ends.
    async fn get_withdrawal(&mut self, id: &str) -> Result<Option<WithdrawalRequest>, StoreError>;

    async fn save_withdrawal(&mut self, withdrawal: &WithdrawalRequest) -> Result<(), StoreError>;

    /// Withdrawals of one account, newest first. `processed` narrows the
    /// result to processed (`Some(true)`) or pending (`Some(false)`) ones.
    async fn list_withdrawals(
        &mut self,
        account_id: &str,
        processed: Option<bool>,
    ) -> Result<Vec<WithdrawalRequest>, StoreError>;

    /// Pending withdrawals of every account, oldest first.
    async fn list_pending_withdrawals(&mut self) -> Result<Vec<WithdrawalRequest>, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;
}
