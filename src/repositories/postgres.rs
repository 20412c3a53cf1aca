use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{LedgerStore, LedgerTransaction, StoreError};
use crate::models::{
    accounts::{Account, NewAccount},
    referrals::Referral,
    withdrawals::{NewWithdrawal, WithdrawalRequest},
};

const ACCOUNT_COLUMNS: &str = "id, username, email, phone_number, referral_code, points, level, \
     is_superuser, can_create_post, can_create_product, created_at, updated_at";

const WITHDRAWAL_COLUMNS: &str =
    "id, account_id, points, money_amount, is_processed, created_at, processed_at";

#[derive(Clone)]
pub struct PgLedgerStore {
    conn: PgPool,
}

impl PgLedgerStore {
    pub fn new(conn: PgPool) -> Self {
        PgLedgerStore { conn }
    }

    pub async fn migrate(&self) -> Result<(), anyhow::Error> {
        sqlx::migrate!("./migrations").run(&self.conn).await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Transaction = PgLedgerTransaction;

    async fn begin(&self) -> Result<PgLedgerTransaction, StoreError> {
        let tx = self.conn.begin().await?;
        Ok(PgLedgerTransaction { tx })
    }
}

pub struct PgLedgerTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTransaction for PgLedgerTransaction {
    async fn create_account(&mut self, account: &NewAccount) -> Result<Account, StoreError> {
        let account = sqlx::query_as::<_, Account>(&format!(
            r#"INSERT INTO accounts
            (id, username, email, phone_number, referral_code, is_superuser)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}"#,
            ACCOUNT_COLUMNS
        ))
        .bind(&account.id)
        .bind(&account.username)
        .bind(&account.email)
        .bind(&account.phone_number)
        .bind(&account.referral_code)
        .bind(account.is_superuser)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(account)
    }

    async fn get_account(&mut self, id: &str) -> Result<Option<Account>, StoreError> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(account)
    }

    async fn get_account_for_update(&mut self, id: &str) -> Result<Option<Account>, StoreError> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts WHERE id = $1 FOR UPDATE",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(account)
    }

    async fn find_account_by_referral_code(
        &mut self,
        code: &str,
    ) -> Result<Option<Account>, StoreError> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts WHERE referral_code = $1 FOR UPDATE",
            ACCOUNT_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(account)
    }

    async fn list_accounts(&mut self) -> Result<Vec<Account>, StoreError> {
        let accounts = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts ORDER BY created_at, username",
            ACCOUNT_COLUMNS
        ))
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(accounts)
    }

    async fn save_account(&mut self, account: &Account) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"UPDATE accounts
            SET points = $1, level = $2, can_create_post = $3, can_create_product = $4,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $5"#,
        )
        .bind(account.points)
        .bind(account.level)
        .bind(account.can_create_post)
        .bind(account.can_create_product)
        .bind(&account.id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(account.id.clone()));
        }

        Ok(())
    }

    async fn create_referral(
        &mut self,
        referrer_id: &str,
        referred_id: &str,
    ) -> Result<Referral, StoreError> {
        let referral_id = Uuid::new_v4().hyphenated().to_string();

        let referral = sqlx::query_as::<_, Referral>(
            r#"INSERT INTO referrals (id, referrer_id, referred_id)
            VALUES ($1, $2, $3)
            RETURNING id, referrer_id, referred_id, created_at"#,
        )
        .bind(referral_id)
        .bind(referrer_id)
        .bind(referred_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(referral)
    }

    async fn count_referrals_as_referrer(&mut self, account_id: &str) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM referrals WHERE referrer_id = $1")
            .bind(account_id)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(count)
    }

    async fn list_referrals_as_referrer(
        &mut self,
        account_id: &str,
    ) -> Result<Vec<Referral>, StoreError> {
        let referrals = sqlx::query_as::<_, Referral>(
            r#"SELECT id, referrer_id, referred_id, created_at
            FROM referrals WHERE referrer_id = $1 ORDER BY created_at"#,
        )
        .bind(account_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(referrals)
    }

    async fn list_referrals_as_referred(
        &mut self,
        account_id: &str,
    ) -> Result<Vec<Referral>, StoreError> {
        let referrals = sqlx::query_as::<_, Referral>(
            r#"SELECT id, referrer_id, referred_id, created_at
            FROM referrals WHERE referred_id = $1 ORDER BY created_at"#,
        )
        .bind(account_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(referrals)
    }

    async fn create_withdrawal(
        &mut self,
        withdrawal: &NewWithdrawal,
    ) -> Result<WithdrawalRequest, StoreError> {
        let withdrawal = sqlx::query_as::<_, WithdrawalRequest>(&format!(
            r#"INSERT INTO withdrawals (id, account_id, points, money_amount, is_processed)
            VALUES ($1, $2, $3, $4, false)
            RETURNING {}"#,
            WITHDRAWAL_COLUMNS
        ))
        .bind(&withdrawal.id)
        .bind(&withdrawal.account_id)
        .bind(withdrawal.points)
        .bind(withdrawal.money_amount)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(withdrawal)
    }

    async fn get_withdrawal(&mut self, id: &str) -> Result<Option<WithdrawalRequest>, StoreError> {
        let withdrawal = sqlx::query_as::<_, WithdrawalRequest>(&format!(
            "SELECT {} FROM withdrawals WHERE id = $1 FOR UPDATE",
            WITHDRAWAL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(withdrawal)
    }

    async fn save_withdrawal(&mut self, withdrawal: &WithdrawalRequest) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE withdrawals SET is_processed = $1, processed_at = $2 WHERE id = $3",
        )
        .bind(withdrawal.is_processed)
        .bind(withdrawal.processed_at)
        .bind(&withdrawal.id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(withdrawal.id.clone()));
        }

        Ok(())
    }

    async fn list_withdrawals(
        &mut self,
        account_id: &str,
        processed: Option<bool>,
    ) -> Result<Vec<WithdrawalRequest>, StoreError> {
        let withdrawals = sqlx::query_as::<_, WithdrawalRequest>(&format!(
            r#"SELECT {} FROM withdrawals
            WHERE account_id = $1 AND ($2::BOOLEAN IS NULL OR is_processed = $2)
            ORDER BY created_at DESC"#,
            WITHDRAWAL_COLUMNS
        ))
        .bind(account_id)
        .bind(processed)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(withdrawals)
    }

    async fn list_pending_withdrawals(&mut self) -> Result<Vec<WithdrawalRequest>, StoreError> {
        let withdrawals = sqlx::query_as::<_, WithdrawalRequest>(&format!(
            "SELECT {} FROM withdrawals WHERE is_processed = false ORDER BY created_at",
            WITHDRAWAL_COLUMNS
        ))
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(withdrawals)
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
