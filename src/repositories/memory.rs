use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{LedgerStore, LedgerTransaction, StoreError};
use crate::models::{
    accounts::{Account, NewAccount},
    referrals::Referral,
    withdrawals::{NewWithdrawal, WithdrawalRequest},
};

#[derive(Clone, Default)]
struct LedgerState {
    accounts: Vec<Account>,
    referrals: Vec<Referral>,
    withdrawals: Vec<WithdrawalRequest>,
}

/// In-process ledger. Transactions are fully serialized: a transaction owns
/// the state lock from `begin` until it is committed or dropped.
#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        MemoryLedgerStore::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    type Transaction = MemoryLedgerTransaction;

    async fn begin(&self) -> Result<MemoryLedgerTransaction, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();

        Ok(MemoryLedgerTransaction { guard, staged })
    }
}

pub struct MemoryLedgerTransaction {
    guard: OwnedMutexGuard<LedgerState>,
    staged: LedgerState,
}

fn now() -> chrono::NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

#[async_trait]
impl LedgerTransaction for MemoryLedgerTransaction {
    async fn create_account(&mut self, account: &NewAccount) -> Result<Account, StoreError> {
        let accounts = &self.staged.accounts;
        if accounts.iter().any(|a| a.id == account.id) {
            return Err(StoreError::Conflict("accounts_pkey".to_string()));
        }
        if accounts.iter().any(|a| a.phone_number == account.phone_number) {
            return Err(StoreError::Conflict("accounts_phone_number_key".to_string()));
        }
        if accounts.iter().any(|a| a.referral_code == account.referral_code) {
            return Err(StoreError::Conflict("accounts_referral_code_key".to_string()));
        }

        let created_at = now();
        let account = Account {
            id: account.id.clone(),
            username: account.username.clone(),
            email: account.email.clone(),
            phone_number: account.phone_number.clone(),
            referral_code: account.referral_code.clone(),
            points: 0,
            level: 1,
            is_superuser: account.is_superuser,
            can_create_post: false,
            can_create_product: false,
            created_at,
            updated_at: created_at,
        };
        self.staged.accounts.push(account.clone());

        Ok(account)
    }

    async fn get_account(&mut self, id: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.staged.accounts.iter().find(|a| a.id == id).cloned())
    }

    // The transaction already owns the whole state.
    async fn get_account_for_update(&mut self, id: &str) -> Result<Option<Account>, StoreError> {
        self.get_account(id).await
    }

    async fn find_account_by_referral_code(
        &mut self,
        code: &str,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self
            .staged
            .accounts
            .iter()
            .find(|a| a.referral_code == code)
            .cloned())
    }

    async fn list_accounts(&mut self) -> Result<Vec<Account>, StoreError> {
        Ok(self.staged.accounts.clone())
    }

    async fn save_account(&mut self, account: &Account) -> Result<(), StoreError> {
        let stored = self
            .staged
            .accounts
            .iter_mut()
            .find(|a| a.id == account.id)
            .ok_or_else(|| StoreError::Missing(account.id.clone()))?;

        stored.points = account.points;
        stored.level = account.level;
        stored.can_create_post = account.can_create_post;
        stored.can_create_product = account.can_create_product;
        stored.updated_at = now();

        Ok(())
    }

    async fn create_referral(
        &mut self,
        referrer_id: &str,
        referred_id: &str,
    ) -> Result<Referral, StoreError> {
        for id in [referrer_id, referred_id] {
            if !self.staged.accounts.iter().any(|a| a.id == id) {
                return Err(StoreError::Missing(id.to_string()));
            }
        }
        if self.staged.referrals.iter().any(|r| r.referred_id == referred_id) {
            return Err(StoreError::Conflict("referrals_referred_id_key".to_string()));
        }

        let referral = Referral {
            id: Uuid::new_v4().hyphenated().to_string(),
            referrer_id: referrer_id.to_string(),
            referred_id: referred_id.to_string(),
            created_at: now(),
        };
        self.staged.referrals.push(referral.clone());

        Ok(referral)
    }

    async fn count_referrals_as_referrer(&mut self, account_id: &str) -> Result<i64, StoreError> {
        let count = self
            .staged
            .referrals
            .iter()
            .filter(|r| r.referrer_id == account_id)
            .count();

        Ok(count as i64)
    }

    async fn list_referrals_as_referrer(
        &mut self,
        account_id: &str,
    ) -> Result<Vec<Referral>, StoreError> {
        Ok(self
            .staged
            .referrals
            .iter()
            .filter(|r| r.referrer_id == account_id)
            .cloned()
            .collect())
    }

    async fn list_referrals_as_referred(
        &mut self,
        account_id: &str,
    ) -> Result<Vec<Referral>, StoreError> {
        Ok(self
            .staged
            .referrals
            .iter()
            .filter(|r| r.referred_id == account_id)
            .cloned()
            .collect())
    }

    async fn create_withdrawal(
        &mut self,
        withdrawal: &NewWithdrawal,
    ) -> Result<WithdrawalRequest, StoreError> {
        if !self
            .staged
            .accounts
            .iter()
            .any(|a| a.id == withdrawal.account_id)
        {
            return Err(StoreError::Missing(withdrawal.account_id.clone()));
        }

        let withdrawal = WithdrawalRequest {
            id: withdrawal.id.clone(),
            account_id: withdrawal.account_id.clone(),
            points: withdrawal.points,
            money_amount: withdrawal.money_amount,
            is_processed: false,
            created_at: now(),
            processed_at: None,
        };
        self.staged.withdrawals.push(withdrawal.clone());

        Ok(withdrawal)
    }

    async fn get_withdrawal(&mut self, id: &str) -> Result<Option<WithdrawalRequest>, StoreError> {
        Ok(self.staged.withdrawals.iter().find(|w| w.id == id).cloned())
    }

    async fn save_withdrawal(&mut self, withdrawal: &WithdrawalRequest) -> Result<(), StoreError> {
        let stored = self
            .staged
            .withdrawals
            .iter_mut()
            .find(|w| w.id == withdrawal.id)
            .ok_or_else(|| StoreError::Missing(withdrawal.id.clone()))?;

        stored.is_processed = withdrawal.is_processed;
        stored.processed_at = withdrawal.processed_at;

        Ok(())
    }

    async fn list_withdrawals(
        &mut self,
        account_id: &str,
        processed: Option<bool>,
    ) -> Result<Vec<WithdrawalRequest>, StoreError> {
        Ok(self
            .staged
            .withdrawals
            .iter()
            .rev()
            .filter(|w| w.account_id == account_id)
            .filter(|w| processed.map_or(true, |p| w.is_processed == p))
            .cloned()
            .collect())
    }

    async fn list_pending_withdrawals(&mut self) -> Result<Vec<WithdrawalRequest>, StoreError> {
        Ok(self
            .staged
            .withdrawals
            .iter()
            .filter(|w| !w.is_processed)
            .cloned()
            .collect())
    }

    async fn commit(self) -> Result<(), StoreError> {
        let MemoryLedgerTransaction { mut guard, staged } = self;
        *guard = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_account(phone_number: &str) -> NewAccount {
        NewAccount {
            id: Uuid::new_v4().hyphenated().to_string(),
            username: format!("user-{}", phone_number),
            email: format!("{}@example.com", phone_number),
            phone_number: phone_number.to_string(),
            referral_code: phone_number.to_string(),
            is_superuser: false,
        }
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let store = MemoryLedgerStore::new();

        let mut tx = store.begin().await.unwrap();
        let account = tx.create_account(&new_account("100")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let stored = tx.get_account(&account.id).await.unwrap().unwrap();
        assert_eq!(stored.points, 0);
        assert_eq!(stored.level, 1);
        assert_eq!(stored.referral_code, "100");
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = MemoryLedgerStore::new();

        {
            let mut tx = store.begin().await.unwrap();
            tx.create_account(&new_account("100")).await.unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        assert!(tx.list_accounts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_phone_number_conflicts() {
        let store = MemoryLedgerStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.create_account(&new_account("100")).await.unwrap();

        let duplicate = tx.create_account(&new_account("100")).await;
        assert!(matches!(duplicate, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn withdrawal_filters_and_ordering() {
        let store = MemoryLedgerStore::new();
        let mut tx = store.begin().await.unwrap();
        let account = tx.create_account(&new_account("100")).await.unwrap();

        let first = tx
            .create_withdrawal(&NewWithdrawal::new(&account.id, 1))
            .await
            .unwrap();
        let mut second = tx
            .create_withdrawal(&NewWithdrawal::new(&account.id, 2))
            .await
            .unwrap();
        second.is_processed = true;
        tx.save_withdrawal(&second).await.unwrap();

        let all = tx.list_withdrawals(&account.id, None).await.unwrap();
        assert_eq!(all.iter().map(|w| w.points).collect::<Vec<_>>(), vec![2, 1]);

        let pending = tx.list_withdrawals(&account.id, Some(false)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, first.id);

        let queue = tx.list_pending_withdrawals().await.unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn an_account_is_referred_at_most_once() {
        let store = MemoryLedgerStore::new();
        let mut tx = store.begin().await.unwrap();
        let first = tx.create_account(&new_account("100")).await.unwrap();
        let second = tx.create_account(&new_account("200")).await.unwrap();
        let referred = tx.create_account(&new_account("300")).await.unwrap();

        tx.create_referral(&first.id, &referred.id).await.unwrap();
        assert!(matches!(
            tx.create_referral(&second.id, &referred.id).await,
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(
            tx.list_referrals_as_referred(&referred.id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn locking_and_plain_reads_agree() {
        let store = MemoryLedgerStore::new();
        let mut tx = store.begin().await.unwrap();
        let account = tx.create_account(&new_account("100")).await.unwrap();

        let plain = tx.get_account(&account.id).await.unwrap();
        let locked = tx.get_account_for_update(&account.id).await.unwrap();
        assert_eq!(plain, locked);
        assert!(tx.get_account_for_update("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn saving_unknown_account_is_missing() {
        let store = MemoryLedgerStore::new();
        let mut tx = store.begin().await.unwrap();
        let account = tx.create_account(&new_account("100")).await.unwrap();

        let mut ghost = account.clone();
        ghost.id = "ghost".to_string();
        assert!(matches!(
            tx.save_account(&ghost).await,
            Err(StoreError::Missing(_))
        ));
    }
}
