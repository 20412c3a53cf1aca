use super::ServiceError;
use crate::models::{
    accounts::{Account, NewAccount, RegisterAccount, Registration},
    referrals::{level_for, Referral, REFERRAL_BONUS},
};
use crate::repositories::{LedgerStore, LedgerTransaction};

/// Links referrers to the accounts they bring in and keeps referrer levels
/// in step with their referral counts.
#[derive(Clone)]
pub struct ReferralEngine<S> {
    store: S,
}

impl<S: LedgerStore> ReferralEngine<S> {
    pub fn new(store: S) -> Self {
        ReferralEngine { store }
    }

    /// Creates the account and applies `referrer_code` in one transaction.
    pub async fn register(
        &self,
        registration: &RegisterAccount,
    ) -> Result<Registration, ServiceError> {
        let new_account =
            NewAccount::from_registration(registration).map_err(ServiceError::Validation)?;

        let mut tx = self.store.begin().await?;
        let account = tx.create_account(&new_account).await?;
        let referral =
            link_referral(&mut tx, &account, registration.referrer_code.as_deref()).await?;
        tx.commit().await?;

        log::info!(
            "Registered account {} ({}), referral code {}.",
            account.id,
            account.username,
            account.referral_code
        );

        Ok(Registration { account, referral })
    }

    /// An empty or unknown code is not an error; nothing is recorded. An
    /// account that already has a referrer keeps it.
    pub async fn register_with_referral(
        &self,
        new_account: &Account,
        referral_code: Option<&str>,
    ) -> Result<Option<Referral>, ServiceError> {
        let mut tx = self.store.begin().await?;
        let referral = link_referral(&mut tx, new_account, referral_code).await?;
        tx.commit().await?;

        Ok(referral)
    }

    pub async fn recompute_level(&self, account_id: &str) -> Result<i32, ServiceError> {
        let mut tx = self.store.begin().await?;
        let mut account = tx
            .get_account_for_update(account_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(account_id.to_string()))?;

        let level = update_level(&mut tx, &mut account).await?;
        tx.save_account(&account).await?;
        tx.commit().await?;

        Ok(level)
    }

    pub async fn list_referrals(&self, account_id: &str) -> Result<Vec<Referral>, ServiceError> {
        let mut tx = self.store.begin().await?;
        ensure_account(&mut tx, account_id).await?;

        Ok(tx.list_referrals_as_referrer(account_id).await?)
    }

    pub async fn list_referred_by(&self, account_id: &str) -> Result<Vec<Referral>, ServiceError> {
        let mut tx = self.store.begin().await?;
        ensure_account(&mut tx, account_id).await?;

        Ok(tx.list_referrals_as_referred(account_id).await?)
    }
}

async fn ensure_account<T: LedgerTransaction>(
    tx: &mut T,
    account_id: &str,
) -> Result<Account, ServiceError> {
    tx.get_account(account_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(account_id.to_string()))
}

async fn link_referral<T: LedgerTransaction>(
    tx: &mut T,
    new_account: &Account,
    referral_code: Option<&str>,
) -> Result<Option<Referral>, ServiceError> {
    let code = match referral_code.map(str::trim) {
        Some(code) if !code.is_empty() => code,
        _ => return Ok(None),
    };

    let Some(mut referrer) = tx.find_account_by_referral_code(code).await? else {
        log::info!("Referral code {} matched no account, ignoring.", code);
        return Ok(None);
    };

    if referrer.id == new_account.id {
        log::warn!("Account {} tried to refer itself, ignoring.", new_account.id);
        return Ok(None);
    }

    if !tx.list_referrals_as_referred(&new_account.id).await?.is_empty() {
        log::warn!(
            "Account {} already has a referrer, ignoring code {}.",
            new_account.id,
            code
        );
        return Ok(None);
    }

    let referral = tx.create_referral(&referrer.id, &new_account.id).await?;
    referrer.points += REFERRAL_BONUS;
    update_level(tx, &mut referrer).await?;
    tx.save_account(&referrer).await?;

    log::info!(
        "Account {} referred {}: +{} points (now {}), level {}.",
        referrer.id,
        new_account.id,
        REFERRAL_BONUS,
        referrer.points,
        referrer.level
    );

    Ok(Some(referral))
}

async fn update_level<T: LedgerTransaction>(
    tx: &mut T,
    account: &mut Account,
) -> Result<i32, ServiceError> {
    let referral_count = tx.count_referrals_as_referrer(&account.id).await?;
    account.level = level_for(referral_count, account.level);

    Ok(account.level)
}
