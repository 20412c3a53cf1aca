use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{authorization, referrals::ReferralEngine, RequestHandler, Service, ServiceError};
use crate::models::{
    accounts::{Account, NewAccount, Permission, RegisterAccount, Registration},
    claims::Claims,
    referrals::Referral,
};
use crate::repositories::{LedgerStore, LedgerTransaction};

/// Inserts an account with elevated privilege. Only reachable from the
/// command line, never from the HTTP surface.
pub async fn create_superuser<S: LedgerStore>(
    store: &S,
    registration: &RegisterAccount,
) -> Result<Account, ServiceError> {
    let mut new_account =
        NewAccount::from_registration(registration).map_err(ServiceError::Validation)?;
    new_account.is_superuser = true;

    let mut tx = store.begin().await?;
    let account = tx.create_account(&new_account).await?;
    tx.commit().await?;

    log::info!("Created superuser {} ({}).", account.id, account.username);

    Ok(account)
}

pub enum AccountRequest {
    Register {
        registration: RegisterAccount,
        response: oneshot::Sender<Result<Registration, ServiceError>>,
    },
    GetAccount {
        actor: Claims,
        account_id: String,
        response: oneshot::Sender<Result<Account, ServiceError>>,
    },
    ResolveClaims {
        account_id: String,
        response: oneshot::Sender<Result<Claims, ServiceError>>,
    },
    ListAccounts {
        actor: Claims,
        response: oneshot::Sender<Result<Vec<Account>, ServiceError>>,
    },
    TogglePermission {
        actor: Claims,
        account_id: String,
        permission: String,
        response: oneshot::Sender<Result<Account, ServiceError>>,
    },
    ListReferrals {
        actor: Claims,
        account_id: String,
        response: oneshot::Sender<Result<Vec<Referral>, ServiceError>>,
    },
    ListReferredBy {
        actor: Claims,
        account_id: String,
        response: oneshot::Sender<Result<Vec<Referral>, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct AccountRequestHandler<S> {
    store: S,
    referrals: ReferralEngine<S>,
}

impl<S: LedgerStore> AccountRequestHandler<S> {
    pub fn new(store: S) -> Self {
        let referrals = ReferralEngine::new(store.clone());

        AccountRequestHandler { store, referrals }
    }

    async fn find_account(&self, account_id: &str) -> Result<Account, ServiceError> {
        let mut tx = self.store.begin().await?;
        tx.get_account(account_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(account_id.to_string()))
    }

    async fn get_account(
        &self,
        actor: &Claims,
        account_id: &str,
    ) -> Result<Account, ServiceError> {
        if !authorization::can_view_account(actor, account_id) {
            return Err(ServiceError::Unauthorized);
        }

        self.find_account(account_id).await
    }

    async fn resolve_claims(&self, account_id: &str) -> Result<Claims, ServiceError> {
        let account = self.find_account(account_id).await?;

        Ok(Claims::for_account(&account))
    }

    async fn list_accounts(&self, actor: &Claims) -> Result<Vec<Account>, ServiceError> {
        if !authorization::can_toggle_permissions(actor) {
            return Err(ServiceError::Unauthorized);
        }

        let mut tx = self.store.begin().await?;
        Ok(tx.list_accounts().await?)
    }

    async fn toggle_permission(
        &self,
        actor: &Claims,
        account_id: &str,
        permission: &str,
    ) -> Result<Account, ServiceError> {
        if !authorization::can_toggle_permissions(actor) {
            return Err(ServiceError::Unauthorized);
        }

        let permission: Permission = permission.parse().map_err(ServiceError::Validation)?;

        let mut tx = self.store.begin().await?;
        let mut account = tx
            .get_account_for_update(account_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(account_id.to_string()))?;

        account.toggle_permission(permission);
        tx.save_account(&account).await?;
        tx.commit().await?;

        log::info!(
            "Permission {} for account {} set to {}.",
            permission,
            account.id,
            account.has_permission(permission)
        );

        Ok(account)
    }

    async fn list_referrals(
        &self,
        actor: &Claims,
        account_id: &str,
        as_referrer: bool,
    ) -> Result<Vec<Referral>, ServiceError> {
        if !authorization::can_view_account(actor, account_id) {
            return Err(ServiceError::Unauthorized);
        }

        if as_referrer {
            self.referrals.list_referrals(account_id).await
        } else {
            self.referrals.list_referred_by(account_id).await
        }
    }
}

#[async_trait]
impl<S: LedgerStore> RequestHandler<AccountRequest> for AccountRequestHandler<S> {
    async fn handle_request(&self, request: AccountRequest) {
        match request {
            AccountRequest::Register {
                registration,
                response,
            } => {
                let result = self.referrals.register(&registration).await;
                let _ = response.send(result);
            }
            AccountRequest::GetAccount {
                actor,
                account_id,
                response,
            } => {
                let account = self.get_account(&actor, &account_id).await;
                let _ = response.send(account);
            }
            AccountRequest::ResolveClaims {
                account_id,
                response,
            } => {
                let claims = self.resolve_claims(&account_id).await;
                let _ = response.send(claims);
            }
            AccountRequest::ListAccounts { actor, response } => {
                let accounts = self.list_accounts(&actor).await;
                let _ = response.send(accounts);
            }
            AccountRequest::TogglePermission {
                actor,
                account_id,
                permission,
                response,
            } => {
                let result = self
                    .toggle_permission(&actor, &account_id, &permission)
                    .await;
                let _ = response.send(result);
            }
            AccountRequest::ListReferrals {
                actor,
                account_id,
                response,
            } => {
                let referrals = self.list_referrals(&actor, &account_id, true).await;
                let _ = response.send(referrals);
            }
            AccountRequest::ListReferredBy {
                actor,
                account_id,
                response,
            } => {
                let referrals = self.list_referrals(&actor, &account_id, false).await;
                let _ = response.send(referrals);
            }
        }
    }
}

pub struct AccountService;

impl AccountService {
    pub fn new() -> Self {
        AccountService {}
    }
}

#[async_trait]
impl<S: LedgerStore> Service<AccountRequest, AccountRequestHandler<S>> for AccountService {}
