use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{authorization, RequestHandler, Service, ServiceError};
use crate::models::{
    claims::Claims,
    withdrawals::{
        remaining_points, LedgerSummary, NewWithdrawal, ProcessOutcome, WithdrawalRequest,
        WithdrawalStatus, CONVERSION_RATE,
    },
};
use crate::repositories::{LedgerStore, LedgerTransaction};

/// Pending → Processed lifecycle of withdrawal requests.
#[derive(Clone)]
pub struct WithdrawalWorkflow<S> {
    store: S,
}

impl<S: LedgerStore> WithdrawalWorkflow<S> {
    pub fn new(store: S) -> Self {
        WithdrawalWorkflow { store }
    }

    /// Reserves `points` of the account's balance. The account row stays
    /// locked until the request is inserted, so concurrent requests by the
    /// same account cannot overdraw it.
    pub async fn request_withdrawal(
        &self,
        account_id: &str,
        points: i64,
    ) -> Result<WithdrawalRequest, ServiceError> {
        if points <= 0 {
            return Err(ServiceError::InvalidAmount(points));
        }

        let mut tx = self.store.begin().await?;
        let account = tx
            .get_account_for_update(account_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(account_id.to_string()))?;

        let pending = tx.list_withdrawals(account_id, Some(false)).await?;
        let remaining = remaining_points(account.points, &pending);
        if points > remaining {
            log::warn!(
                "Refused withdrawal of {} points for account {}: {} remaining.",
                points,
                account_id,
                remaining
            );
            return Err(ServiceError::InsufficientBalance {
                requested: points,
                remaining,
            });
        }

        let withdrawal = tx
            .create_withdrawal(&NewWithdrawal::new(account_id, points))
            .await?;
        tx.commit().await?;

        log::info!(
            "Withdrawal {} requested by account {}: {} points ({}).",
            withdrawal.id,
            account_id,
            withdrawal.points,
            withdrawal.money_amount
        );

        Ok(withdrawal)
    }

    /// Marks the request processed and deducts its points from the owner.
    /// Both rows are locked for the whole read-check-write sequence; a
    /// concurrent second attempt sees `is_processed` and fails.
    pub async fn process_withdrawal(
        &self,
        withdrawal_id: &str,
        actor: &Claims,
    ) -> Result<WithdrawalRequest, ServiceError> {
        if !authorization::can_process_withdrawal(actor) {
            log::warn!(
                "Account {:?} is not allowed to process withdrawal {}.",
                actor.account_id,
                withdrawal_id
            );
            return Err(ServiceError::Unauthorized);
        }

        let mut tx = self.store.begin().await?;
        let mut withdrawal = tx
            .get_withdrawal(withdrawal_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(withdrawal_id.to_string()))?;

        if withdrawal.status() == WithdrawalStatus::Processed {
            return Err(ServiceError::AlreadyProcessed(withdrawal_id.to_string()));
        }

        let mut account = tx
            .get_account_for_update(&withdrawal.account_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(withdrawal.account_id.clone()))?;

        if account.points < withdrawal.points {
            return Err(ServiceError::InsufficientBalance {
                requested: withdrawal.points,
                remaining: account.points,
            });
        }

        log::info!(
            "Starting processing of withdrawal {} for account {}.",
            withdrawal.id,
            account.id
        );

        withdrawal.is_processed = true;
        withdrawal.processed_at = Some(chrono::Utc::now().naive_utc());
        tx.save_withdrawal(&withdrawal).await?;

        account.points -= withdrawal.points;
        tx.save_account(&account).await?;
        tx.commit().await?;

        log::info!(
            "Deducted {} points from account {}, new balance: {}.",
            withdrawal.points,
            account.id,
            account.points
        );

        Ok(withdrawal)
    }

    /// Processes each id in its own transaction; one failure does not stop
    /// the rest of the batch.
    pub async fn process_many(
        &self,
        withdrawal_ids: &[String],
        actor: &Claims,
    ) -> Result<Vec<ProcessOutcome>, ServiceError> {
        if !authorization::can_process_withdrawal(actor) {
            return Err(ServiceError::Unauthorized);
        }

        let mut outcomes = Vec::with_capacity(withdrawal_ids.len());
        for withdrawal_id in withdrawal_ids {
            let outcome = match self.process_withdrawal(withdrawal_id, actor).await {
                Ok(withdrawal) => ProcessOutcome {
                    withdrawal_id: withdrawal_id.clone(),
                    withdrawal: Some(withdrawal),
                    error: None,
                },
                Err(e) => ProcessOutcome {
                    withdrawal_id: withdrawal_id.clone(),
                    withdrawal: None,
                    error: Some(e.to_string()),
                },
            };
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    pub async fn ledger(&self, account_id: &str) -> Result<LedgerSummary, ServiceError> {
        let mut tx = self.store.begin().await?;
        let account = tx
            .get_account(account_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(account_id.to_string()))?;

        let withdrawals = tx.list_withdrawals(account_id, None).await?;
        let remaining = remaining_points(account.points, &withdrawals);

        Ok(LedgerSummary {
            account_id: account.id,
            points: account.points,
            remaining_points: remaining,
            remaining_balance: remaining * CONVERSION_RATE,
            withdrawals,
        })
    }

    pub async fn list_pending(&self) -> Result<Vec<WithdrawalRequest>, ServiceError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_pending_withdrawals().await?)
    }
}

pub enum WithdrawalServiceRequest {
    RequestWithdrawal {
        actor: Claims,
        account_id: String,
        points: i64,
        response: oneshot::Sender<Result<WithdrawalRequest, ServiceError>>,
    },
    ProcessWithdrawal {
        actor: Claims,
        withdrawal_id: String,
        response: oneshot::Sender<Result<WithdrawalRequest, ServiceError>>,
    },
    ProcessMany {
        actor: Claims,
        withdrawal_ids: Vec<String>,
        response: oneshot::Sender<Result<Vec<ProcessOutcome>, ServiceError>>,
    },
    GetLedger {
        actor: Claims,
        account_id: String,
        response: oneshot::Sender<Result<LedgerSummary, ServiceError>>,
    },
    ListPending {
        actor: Claims,
        response: oneshot::Sender<Result<Vec<WithdrawalRequest>, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct WithdrawalRequestHandler<S> {
    workflow: WithdrawalWorkflow<S>,
}

impl<S: LedgerStore> WithdrawalRequestHandler<S> {
    pub fn new(store: S) -> Self {
        let workflow = WithdrawalWorkflow::new(store);

        WithdrawalRequestHandler { workflow }
    }

    async fn request_withdrawal(
        &self,
        actor: &Claims,
        account_id: &str,
        points: i64,
    ) -> Result<WithdrawalRequest, ServiceError> {
        if !authorization::can_request_withdrawal(actor, account_id) {
            return Err(ServiceError::Unauthorized);
        }

        self.workflow.request_withdrawal(account_id, points).await
    }

    async fn get_ledger(
        &self,
        actor: &Claims,
        account_id: &str,
    ) -> Result<LedgerSummary, ServiceError> {
        if !authorization::can_view_account(actor, account_id) {
            return Err(ServiceError::Unauthorized);
        }

        self.workflow.ledger(account_id).await
    }

    async fn list_pending(&self, actor: &Claims) -> Result<Vec<WithdrawalRequest>, ServiceError> {
        if !authorization::can_process_withdrawal(actor) {
            return Err(ServiceError::Unauthorized);
        }

        self.workflow.list_pending().await
    }
}

#[async_trait]
impl<S: LedgerStore> RequestHandler<WithdrawalServiceRequest> for WithdrawalRequestHandler<S> {
    async fn handle_request(&self, request: WithdrawalServiceRequest) {
        match request {
            WithdrawalServiceRequest::RequestWithdrawal {
                actor,
                account_id,
                points,
                response,
            } => {
                let result = self.request_withdrawal(&actor, &account_id, points).await;
                let _ = response.send(result);
            }
            WithdrawalServiceRequest::ProcessWithdrawal {
                actor,
                withdrawal_id,
                response,
            } => {
                let result = self.workflow.process_withdrawal(&withdrawal_id, &actor).await;
                let _ = response.send(result);
            }
            WithdrawalServiceRequest::ProcessMany {
                actor,
                withdrawal_ids,
                response,
            } => {
                let result = self.workflow.process_many(&withdrawal_ids, &actor).await;
                let _ = response.send(result);
            }
            WithdrawalServiceRequest::GetLedger {
                actor,
                account_id,
                response,
            } => {
                let result = self.get_ledger(&actor, &account_id).await;
                let _ = response.send(result);
            }
            WithdrawalServiceRequest::ListPending { actor, response } => {
                let result = self.list_pending(&actor).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct WithdrawalService;

impl WithdrawalService {
    pub fn new() -> Self {
        WithdrawalService {}
    }
}

#[async_trait]
impl<S: LedgerStore> Service<WithdrawalServiceRequest, WithdrawalRequestHandler<S>>
    for WithdrawalService
{
}
