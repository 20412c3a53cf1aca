use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::repositories::{LedgerStore, StoreError};
use crate::settings::Settings;

pub mod accounts;
pub mod authorization;
pub mod http;
pub mod referrals;
pub mod withdrawals;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),
    #[error("Insufficient balance: requested {requested}, remaining {remaining}")]
    InsufficientBalance { requested: i64, remaining: i64 },
    #[error("Withdrawal already processed: {0}")]
    AlreadyProcessed(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Communication error: {0} - {1}")]
    Communication(String, String),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(constraint) => ServiceError::Conflict(constraint),
            StoreError::Missing(id) => ServiceError::NotFound(id),
            StoreError::Database(e) => ServiceError::Database(e.to_string()),
        }
    }
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

/// Senders for every running service. Cloned into each HTTP request.
#[derive(Clone)]
pub struct ServiceChannels {
    pub accounts: mpsc::Sender<accounts::AccountRequest>,
    pub withdrawals: mpsc::Sender<withdrawals::WithdrawalServiceRequest>,
}

pub fn spawn_services<S: LedgerStore>(store: S, channel_capacity: usize) -> ServiceChannels {
    let (account_tx, mut account_rx) = mpsc::channel(channel_capacity);
    let (withdrawal_tx, mut withdrawal_rx) = mpsc::channel(channel_capacity);

    let mut account_service = accounts::AccountService::new();
    let mut withdrawal_service = withdrawals::WithdrawalService::new();

    log::info!("Starting account service.");
    let account_store = store.clone();
    tokio::spawn(async move {
        account_service
            .run(
                accounts::AccountRequestHandler::new(account_store),
                &mut account_rx,
            )
            .await;
    });

    log::info!("Starting withdrawal service.");
    tokio::spawn(async move {
        withdrawal_service
            .run(
                withdrawals::WithdrawalRequestHandler::new(store),
                &mut withdrawal_rx,
            )
            .await;
    });

    ServiceChannels {
        accounts: account_tx,
        withdrawals: withdrawal_tx,
    }
}

pub async fn start_services<S: LedgerStore>(
    store: S,
    settings: &Settings,
) -> Result<(), anyhow::Error> {
    let channels = spawn_services(store, settings.services.channel_capacity);

    log::info!("Starting HTTP server.");
    http::start_http_server(channels, &settings.server.listen).await
}
