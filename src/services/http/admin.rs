use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::json;

use super::{dispatch, error_response, json_body, respond, Actor, ApiResponse, AppState};
use crate::models::withdrawals::WithdrawalBatch;
use crate::services::{accounts::AccountRequest, withdrawals::WithdrawalServiceRequest};

/// All accounts plus the queue of withdrawals waiting for approval.
pub async fn dashboard(State(state): State<AppState>, Actor(actor): Actor) -> ApiResponse {
    let accounts_actor = actor.clone();
    let accounts = dispatch(&state.channels.accounts, |response| {
        AccountRequest::ListAccounts {
            actor: accounts_actor,
            response,
        }
    })
    .await;
    let accounts = match accounts {
        Ok(accounts) => accounts,
        Err(e) => return error_response(e),
    };

    let pending = dispatch(&state.channels.withdrawals, |response| {
        WithdrawalServiceRequest::ListPending { actor, response }
    })
    .await;

    match pending {
        Ok(pending) => (
            StatusCode::OK,
            Json(json!({
                "accounts": accounts,
                "withdrawal_requests": pending
            })),
        ),
        Err(e) => error_response(e),
    }
}

pub async fn toggle_permission(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path((account_id, permission)): Path<(String, String)>,
) -> ApiResponse {
    let result = dispatch(&state.channels.accounts, |response| {
        AccountRequest::TogglePermission {
            actor,
            account_id,
            permission,
            response,
        }
    })
    .await;

    respond(StatusCode::OK, result)
}

pub async fn process_withdrawal(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(withdrawal_id): Path<String>,
) -> ApiResponse {
    let result = dispatch(&state.channels.withdrawals, |response| {
        WithdrawalServiceRequest::ProcessWithdrawal {
            actor,
            withdrawal_id,
            response,
        }
    })
    .await;

    respond(StatusCode::OK, result)
}

pub async fn process_many(
    State(state): State<AppState>,
    Actor(actor): Actor,
    body: Result<Json<WithdrawalBatch>, JsonRejection>,
) -> ApiResponse {
    let batch = match json_body(body) {
        Ok(batch) => batch,
        Err(rejection) => return rejection,
    };

    let result = dispatch(&state.channels.withdrawals, |response| {
        WithdrawalServiceRequest::ProcessMany {
            actor,
            withdrawal_ids: batch.ids,
            response,
        }
    })
    .await;

    respond(StatusCode::OK, result)
}
