use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};

use super::{dispatch, json_body, respond, Actor, ApiResponse, AppState};
use crate::models::withdrawals::WithdrawalAmount;
use crate::services::withdrawals::WithdrawalServiceRequest;

pub async fn request_withdrawal(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(account_id): Path<String>,
    body: Result<Json<WithdrawalAmount>, JsonRejection>,
) -> ApiResponse {
    let amount = match json_body(body) {
        Ok(amount) => amount,
        Err(rejection) => return rejection,
    };

    let result = dispatch(&state.channels.withdrawals, |response| {
        WithdrawalServiceRequest::RequestWithdrawal {
            actor,
            account_id,
            points: amount.points,
            response,
        }
    })
    .await;

    respond(StatusCode::CREATED, result)
}

pub async fn get_ledger(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(account_id): Path<String>,
) -> ApiResponse {
    let result = dispatch(&state.channels.withdrawals, |response| {
        WithdrawalServiceRequest::GetLedger {
            actor,
            account_id,
            response,
        }
    })
    .await;

    respond(StatusCode::OK, result)
}
