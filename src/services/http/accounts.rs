use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::json;

use super::{dispatch, json_body, respond, Actor, ApiResponse, AppState};
use crate::models::accounts::RegisterAccount;
use crate::services::{accounts::AccountRequest, authorization};

pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterAccount>, JsonRejection>,
) -> ApiResponse {
    let registration = match json_body(body) {
        Ok(registration) => registration,
        Err(rejection) => return rejection,
    };

    let result = dispatch(&state.channels.accounts, |response| {
        AccountRequest::Register {
            registration,
            response,
        }
    })
    .await;

    respond(StatusCode::CREATED, result)
}

pub async fn get_account(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(account_id): Path<String>,
) -> ApiResponse {
    let result = dispatch(&state.channels.accounts, |response| {
        AccountRequest::GetAccount {
            actor,
            account_id,
            response,
        }
    })
    .await;

    respond(StatusCode::OK, result)
}

pub async fn list_referrals(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(account_id): Path<String>,
) -> ApiResponse {
    let result = dispatch(&state.channels.accounts, |response| {
        AccountRequest::ListReferrals {
            actor,
            account_id,
            response,
        }
    })
    .await;

    respond(StatusCode::OK, result)
}

pub async fn list_referred_by(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(account_id): Path<String>,
) -> ApiResponse {
    let result = dispatch(&state.channels.accounts, |response| {
        AccountRequest::ListReferredBy {
            actor,
            account_id,
            response,
        }
    })
    .await;

    respond(StatusCode::OK, result)
}

pub async fn capabilities(Actor(actor): Actor) -> ApiResponse {
    (
        StatusCode::OK,
        Json(json!({
            "account_id": actor.account_id,
            "authenticated": actor.is_authenticated(),
            "can_create_post": authorization::can_create_post(&actor),
            "can_create_product": authorization::can_create_product(&actor),
            "can_toggle_permissions": authorization::can_toggle_permissions(&actor),
            "can_process_withdrawal": authorization::can_process_withdrawal(&actor),
        })),
    )
}
