use axum::{
    extract::{rejection::JsonRejection, FromRequestParts},
    http::{request::Parts, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tower_http::trace::TraceLayer;

use super::{accounts::AccountRequest, ServiceChannels, ServiceError};
use crate::models::claims::Claims;

mod accounts;
mod admin;
mod withdrawals;

/// Header set by the upstream session layer with the caller's account id.
pub const ACCOUNT_HEADER: &str = "x-account-id";

pub type ApiResponse = (StatusCode, Json<Value>);

#[derive(Clone)]
pub struct AppState {
    channels: ServiceChannels,
}

/// The caller's claims. Requests without [`ACCOUNT_HEADER`] are anonymous;
/// an id that resolves to no account is rejected.
pub struct Actor(pub Claims);

impl FromRequestParts<AppState> for Actor {
    type Rejection = ApiResponse;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(ACCOUNT_HEADER) else {
            return Ok(Actor(Claims::anonymous()));
        };

        let account_id = value
            .to_str()
            .map_err(|_| unauthenticated("Malformed account header"))?
            .to_string();

        let claims = dispatch(&state.channels.accounts, |response| {
            AccountRequest::ResolveClaims {
                account_id,
                response,
            }
        })
        .await;

        match claims {
            Ok(claims) => Ok(Actor(claims)),
            Err(ServiceError::NotFound(_)) => Err(unauthenticated("Unknown account")),
            Err(e) => Err(error_response(e)),
        }
    }
}

/// Sends a request to a service and waits for its answer.
async fn dispatch<R, T>(
    channel: &mpsc::Sender<R>,
    request: impl FnOnce(oneshot::Sender<Result<T, ServiceError>>) -> R,
) -> Result<T, ServiceError> {
    let (response_tx, response_rx) = oneshot::channel();

    channel
        .send(request(response_tx))
        .await
        .map_err(|e| ServiceError::Communication("HTTP".to_string(), e.to_string()))?;

    response_rx
        .await
        .map_err(|e| ServiceError::Communication("HTTP".to_string(), e.to_string()))?
}

fn status_for(error: &ServiceError) -> StatusCode {
    match error {
        ServiceError::InvalidAmount(_) | ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::Unauthorized => StatusCode::FORBIDDEN,
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::AlreadyProcessed(_) | ServiceError::Conflict(_) => StatusCode::CONFLICT,
        ServiceError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::Database(_) | ServiceError::Communication(_, _) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(error: ServiceError) -> ApiResponse {
    let status = status_for(&error);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        log::error!("Request failed: {}", error);
    }

    (
        status,
        Json(json!({
            "error": status.canonical_reason().unwrap_or("Error"),
            "details": error.to_string()
        })),
    )
}

fn unauthenticated(details: &str) -> ApiResponse {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "Unauthorized",
            "details": details
        })),
    )
}

/// Unwraps a JSON body, turning axum's rejection into a 400 with the usual
/// error shape.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiResponse> {
    body.map(|Json(value)| value)
        .map_err(|e| error_response(ServiceError::Validation(e.body_text())))
}

fn respond<T: serde::Serialize>(
    status: StatusCode,
    result: Result<T, ServiceError>,
) -> ApiResponse {
    match result {
        Ok(body) => (status, Json(json!(body))),
        Err(e) => error_response(e),
    }
}

pub fn router(channels: ServiceChannels) -> Router {
    let app_state = AppState { channels };

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/accounts", post(accounts::register))
        .route("/accounts/{id}", get(accounts::get_account))
        .route("/accounts/{id}/referrals", get(accounts::list_referrals))
        .route("/accounts/{id}/referred-by", get(accounts::list_referred_by))
        .route("/accounts/{id}/ledger", get(withdrawals::get_ledger))
        .route(
            "/accounts/{id}/withdrawals",
            post(withdrawals::request_withdrawal),
        )
        .route("/me/capabilities", get(accounts::capabilities))
        .route("/admin/dashboard", get(admin::dashboard))
        .route(
            "/admin/accounts/{id}/permissions/{permission}",
            put(admin::toggle_permission),
        )
        .route("/admin/withdrawals/process", post(admin::process_many))
        .route(
            "/admin/withdrawals/{id}/process",
            post(admin::process_withdrawal),
        )
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_http_server(
    channels: ServiceChannels,
    listen: &str,
) -> Result<(), anyhow::Error> {
    let app = router(channels);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::accounts::RegisterAccount;
    use crate::repositories::memory::MemoryLedgerStore;
    use crate::services::{accounts::create_superuser, spawn_services};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn app_with_admin() -> (Router, String) {
        let store = MemoryLedgerStore::new();
        let admin = create_superuser(
            &store,
            &RegisterAccount {
                username: "admin".to_string(),
                email: "admin@example.com".to_string(),
                phone_number: "000".to_string(),
                referral_code: None,
                referrer_code: None,
            },
        )
        .await
        .unwrap();

        (router(spawn_services(store, 16)), admin.id)
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        actor: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(actor) = actor {
            request = request.header(ACCOUNT_HEADER, actor);
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        (status, value)
    }

    async fn register(app: &Router, phone: &str, referrer_code: Option<&str>) -> Value {
        let (status, body) = call(
            app,
            "POST",
            "/accounts",
            None,
            Some(json!({
                "username": format!("user-{}", phone),
                "email": format!("{}@example.com", phone),
                "phone_number": phone,
                "referrer_code": referrer_code,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body
    }

    #[tokio::test]
    async fn health_check() {
        let (app, _) = app_with_admin().await;
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn referral_and_withdrawal_flow() {
        let (app, admin) = app_with_admin().await;
        let referrer = register(&app, "100", None).await["account"]["id"]
            .as_str()
            .unwrap()
            .to_string();
        let referred = register(&app, "200", Some("100")).await;
        assert_eq!(referred["referral"]["referrer_id"], json!(referrer));

        let withdrawals_uri = format!("/accounts/{}/withdrawals", referrer);
        let (status, _) = call(
            &app,
            "POST",
            &withdrawals_uri,
            Some(&referrer),
            Some(json!({ "points": 10 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = call(
            &app,
            "POST",
            &withdrawals_uri,
            Some(&referrer),
            Some(json!({ "points": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, withdrawal) = call(
            &app,
            "POST",
            &withdrawals_uri,
            Some(&referrer),
            Some(json!({ "points": 5 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(withdrawal["money_amount"], json!(5000));
        assert_eq!(withdrawal["is_processed"], json!(false));

        let process_uri = format!(
            "/admin/withdrawals/{}/process",
            withdrawal["id"].as_str().unwrap()
        );
        let (status, _) = call(&app, "POST", &process_uri, Some(&referrer), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, processed) = call(&app, "POST", &process_uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(processed["is_processed"], json!(true));

        let (status, _) = call(&app, "POST", &process_uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, ledger) = call(
            &app,
            "GET",
            &format!("/accounts/{}/ledger", referrer),
            Some(&referrer),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ledger["points"], json!(0));
        assert_eq!(ledger["remaining_points"], json!(0));
        assert_eq!(ledger["withdrawals"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_account_header_is_unauthenticated() {
        let (app, _) = app_with_admin().await;
        let (status, _) = call(&app, "GET", "/me/capabilities", Some("ghost"), None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_toggles_capabilities() {
        let (app, admin) = app_with_admin().await;
        let member = register(&app, "100", None).await["account"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let (_, capabilities) = call(&app, "GET", "/me/capabilities", Some(&member), None).await;
        assert_eq!(capabilities["can_create_post"], json!(false));

        let toggle_uri = format!("/admin/accounts/{}/permissions/post", member);
        let (status, _) = call(&app, "PUT", &toggle_uri, Some(&member), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, account) = call(&app, "PUT", &toggle_uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(account["can_create_post"], json!(true));

        let (_, capabilities) = call(&app, "GET", "/me/capabilities", Some(&member), None).await;
        assert_eq!(capabilities["can_create_post"], json!(true));
        assert_eq!(capabilities["can_create_product"], json!(false));

        let (status, dashboard) = call(&app, "GET", "/admin/dashboard", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dashboard["accounts"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn profiles_are_private_to_their_owner() {
        let (app, admin) = app_with_admin().await;
        let owner = register(&app, "100", None).await["account"]["id"]
            .as_str()
            .unwrap()
            .to_string();
        let stranger = register(&app, "200", None).await["account"]["id"]
            .as_str()
            .unwrap()
            .to_string();
        let profile_uri = format!("/accounts/{}", owner);

        let (status, body) = call(&app, "GET", &profile_uri, Some(&stranger), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body.get("phone_number").is_none());

        let (status, _) = call(&app, "GET", &profile_uri, None, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(&app, "GET", &profile_uri, Some(&owner), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phone_number"], json!("100"));

        let (status, _) = call(&app, "GET", &profile_uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_bodies_are_bad_requests() {
        let (app, _) = app_with_admin().await;
        let member = register(&app, "100", None).await["account"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let request = Request::builder()
            .method("POST")
            .uri(format!("/accounts/{}/withdrawals", member))
            .header(ACCOUNT_HEADER, member.as_str())
            .header("content-type", "application/json")
            .body(Body::from("{\"points\": "))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], json!("Bad Request"));
        assert!(body["details"].is_string());

        let (status, body) = call(
            &app,
            "POST",
            "/accounts",
            None,
            Some(json!({ "username": "no-phone" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["details"].is_string());
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let (app, _) = app_with_admin().await;
        register(&app, "100", None).await;

        let (status, _) = call(
            &app,
            "POST",
            "/accounts",
            None,
            Some(json!({
                "username": "again",
                "email": "again@example.com",
                "phone_number": "100",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
