use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use jobtrack_auth::{hash_password, verify_password, TokenUse};
use jobtrack_storage::{NewUser, UserError};

use crate::identity::{require_identity, require_refresh, require_role};
use crate::problem::ProblemResponse;
use crate::router::AppState;

const DEFAULT_ROLE: &str = "user";

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let (Some(email), Some(password)) = (
        non_empty(body.email.as_deref()),
        non_empty(body.password.as_deref()),
    ) else {
        return Err(ProblemResponse::validation("email and password required"));
    };
    let role = non_empty(body.role.as_deref()).unwrap_or(DEFAULT_ROLE);

    let password_hash = hash_password(password).await.map_err(|err| {
        error!(error = %err, "password hashing failed");
        ProblemResponse::internal()
    })?;

    let created = state
        .storage()
        .users()
        .insert(NewUser {
            email,
            password_hash: &password_hash,
            role,
            created_at: state.now(),
        })
        .await;

    match created {
        Ok(user_id) => {
            counter!("auth_registrations_total", "result" => "created").increment(1);
            info!(user_id, "user registered");
            Ok((
                StatusCode::CREATED,
                Json(json!({"message": "user registered successfully"})),
            ))
        }
        Err(UserError::DuplicateEmail) => {
            counter!("auth_registrations_total", "result" => "duplicate").increment(1);
            Err(ProblemResponse::conflict("email already exists"))
        }
        Err(err) => {
            error!(error = %err, "failed to persist user");
            Err(ProblemResponse::internal())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Serialize)]
struct TokenPair {
    access_token: String,
    refresh_token: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let (Some(email), Some(password)) = (
        non_empty(body.email.as_deref()),
        non_empty(body.password.as_deref()),
    ) else {
        return Err(invalid_credentials());
    };

    let user = state
        .storage()
        .users()
        .find_by_email(email)
        .await
        .map_err(|err| {
            error!(error = %err, "failed to look up user");
            ProblemResponse::internal()
        })?;
    let Some(user) = user else {
        counter!("auth_logins_total", "result" => "rejected").increment(1);
        return Err(invalid_credentials());
    };

    let matches = verify_password(password, &user.password_hash)
        .await
        .map_err(|err| {
            error!(error = %err, "password verification failed");
            ProblemResponse::internal()
        })?;
    if !matches {
        counter!("auth_logins_total", "result" => "rejected").increment(1);
        return Err(invalid_credentials());
    }

    let now = state.now();
    let access_token = state
        .tokens()
        .issue(user.id, &user.role, TokenUse::Access, now)
        .map_err(|err| {
            error!(error = %err, "failed to sign access token");
            ProblemResponse::internal()
        })?;
    let refresh_token = state
        .tokens()
        .issue(user.id, &user.role, TokenUse::Refresh, now)
        .map_err(|err| {
            error!(error = %err, "failed to sign refresh token");
            ProblemResponse::internal()
        })?;

    counter!("auth_logins_total", "result" => "ok").increment(1);
    info!(user_id = user.id, "user logged in");
    Ok(Json(TokenPair {
        access_token,
        refresh_token,
    }))
}

pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ProblemResponse> {
    let identity = require_refresh(&state, &headers)?;

    let access_token = state
        .tokens()
        .issue(identity.user_id, &identity.role, TokenUse::Access, state.now())
        .map_err(|err| {
            error!(error = %err, "failed to sign access token");
            ProblemResponse::internal()
        })?;

    Ok(Json(json!({"access_token": access_token})))
}

pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ProblemResponse> {
    let identity = require_identity(&state, &headers)?;

    let user = state
        .storage()
        .users()
        .find_by_id(identity.user_id)
        .await
        .map_err(|err| {
            error!(error = %err, "failed to look up user");
            ProblemResponse::internal()
        })?
        .ok_or_else(|| ProblemResponse::not_found("user not found"))?;

    Ok(Json(json!({"id": user.id, "email": user.email})))
}

pub async fn admin_only(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ProblemResponse> {
    let identity = require_identity(&state, &headers)?;
    require_role(&identity, "admin")?;

    Ok(Json(json!({"message": "welcome, admin"})))
}

fn invalid_credentials() -> ProblemResponse {
    // identical response for unknown email and wrong password
    ProblemResponse::unauthorized("invalid_credentials", "invalid email or password")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
