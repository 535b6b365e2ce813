use axum::http::{header, HeaderMap};
use metrics::counter;
use tracing::debug;

use jobtrack_auth::{Identity, TokenUse};

use crate::problem::ProblemResponse;
use crate::router::AppState;

/// Authenticates the request with an access token.
///
/// The verified subject claim supplies the user id; downstream code trusts
/// it unconditionally and never re-authenticates.
pub fn require_identity(state: &AppState, headers: &HeaderMap) -> Result<Identity, ProblemResponse> {
    verify_bearer(state, headers, TokenUse::Access)
}

/// Authenticates the request with a refresh token.
pub fn require_refresh(state: &AppState, headers: &HeaderMap) -> Result<Identity, ProblemResponse> {
    verify_bearer(state, headers, TokenUse::Refresh)
}

/// Gates a route on the role claim carried by the token.
pub fn require_role(identity: &Identity, role: &str) -> Result<(), ProblemResponse> {
    if identity.role == role {
        Ok(())
    } else {
        Err(ProblemResponse::forbidden("insufficient role"))
    }
}

fn verify_bearer(
    state: &AppState,
    headers: &HeaderMap,
    token_use: TokenUse,
) -> Result<Identity, ProblemResponse> {
    let Some(token) = bearer_token(headers) else {
        counter!("auth_failures_total", "reason" => "missing_token").increment(1);
        return Err(ProblemResponse::unauthorized(
            "missing_token",
            "missing bearer token",
        ));
    };

    state
        .tokens()
        .verify(token, token_use, state.now())
        .map_err(|err| {
            counter!("auth_failures_total", "reason" => "invalid_token").increment(1);
            debug!(error = %err, "rejected bearer token");
            ProblemResponse::unauthorized("invalid_token", "invalid or expired token")
        })
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}
