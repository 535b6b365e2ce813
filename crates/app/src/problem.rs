use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Body of every error response, serialized as application/problem+json.
#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    detail: String,
}

/// HTTP error response shared by every endpoint, so the error shape is
/// identical across the API.
#[derive(Debug)]
pub struct ProblemResponse {
    status: StatusCode,
    body: ProblemDetails,
}

impl ProblemResponse {
    pub fn new<S: Into<String>>(status: StatusCode, problem_type: &'static str, detail: S) -> Self {
        Self {
            status,
            body: ProblemDetails {
                problem_type,
                title: status.canonical_reason().unwrap_or("error"),
                detail: detail.into(),
            },
        }
    }

    /// Malformed or semantically invalid input, including disallowed
    /// status transitions. Recoverable by correcting the request.
    pub fn validation<S: Into<String>>(detail: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", detail)
    }

    /// Entity missing, or owned by someone else. The two cases are merged
    /// on purpose: ownership failures must not leak existence.
    pub fn not_found<S: Into<String>>(detail: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", detail)
    }

    /// Uniqueness violation, surfaced by the registration path.
    pub fn conflict<S: Into<String>>(detail: S) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", detail)
    }

    pub fn unauthorized<S: Into<String>>(problem_type: &'static str, detail: S) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, problem_type, detail)
    }

    pub fn forbidden<S: Into<String>>(detail: S) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", detail)
    }

    /// Any unexpected failure. The detail is a fixed string; internals are
    /// logged server-side and never reach the caller.
    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Internal Server Error",
        )
    }

    #[cfg(test)]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ProblemResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_pick_the_expected_status() {
        assert_eq!(ProblemResponse::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ProblemResponse::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ProblemResponse::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(
            ProblemResponse::unauthorized("missing_token", "x").status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ProblemResponse::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ProblemResponse::internal().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_detail_is_fixed() {
        let response = ProblemResponse::internal();
        assert_eq!(response.body.detail, "Internal Server Error");
    }
}
