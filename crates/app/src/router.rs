use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;

use jobtrack_auth::TokenService;
use jobtrack_storage::Database;

use crate::{accounts, companies, jobs, telemetry};

/// Shared state handed to every request handler.
///
/// Handlers are stateless between requests; everything durable lives in the
/// database. The clock is injectable so tests control timestamps.
#[derive(Clone)]
pub struct AppState {
    storage: Database,
    tokens: TokenService,
    metrics: PrometheusHandle,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl AppState {
    pub fn new(storage: Database, tokens: TokenService, metrics: PrometheusHandle) -> Self {
        Self {
            storage,
            tokens,
            metrics,
            clock: Arc::new(Utc::now),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/auth/register", post(accounts::register))
        .route("/auth/login", post(accounts::login))
        .route("/auth/refresh", post(accounts::refresh))
        .route("/auth/me", get(accounts::me))
        .route("/auth/admin-only", get(accounts::admin_only))
        .route("/companies", post(companies::create).get(companies::list))
        .route("/jobs", post(jobs::create).get(jobs::list))
        .route("/jobs/:job_id/status", patch(jobs::update_status))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(body))
        .unwrap()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use axum::http::{HeaderValue, Method, Request};
    use chrono::Duration;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    pub(crate) struct TestApp {
        pub router: Router,
        pub state: AppState,
        _dir: TempDir,
    }

    pub(crate) async fn test_app() -> TestApp {
        test_app_with_clock(Arc::new(Utc::now)).await
    }

    pub(crate) async fn test_app_with_clock(
        clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    ) -> TestApp {
        let metrics = telemetry::init_metrics().expect("metrics init");
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("test.db").display());
        let database = Database::connect(&url).await.expect("connect");
        database.run_migrations().await.expect("migrations");

        let tokens = TokenService::new(b"test-secret", Duration::hours(1), Duration::days(7));
        let state = AppState::new(database, tokens, metrics).with_clock(clock);
        TestApp {
            router: app_router(state.clone()),
            state,
            _dir: dir,
        }
    }

    /// Drives one request through the router and decodes the JSON body.
    pub(crate) async fn send(
        router: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(
                header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}")).expect("header value"),
            );
        }
        let request = match body {
            Some(value) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(value.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        let response = router
            .clone()
            .oneshot(request)
            .await
            .expect("handler should respond");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should read")
            .to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Registers a fresh account and returns its access token.
    pub(crate) async fn register_and_login(router: &Router, email: &str) -> String {
        let (status, _) = send(
            router,
            Method::POST,
            "/auth/register",
            None,
            Some(json!({"email": email, "password": "123456"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(
            router,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": email, "password": "123456"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["access_token"].as_str().expect("token").to_string()
    }
}
