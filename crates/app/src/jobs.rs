use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use metrics::counter;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use jobtrack_core::lifecycle::validate_transition;
use jobtrack_core::types::{JobStatus, SortOrder};
use jobtrack_storage::{JobQuery, NewJobApplication};

use crate::identity::require_identity;
use crate::problem::ProblemResponse;
use crate::router::AppState;

const DEFAULT_PAGE_SIZE: i64 = 10;

/// Creation payload. There is deliberately no status field: every job
/// starts in the initial state, whatever the client sends.
#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    company_id: Option<i64>,
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateJobRequest>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let identity = require_identity(&state, &headers)?;

    let Some(title) = body.title.as_deref().filter(|t| !t.is_empty()) else {
        return Err(ProblemResponse::validation("job title is required"));
    };
    let Some(company_id) = body.company_id else {
        return Err(ProblemResponse::validation("company id is required"));
    };

    // The parent company must belong to the caller. A company owned by
    // someone else reads as missing.
    let company = state
        .storage()
        .companies()
        .find_owned(identity.user_id, company_id)
        .await
        .map_err(|err| {
            error!(error = %err, "failed to resolve company");
            ProblemResponse::internal()
        })?
        .ok_or_else(|| ProblemResponse::not_found("company not found"))?;

    let job = state
        .storage()
        .jobs()
        .insert(NewJobApplication {
            title,
            applied_at: state.now(),
            company_id: company.id,
            user_id: identity.user_id,
        })
        .await
        .map_err(|err| {
            error!(error = %err, "failed to persist job application");
            ProblemResponse::internal()
        })?;

    counter!("jobs_created_total").increment(1);
    info!(
        user_id = identity.user_id,
        job_id = job.id,
        "job application created"
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": job.id,
            "title": job.title,
            "status": job.status,
            "company_id": job.company_id,
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    #[serde(default)]
    status: Option<String>,
}

pub async fn update_status(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let identity = require_identity(&state, &headers)?;

    let Some(raw) = body.status.as_deref() else {
        return Err(ProblemResponse::validation("status is required"));
    };
    let requested: JobStatus = raw.parse().map_err(|_| {
        counter!("job_status_transitions_total", "outcome" => "unknown_status").increment(1);
        ProblemResponse::validation("invalid status")
    })?;

    // Guard, validate and mutate inside one transaction so the transition
    // check runs against the persisted status the update will overwrite.
    let repo = state.storage().jobs();
    let mut tx = repo.begin().await.map_err(|err| {
        error!(error = %err, "failed to begin transaction");
        ProblemResponse::internal()
    })?;

    let job = repo
        .find_owned(&mut tx, identity.user_id, job_id)
        .await
        .map_err(|err| {
            error!(error = %err, "failed to resolve job application");
            ProblemResponse::internal()
        })?
        .ok_or_else(|| {
            counter!("job_status_transitions_total", "outcome" => "not_found").increment(1);
            ProblemResponse::not_found("job not found")
        })?;

    validate_transition(job.status, requested).map_err(|err| {
        counter!("job_status_transitions_total", "outcome" => "rejected").increment(1);
        ProblemResponse::validation(err.to_string())
    })?;

    repo.set_status(&mut tx, job.id, requested)
        .await
        .map_err(|err| {
            error!(error = %err, "failed to update job status");
            ProblemResponse::internal()
        })?;
    tx.commit().await.map_err(|err| {
        error!(error = %err, "failed to commit status update");
        ProblemResponse::internal()
    })?;

    counter!("job_status_transitions_total", "outcome" => "applied").increment(1);
    info!(
        user_id = identity.user_id,
        job_id,
        from = %job.status,
        to = %requested,
        "job status updated"
    );
    Ok(Json(json!({
        "id": job.id,
        "title": job.title,
        "status": requested,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
    #[serde(default)]
    sort: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListJobsQuery>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let identity = require_identity(&state, &headers)?;

    let query = JobQuery {
        status: params.status.as_deref(),
        limit: params.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        offset: params.offset.unwrap_or(0),
        sort: SortOrder::from_param(params.sort.as_deref()),
    };

    let rows = state
        .storage()
        .jobs()
        .list_with_company(identity.user_id, &query)
        .await
        .map_err(|err| {
            error!(error = %err, "failed to list job applications");
            ProblemResponse::internal()
        })?;

    let body: Vec<Value> = rows
        .into_iter()
        .map(|(job, company_name)| {
            json!({
                "id": job.id,
                "title": job.title,
                "status": job.status,
                "company": {"id": job.company_id, "name": company_name},
                "applied_at": job.applied_at,
            })
        })
        .collect();
    Ok(Json(body))
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    };

    use crate::router::testing::{register_and_login, send, test_app, test_app_with_clock, TestApp};
    use axum::http::{Method, StatusCode};
    use chrono::TimeZone;
    use serde_json::{json, Value};

    async fn create_company(app: &TestApp, token: &str, name: &str) -> i64 {
        let (status, body) = send(
            &app.router,
            Method::POST,
            "/companies",
            Some(token),
            Some(json!({"name": name})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_i64().expect("company id")
    }

    async fn create_job(app: &TestApp, token: &str, company_id: i64, title: &str) -> i64 {
        let (status, body) = send(
            &app.router,
            Method::POST,
            "/jobs",
            Some(token),
            Some(json!({"title": title, "company_id": company_id})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_i64().expect("job id")
    }

    async fn patch_status(app: &TestApp, token: &str, job_id: i64, status: &str) -> (StatusCode, Value) {
        send(
            &app.router,
            Method::PATCH,
            &format!("/jobs/{job_id}/status"),
            Some(token),
            Some(json!({"status": status})),
        )
        .await
    }

    async fn list_jobs(app: &TestApp, token: &str, query: &str) -> Vec<Value> {
        let uri = if query.is_empty() {
            "/jobs".to_string()
        } else {
            format!("/jobs?{query}")
        };
        let (status, body) = send(&app.router, Method::GET, &uri, Some(token), None).await;
        assert_eq!(status, StatusCode::OK);
        body.as_array().expect("array").clone()
    }

    #[tokio::test]
    async fn create_requires_title_and_company() {
        let app = test_app().await;
        let token = register_and_login(&app.router, "test@test.com").await;
        let company_id = create_company(&app, &token, "TestCorp").await;

        let (status, _) = send(
            &app.router,
            Method::POST,
            "/jobs",
            Some(&token),
            Some(json!({"company_id": company_id})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app.router,
            Method::POST,
            "/jobs",
            Some(&token),
            Some(json!({"title": "Backend Engineer"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn creation_ignores_a_client_supplied_status() {
        let app = test_app().await;
        let token = register_and_login(&app.router, "test@test.com").await;
        let company_id = create_company(&app, &token, "TestCorp").await;

        let (status, body) = send(
            &app.router,
            Method::POST,
            "/jobs",
            Some(&token),
            Some(json!({
                "title": "Backend Engineer",
                "company_id": company_id,
                "status": "offer"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "applied");
    }

    #[tokio::test]
    async fn creating_against_a_foreign_company_is_not_found_and_persists_nothing() {
        let app = test_app().await;
        let owner = register_and_login(&app.router, "owner@test.com").await;
        let intruder = register_and_login(&app.router, "intruder@test.com").await;
        let company_id = create_company(&app, &owner, "TestCorp").await;

        let (status, _) = send(
            &app.router,
            Method::POST,
            "/jobs",
            Some(&intruder),
            Some(json!({"title": "Backend Engineer", "company_id": company_id})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM job_applications")
            .fetch_one(app.state.storage().pool())
            .await
            .expect("count");
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn lifecycle_walks_the_transition_table() {
        let app = test_app().await;
        let token = register_and_login(&app.router, "test@test.com").await;
        let company_id = create_company(&app, &token, "TestCorp").await;
        let job_id = create_job(&app, &token, company_id, "Backend Engineer").await;

        let (status, body) = patch_status(&app, &token, job_id, "interview").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "interview");

        // moving backwards is rejected and the row is untouched
        let (status, _) = patch_status(&app, &token, job_id, "applied").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let jobs = list_jobs(&app, &token, "").await;
        assert_eq!(jobs[0]["status"], "interview");

        let (status, body) = patch_status(&app, &token, job_id, "offer").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "offer");
    }

    #[tokio::test]
    async fn terminal_states_reject_every_further_update() {
        let app = test_app().await;
        let token = register_and_login(&app.router, "test@test.com").await;
        let company_id = create_company(&app, &token, "TestCorp").await;
        let job_id = create_job(&app, &token, company_id, "Backend Engineer").await;

        patch_status(&app, &token, job_id, "rejected").await;

        for target in ["applied", "interview", "offer", "rejected"] {
            let (status, _) = patch_status(&app, &token, job_id, target).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "target {target}");
        }
        let jobs = list_jobs(&app, &token, "").await;
        assert_eq!(jobs[0]["status"], "rejected");
    }

    #[tokio::test]
    async fn unknown_status_values_are_rejected_before_the_lookup() {
        let app = test_app().await;
        let token = register_and_login(&app.router, "test@test.com").await;
        let company_id = create_company(&app, &token, "TestCorp").await;
        let job_id = create_job(&app, &token, company_id, "Backend Engineer").await;

        let (status, _) = patch_status(&app, &token, job_id, "ghosted").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app.router,
            Method::PATCH,
            &format!("/jobs/{job_id}/status"),
            Some(&token),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn foreign_users_cannot_see_or_update_a_job() {
        let app = test_app().await;
        let owner = register_and_login(&app.router, "owner@test.com").await;
        let intruder = register_and_login(&app.router, "intruder@test.com").await;
        let company_id = create_company(&app, &owner, "TestCorp").await;
        let job_id = create_job(&app, &owner, company_id, "Backend Engineer").await;

        // existence must not leak: not-owned reads as missing
        let (status, _) = patch_status(&app, &intruder, job_id, "interview").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let jobs = list_jobs(&app, &owner, "").await;
        assert_eq!(jobs[0]["status"], "applied");

        let foreign = list_jobs(&app, &intruder, "").await;
        assert!(foreign.is_empty());
    }

    #[tokio::test]
    async fn listing_filters_by_status_and_ignores_unknown_values() {
        let app = test_app().await;
        let token = register_and_login(&app.router, "test@test.com").await;
        let company_id = create_company(&app, &token, "TestCorp").await;
        let first = create_job(&app, &token, company_id, "first").await;
        create_job(&app, &token, company_id, "second").await;

        patch_status(&app, &token, first, "interview").await;

        let interviews = list_jobs(&app, &token, "status=interview").await;
        assert_eq!(interviews.len(), 1);
        assert_eq!(interviews[0]["title"], "first");

        // unrecognized filter values match nothing rather than erroring
        let none = list_jobs(&app, &token, "status=ghosted").await;
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn listing_paginates_newest_first() {
        let ticks = Arc::new(AtomicI64::new(0));
        let clock_ticks = ticks.clone();
        let app = test_app_with_clock(Arc::new(move || {
            let n = clock_ticks.fetch_add(1, Ordering::SeqCst);
            chrono::Utc.timestamp_opt(1_700_000_000 + n, 0).unwrap()
        }))
        .await;

        let token = register_and_login(&app.router, "test@test.com").await;
        let company_id = create_company(&app, &token, "TestCorp").await;
        for n in 1..=15 {
            create_job(&app, &token, company_id, &format!("job-{n}")).await;
        }

        let first = list_jobs(&app, &token, "limit=10&offset=0").await;
        assert_eq!(first.len(), 10);
        assert_eq!(first[0]["title"], "job-15");
        assert_eq!(first[0]["company"]["name"], "TestCorp");

        let rest = list_jobs(&app, &token, "limit=10&offset=10").await;
        assert_eq!(rest.len(), 5);
        assert_eq!(rest[4]["title"], "job-1");

        let oldest_first = list_jobs(&app, &token, "sort=asc&limit=1").await;
        assert_eq!(oldest_first[0]["title"], "job-1");
    }

    #[tokio::test]
    async fn routes_require_a_token() {
        let app = test_app().await;

        let (status, _) = send(
            &app.router,
            Method::POST,
            "/jobs",
            None,
            Some(json!({"title": "x", "company_id": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app.router, Method::GET, "/jobs", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app.router,
            Method::PATCH,
            "/jobs/1/status",
            None,
            Some(json!({"status": "interview"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
