use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use jobtrack_core::types::Company;
use jobtrack_storage::NewCompany;

use crate::identity::require_identity;
use crate::problem::ProblemResponse;
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateCompanyRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    website: Option<String>,
}

#[derive(Debug, Serialize)]
struct CompanyResponse {
    id: i64,
    name: String,
    location: Option<String>,
    website: Option<String>,
}

impl From<Company> for CompanyResponse {
    fn from(company: Company) -> Self {
        Self {
            id: company.id,
            name: company.name,
            location: company.location,
            website: company.website,
        }
    }
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateCompanyRequest>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let identity = require_identity(&state, &headers)?;

    let Some(name) = body.name.as_deref().filter(|n| !n.is_empty()) else {
        return Err(ProblemResponse::validation("company name is required"));
    };

    let company = state
        .storage()
        .companies()
        .insert(NewCompany {
            name,
            location: body.location.as_deref(),
            website: body.website.as_deref(),
            created_at: state.now(),
            user_id: identity.user_id,
        })
        .await
        .map_err(|err| {
            error!(error = %err, "failed to persist company");
            ProblemResponse::internal()
        })?;

    counter!("companies_created_total").increment(1);
    info!(
        user_id = identity.user_id,
        company_id = company.id,
        "company created"
    );
    Ok((StatusCode::CREATED, Json(CompanyResponse::from(company))))
}

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ProblemResponse> {
    let identity = require_identity(&state, &headers)?;

    let companies = state
        .storage()
        .companies()
        .list_for_owner(identity.user_id)
        .await
        .map_err(|err| {
            error!(error = %err, "failed to list companies");
            ProblemResponse::internal()
        })?;

    let body: Vec<CompanyResponse> = companies.into_iter().map(CompanyResponse::from).collect();
    Ok(Json(body))
}
