//! Reference data and dashboard aggregates.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use rgap_db::{
    FilterOptions, FundingByYear, GrantRepo, Organization, PortalTotals, Program, ReferenceRepo,
};
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/filters", get(filter_options))
        .route("/stats", get(stats))
        .route("/organizations", get(list_organizations))
        .route("/programs", get(list_programs))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub totals: PortalTotals,
    pub funding_by_year: Vec<FundingByYear>,
}

async fn filter_options(State(state): State<AppState>) -> Result<Json<FilterOptions>, ApiError> {
    Ok(Json(state.reference_repo.filter_options().await?))
}

async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let totals = state.grant_repo.totals().await?;
    let funding_by_year = state.grant_repo.funding_by_year().await?;
    Ok(Json(StatsResponse {
        totals,
        funding_by_year,
    }))
}

async fn list_organizations(
    State(state): State<AppState>,
) -> Result<Json<Vec<Organization>>, ApiError> {
    Ok(Json(state.reference_repo.list_organizations().await?))
}

async fn list_programs(State(state): State<AppState>) -> Result<Json<Vec<Program>>, ApiError> {
    Ok(Json(state.reference_repo.list_programs().await?))
}
