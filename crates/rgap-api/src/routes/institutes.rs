//! Institute endpoints.

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use rgap_core::pagination::Paginated;
use rgap_db::{
    GrantRecord, GrantRepo, InstituteRepo, InstituteSummary, RecipientRepo, RecipientSummary,
};
use serde::Serialize;

use super::ListQuery;
use super::recipients::DETAIL_GRANT_LIMIT;
use crate::AppState;
use crate::auth::MaybeUser;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(search_institutes))
        .route("/{id}", get(get_institute))
}

#[derive(Debug, Serialize)]
pub struct InstituteDetailResponse {
    pub institute: InstituteSummary,
    /// One page of the institute's recipients, selected by `page`/`pageSize`.
    pub recipients: Paginated<RecipientSummary>,
    pub grants: Vec<GrantRecord>,
}

async fn search_institutes(
    State(state): State<AppState>,
    user: MaybeUser,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Paginated<InstituteSummary>>, ApiError> {
    let Query(query) = query?;
    let page = query.page(&state.config.search)?;
    let result = state
        .institute_repo
        .search(query.term(), page, user.id())
        .await?;
    Ok(Json(result))
}

async fn get_institute(
    State(state): State<AppState>,
    user: MaybeUser,
    path: Result<Path<i64>, PathRejection>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<InstituteDetailResponse>, ApiError> {
    let Path(id) = path?;
    let Query(query) = query?;
    let page = query.page(&state.config.search)?;

    let institute = state.institute_repo.get(id, user.id()).await?;
    let recipients = state
        .recipient_repo
        .list_by_institute(id, page, user.id())
        .await?;
    let grants = state
        .grant_repo
        .list_by_institute(id, user.id(), DETAIL_GRANT_LIMIT)
        .await?;

    Ok(Json(InstituteDetailResponse {
        institute,
        recipients,
        grants,
    }))
}
