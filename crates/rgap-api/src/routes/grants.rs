//! Grant search and detail endpoints.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rgap_core::UserId;
use rgap_core::grant::Amendment;
use rgap_core::pagination::PageMeta;
use rgap_core::search::{ResultFormat, SearchQuery, SearchRequest};
use rgap_db::{GrantRecord, GrantRepo, SearchHistoryRepo};
use serde::Serialize;
use serde_json::json;

use crate::AppState;
use crate::auth::MaybeUser;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(search_grants))
        .route("/{id}", get(get_grant))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub data: Vec<GrantRecord>,
    pub metadata: PageMeta,
    /// Set when the search was saved to the caller's history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct GrantDetailResponse {
    #[serde(flatten)]
    pub grant: GrantRecord,
    pub amendments: Vec<Amendment>,
}

/// Search grants.
async fn search_grants(
    State(state): State<AppState>,
    user: MaybeUser,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let query = request
        .validate(&state.config.search)
        .map_err(ApiError::Validation)?;

    match query.format {
        ResultFormat::Full => {
            let page = state.grant_repo.search(&query, user.id()).await?;
            let history_id = match user.id() {
                Some(user_id) if query.page.page == 1 => {
                    record_search(&state, user_id, &request, &query, page.metadata.total_count)
                        .await
                }
                _ => None,
            };
            Ok(Json(SearchResponse {
                data: page.data,
                metadata: page.metadata,
                history_id,
            })
            .into_response())
        }
        ResultFormat::Visualization => {
            let limit = state.config.search.visualization_limit;
            let visualization = state.grant_repo.visualization(&query, limit).await?;
            Ok(Json(visualization).into_response())
        }
    }
}

/// Save a search to the user's history. Only the first page of a search is
/// recorded; paging through results is not a new search. Failures are logged
/// and do not fail the request.
pub(crate) async fn record_search(
    state: &AppState,
    user: UserId,
    request: &SearchRequest,
    query: &SearchQuery,
    result_count: i64,
) -> Option<i64> {
    let params = json!({
        "searchTerms": request.search_terms,
        "filters": request.filters,
        "sortConfig": request.sort_config,
    });
    match state
        .history_repo
        .record(user, params, &query.summary(), result_count)
        .await
    {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::warn!(user = %user, error = %e, "Failed to record search history");
            None
        }
    }
}

/// Get a grant with its full amendment timeline.
async fn get_grant(
    State(state): State<AppState>,
    user: MaybeUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<GrantDetailResponse>, ApiError> {
    let Path(id) = path?;
    let grant = state.grant_repo.get_by_id(id, user.id()).await?;
    let amendments = grant.amendments();
    Ok(Json(GrantDetailResponse { grant, amendments }))
}
