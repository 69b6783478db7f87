//! Search history endpoints.

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use rgap_core::pagination::Paginated;
use rgap_db::{SearchHistoryRecord, SearchHistoryRepo};

use super::ListQuery;
use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_history))
        .route("/{id}", get(get_history).delete(delete_history))
}

async fn list_history(
    State(state): State<AppState>,
    user: CurrentUser,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Paginated<SearchHistoryRecord>>, ApiError> {
    let Query(query) = query?;
    let page = query.page(&state.config.search)?;
    Ok(Json(state.history_repo.list(user.id(), page).await?))
}

async fn get_history(
    State(state): State<AppState>,
    user: CurrentUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<SearchHistoryRecord>, ApiError> {
    let Path(id) = path?;
    Ok(Json(state.history_repo.get(user.id(), id).await?))
}

async fn delete_history(
    State(state): State<AppState>,
    user: CurrentUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = path?;
    state.history_repo.delete(user.id(), id).await?;
    tracing::info!(user = %user.id(), history_id = id, "Search history entry deleted");
    Ok(StatusCode::NO_CONTENT)
}
