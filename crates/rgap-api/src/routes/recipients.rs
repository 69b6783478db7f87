//! Recipient endpoints.

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use rgap_core::pagination::Paginated;
use rgap_db::{GrantRecord, GrantRepo, RecipientRepo, RecipientSummary};
use serde::Serialize;

use super::ListQuery;
use crate::AppState;
use crate::auth::MaybeUser;
use crate::error::ApiError;

/// Grants listed on a recipient or institute detail response.
pub const DETAIL_GRANT_LIMIT: i64 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(search_recipients))
        .route("/{id}", get(get_recipient))
}

#[derive(Debug, Serialize)]
pub struct RecipientDetailResponse {
    pub recipient: RecipientSummary,
    pub grants: Vec<GrantRecord>,
}

async fn search_recipients(
    State(state): State<AppState>,
    user: MaybeUser,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Paginated<RecipientSummary>>, ApiError> {
    let Query(query) = query?;
    let page = query.page(&state.config.search)?;
    let result = state
        .recipient_repo
        .search(query.term(), page, user.id())
        .await?;
    Ok(Json(result))
}

async fn get_recipient(
    State(state): State<AppState>,
    user: MaybeUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<RecipientDetailResponse>, ApiError> {
    let Path(id) = path?;
    let recipient = state.recipient_repo.get(id, user.id()).await?;
    let grants = state
        .grant_repo
        .list_by_recipient(id, user.id(), DETAIL_GRANT_LIMIT)
        .await?;
    Ok(Json(RecipientDetailResponse { recipient, grants }))
}
