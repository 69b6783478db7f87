//! Bookmark endpoints. Every route requires a session.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use rgap_core::bookmark::{EntityKind, normalize_note};
use rgap_db::{BookmarkRecord, BookmarkRepo};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{kind}", get(list_bookmarks))
        .route("/{kind}/{id}", get(bookmark_status).post(toggle_bookmark))
        .route("/{kind}/{id}/note", put(update_note))
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleRequest {
    /// Whether the caller currently sees the entity as bookmarked.
    pub is_bookmarked: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct NoteRequest {
    #[serde(default)]
    pub note: Option<String>,
}

async fn list_bookmarks(
    State(state): State<AppState>,
    user: CurrentUser,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<Vec<BookmarkRecord>>, ApiError> {
    let Path(kind) = path?;
    let kind: EntityKind = kind.parse()?;
    let bookmarks = state.bookmark_repo.list(user.id(), kind).await?;
    Ok(Json(bookmarks))
}

async fn bookmark_status(
    State(state): State<AppState>,
    user: CurrentUser,
    path: Result<Path<(String, i64)>, PathRejection>,
) -> Result<Json<ToggleRequest>, ApiError> {
    let Path((kind, id)) = path?;
    let kind: EntityKind = kind.parse()?;
    let is_bookmarked = state.bookmark_repo.is_bookmarked(user.id(), kind, id).await?;
    Ok(Json(ToggleRequest { is_bookmarked }))
}

async fn toggle_bookmark(
    State(state): State<AppState>,
    user: CurrentUser,
    path: Result<Path<(String, i64)>, PathRejection>,
    payload: Result<Json<ToggleRequest>, JsonRejection>,
) -> Result<Json<ToggleRequest>, ApiError> {
    let Path((kind, id)) = path?;
    let kind: EntityKind = kind.parse()?;
    let Json(request) = payload?;
    let is_bookmarked = state
        .bookmark_repo
        .toggle(user.id(), kind, id, request.is_bookmarked)
        .await?;
    Ok(Json(ToggleRequest { is_bookmarked }))
}

async fn update_note(
    State(state): State<AppState>,
    user: CurrentUser,
    path: Result<Path<(String, i64)>, PathRejection>,
    payload: Result<Json<NoteRequest>, JsonRejection>,
) -> Result<Json<NoteRequest>, ApiError> {
    let Path((kind, id)) = path?;
    let kind: EntityKind = kind.parse()?;
    let Json(request) = payload?;
    let note = normalize_note(request.note.as_deref())?;
    let note = state
        .bookmark_repo
        .update_note(user.id(), kind, id, note.as_deref())
        .await?;
    Ok(Json(NoteRequest { note }))
}
