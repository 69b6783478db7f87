//! HTTP routes.

pub mod auth;
pub mod bookmarks;
pub mod grants;
pub mod health;
pub mod history;
pub mod institutes;
pub mod recipients;
pub mod reference;
pub mod ui;

use axum::Router;
use rgap_core::pagination::{Page, PaginationInput};
use rgap_core::search::SearchLimits;
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

/// Build the main router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(ui::router())
        .nest("/api", api_router())
        .nest("/auth", auth::router())
        .merge(health::router())
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/grants", grants::router())
        .nest("/recipients", recipients::router())
        .nest("/institutes", institutes::router())
        .nest("/bookmarks", bookmarks::router())
        .nest("/history", history::router())
        .merge(reference::router())
}

/// `?q=&page=&pageSize=` on listing endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub q: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl ListQuery {
    pub fn page(&self, limits: &SearchLimits) -> Result<Page, ApiError> {
        PaginationInput {
            page: self.page,
            page_size: self.page_size,
        }
        .resolve("", limits.default_page_size, limits.max_page_size)
        .map_err(ApiError::Validation)
    }

    /// The name filter, if non-blank.
    pub fn term(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}
