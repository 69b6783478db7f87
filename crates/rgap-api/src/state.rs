//! Application state.

use rgap_config::SystemConfig;
use rgap_db::{
    PgBookmarkRepo, PgGrantRepo, PgInstituteRepo, PgRecipientRepo, PgReferenceRepo,
    PgSearchHistoryRepo, PgUserRepo,
};
use sqlx::PgPool;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<SystemConfig>,
    pub grant_repo: Arc<PgGrantRepo>,
    pub recipient_repo: Arc<PgRecipientRepo>,
    pub institute_repo: Arc<PgInstituteRepo>,
    pub reference_repo: Arc<PgReferenceRepo>,
    pub bookmark_repo: Arc<PgBookmarkRepo>,
    pub history_repo: Arc<PgSearchHistoryRepo>,
    pub user_repo: Arc<PgUserRepo>,
}

impl AppState {
    pub fn new(pool: PgPool, config: SystemConfig) -> Self {
        Self {
            grant_repo: Arc::new(PgGrantRepo::new(pool.clone())),
            recipient_repo: Arc::new(PgRecipientRepo::new(pool.clone())),
            institute_repo: Arc::new(PgInstituteRepo::new(pool.clone())),
            reference_repo: Arc::new(PgReferenceRepo::new(pool.clone())),
            bookmark_repo: Arc::new(PgBookmarkRepo::new(pool.clone())),
            history_repo: Arc::new(PgSearchHistoryRepo::new(pool.clone())),
            user_repo: Arc::new(PgUserRepo::new(pool.clone())),
            config: Arc::new(config),
            pool,
        }
    }
}
