//! Per-user search history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rgap_core::UserId;
use rgap_core::pagination::{Page, Paginated};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::{DbError, DbResult};

/// A recorded search.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SearchHistoryRecord {
    pub history_id: i64,
    pub user_id: uuid::Uuid,
    /// Terms and filters as the client sent them.
    pub search_params: serde_json::Value,
    pub summary: String,
    pub result_count: i64,
    pub search_time: DateTime<Utc>,
    pub is_bookmarked: bool,
}

#[async_trait]
pub trait SearchHistoryRepo: Send + Sync {
    async fn record(
        &self,
        user: UserId,
        search_params: serde_json::Value,
        summary: &str,
        result_count: i64,
    ) -> DbResult<i64>;

    async fn get(&self, user: UserId, history_id: i64) -> DbResult<SearchHistoryRecord>;

    async fn list(&self, user: UserId, page: Page) -> DbResult<Paginated<SearchHistoryRecord>>;

    async fn delete(&self, user: UserId, history_id: i64) -> DbResult<()>;
}

/// PostgreSQL implementation of SearchHistoryRepo.
pub struct PgSearchHistoryRepo {
    pool: PgPool,
}

impl PgSearchHistoryRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_HISTORY: &str = r#"
    SELECT h.history_id, h.user_id, h.search_params, h.summary, h.result_count, h.search_time,
           EXISTS (SELECT 1 FROM bookmarked_searches b
                   WHERE b.history_id = h.history_id AND b.user_id = h.user_id) AS is_bookmarked
    FROM search_history h
"#;

#[async_trait]
impl SearchHistoryRepo for PgSearchHistoryRepo {
    async fn record(
        &self,
        user: UserId,
        search_params: serde_json::Value,
        summary: &str,
        result_count: i64,
    ) -> DbResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO search_history (user_id, search_params, summary, result_count, search_time)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING history_id
            "#,
        )
        .bind(user.as_uuid())
        .bind(search_params)
        .bind(summary)
        .bind(result_count)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn get(&self, user: UserId, history_id: i64) -> DbResult<SearchHistoryRecord> {
        let record = sqlx::query_as::<_, SearchHistoryRecord>(&format!(
            "{SELECT_HISTORY} WHERE h.history_id = $1 AND h.user_id = $2"
        ))
        .bind(history_id)
        .bind(user.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("search {}", history_id)))?;
        Ok(record)
    }

    async fn list(&self, user: UserId, page: Page) -> DbResult<Paginated<SearchHistoryRecord>> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM search_history WHERE user_id = $1")
                .bind(user.as_uuid())
                .fetch_one(&self.pool)
                .await?;

        let data = sqlx::query_as::<_, SearchHistoryRecord>(&format!(
            "{SELECT_HISTORY} WHERE h.user_id = $1 \
             ORDER BY h.search_time DESC, h.history_id DESC OFFSET $2 LIMIT $3"
        ))
        .bind(user.as_uuid())
        .bind(page.offset())
        .bind(page.limit())
        .fetch_all(&self.pool)
        .await?;

        Ok(Paginated {
            data,
            metadata: page.meta(total),
        })
    }

    async fn delete(&self, user: UserId, history_id: i64) -> DbResult<()> {
        let result =
            sqlx::query("DELETE FROM search_history WHERE history_id = $1 AND user_id = $2")
                .bind(history_id)
                .bind(user.as_uuid())
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("search {}", history_id)));
        }
        Ok(())
    }
}
