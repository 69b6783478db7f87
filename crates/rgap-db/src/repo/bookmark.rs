//! Bookmark repository.
//!
//! Each entity kind has its own join table keyed by `(user_id, <entity id>)`.
//! Table and column names come from [`EntityKind`]; they are static strings,
//! never request text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rgap_core::UserId;
use rgap_core::bookmark::{EntityKind, ToggleAction};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::{DbError, DbResult};

/// A bookmark with a human-readable label for its target.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BookmarkRecord {
    pub entity_id: i64,
    pub label: String,
    pub notes: Option<String>,
    pub bookmarked_at: DateTime<Utc>,
}

#[async_trait]
pub trait BookmarkRepo: Send + Sync {
    /// Apply a toggle given the state the caller currently sees and return
    /// the resulting state.
    async fn toggle(
        &self,
        user: UserId,
        kind: EntityKind,
        entity_id: i64,
        is_bookmarked: bool,
    ) -> DbResult<bool>;

    /// Set or clear the note on an existing bookmark.
    async fn update_note(
        &self,
        user: UserId,
        kind: EntityKind,
        entity_id: i64,
        note: Option<&str>,
    ) -> DbResult<Option<String>>;

    async fn list(&self, user: UserId, kind: EntityKind) -> DbResult<Vec<BookmarkRecord>>;

    async fn is_bookmarked(&self, user: UserId, kind: EntityKind, entity_id: i64)
    -> DbResult<bool>;
}

/// Target table and label expression used when listing bookmarks.
fn label_source(kind: EntityKind) -> (&'static str, &'static str) {
    match kind {
        EntityKind::Grant => (
            "research_grants",
            "COALESCE(t.agreement_title_en, t.ref_number)",
        ),
        EntityKind::Recipient => ("recipients", "t.legal_name"),
        EntityKind::Institute => ("institutes", "t.name"),
        EntityKind::Search => ("search_history", "t.summary"),
    }
}

fn delete_sql(kind: EntityKind) -> String {
    format!(
        "DELETE FROM {} WHERE user_id = $1 AND {} = $2",
        kind.table(),
        kind.id_column()
    )
}

fn insert_sql(kind: EntityKind) -> String {
    format!(
        "INSERT INTO {table} (user_id, {col}, bookmarked_at) VALUES ($1, $2, NOW()) \
         ON CONFLICT (user_id, {col}) DO NOTHING",
        table = kind.table(),
        col = kind.id_column()
    )
}

fn list_sql(kind: EntityKind) -> String {
    let (target, label) = label_source(kind);
    let col = kind.id_column();
    format!(
        "SELECT b.{col} AS entity_id, {label} AS label, b.notes, b.bookmarked_at \
         FROM {table} b JOIN {target} t ON t.{col} = b.{col} \
         WHERE b.user_id = $1 ORDER BY b.bookmarked_at DESC",
        table = kind.table(),
    )
}

/// PostgreSQL implementation of BookmarkRepo.
pub struct PgBookmarkRepo {
    pool: PgPool,
}

impl PgBookmarkRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Saved searches may only be bookmarked by the user who ran them.
    async fn ensure_owned_search(&self, user: UserId, history_id: i64) -> DbResult<()> {
        let owned: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM search_history WHERE history_id = $1 AND user_id = $2)",
        )
        .bind(history_id)
        .bind(user.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        if owned {
            Ok(())
        } else {
            Err(DbError::NotFound(format!("search {}", history_id)))
        }
    }
}

#[async_trait]
impl BookmarkRepo for PgBookmarkRepo {
    async fn toggle(
        &self,
        user: UserId,
        kind: EntityKind,
        entity_id: i64,
        is_bookmarked: bool,
    ) -> DbResult<bool> {
        let action = ToggleAction::from_current_state(is_bookmarked);
        match action {
            ToggleAction::Remove => {
                sqlx::query(&delete_sql(kind))
                    .bind(user.as_uuid())
                    .bind(entity_id)
                    .execute(&self.pool)
                    .await?;
            }
            ToggleAction::Add => {
                if kind == EntityKind::Search {
                    self.ensure_owned_search(user, entity_id).await?;
                }
                sqlx::query(&insert_sql(kind))
                    .bind(user.as_uuid())
                    .bind(entity_id)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| DbError::on_write(e, format!("{} {}", kind, entity_id)))?;
            }
        }

        tracing::info!(user = %user, kind = %kind, entity_id, ?action, "Bookmark toggled");
        Ok(action.resulting_state())
    }

    async fn update_note(
        &self,
        user: UserId,
        kind: EntityKind,
        entity_id: i64,
        note: Option<&str>,
    ) -> DbResult<Option<String>> {
        let sql = format!(
            "UPDATE {} SET notes = $3 WHERE user_id = $1 AND {} = $2 RETURNING notes",
            kind.table(),
            kind.id_column()
        );
        let stored = sqlx::query_scalar::<_, Option<String>>(&sql)
            .bind(user.as_uuid())
            .bind(entity_id)
            .bind(note)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("{} bookmark {}", kind, entity_id)))?;
        Ok(stored)
    }

    async fn list(&self, user: UserId, kind: EntityKind) -> DbResult<Vec<BookmarkRecord>> {
        let records = sqlx::query_as::<_, BookmarkRecord>(&list_sql(kind))
            .bind(user.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn is_bookmarked(
        &self,
        user: UserId,
        kind: EntityKind,
        entity_id: i64,
    ) -> DbResult<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE user_id = $1 AND {} = $2)",
            kind.table(),
            kind.id_column()
        );
        let exists: bool = sqlx::query_scalar(&sql)
            .bind(user.as_uuid())
            .bind(entity_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_ignores_existing_rows() {
        let sql = insert_sql(EntityKind::Recipient);
        assert!(sql.starts_with("INSERT INTO bookmarked_recipients (user_id, recipient_id"));
        assert!(sql.ends_with("ON CONFLICT (user_id, recipient_id) DO NOTHING"));
    }

    #[test]
    fn test_delete_is_scoped_to_user_and_entity() {
        assert_eq!(
            delete_sql(EntityKind::Search),
            "DELETE FROM bookmarked_searches WHERE user_id = $1 AND history_id = $2"
        );
    }

    #[test]
    fn test_list_joins_matching_target() {
        for kind in EntityKind::ALL {
            let sql = list_sql(kind);
            let (target, _) = label_source(kind);
            assert!(sql.contains(&format!("JOIN {target} t ON t.{0} = b.{0}", kind.id_column())));
            assert!(sql.contains("WHERE b.user_id = $1"));
        }
    }
}
