//! Repository traits and implementations.

pub mod bookmark;
pub mod grant;
pub mod institute;
pub mod recipient;
pub mod reference;
pub mod search_history;
pub mod user;

pub use bookmark::{BookmarkRecord, BookmarkRepo, PgBookmarkRepo};
pub use grant::{
    FundingByYear, GrantRecord, GrantRepo, PgGrantRepo, PortalTotals, Visualization,
    VisualizationRow,
};
pub use institute::{InstituteRepo, InstituteSummary, PgInstituteRepo};
pub use recipient::{PgRecipientRepo, RecipientRepo, RecipientSummary};
pub use reference::{FilterOptions, Organization, PgReferenceRepo, Program, ReferenceRepo};
pub use search_history::{PgSearchHistoryRepo, SearchHistoryRecord, SearchHistoryRepo};
pub use user::{PgUserRepo, SessionRecord, UserPublic, UserRecord, UserRepo};

/// Repository tests against a live PostgreSQL.
/// Run with: DATABASE_URL=postgres://... cargo test -p rgap-db -- --ignored
#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::{DbError, create_pool, run_migrations};
    use chrono::{Duration, NaiveDate, Utc};
    use rgap_core::UserId;
    use rgap_core::bookmark::EntityKind;
    use rgap_core::pagination::Page;
    use rgap_core::search::SearchQuery;
    use sqlx::PgPool;

    async fn pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = create_pool(&url, 2).await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn unique(prefix: &str) -> String {
        format!("{prefix}-{}", uuid::Uuid::now_v7().simple())
    }

    async fn seed_user(pool: &PgPool) -> UserId {
        let email = format!("{}@example.org", unique("user"));
        let user = PgUserRepo::new(pool.clone())
            .create_user(&email, None, "$argon2id$unused")
            .await
            .unwrap();
        UserId::from(user.id)
    }

    /// Insert `count` grants under a fresh lowercase agency code, all held by
    /// one recipient at an institute in `province`. Returns the agency code.
    async fn seed_grants(pool: &PgPool, province: &str, count: u32) -> String {
        let org = unique("agency");
        sqlx::query("INSERT INTO organizations (org, org_title_en) VALUES ($1, $2)")
            .bind(&org)
            .bind(format!("Agency {org}"))
            .execute(pool)
            .await
            .unwrap();

        let institute_id: i64 = sqlx::query_scalar(
            "INSERT INTO institutes (name, city, province, country) \
             VALUES ($1, 'Testville', $2, 'CA') RETURNING institute_id",
        )
        .bind(unique("institute"))
        .bind(province)
        .fetch_one(pool)
        .await
        .unwrap();

        let recipient_id: i64 = sqlx::query_scalar(
            "INSERT INTO recipients (legal_name, institute_id) \
             VALUES ($1, $2) RETURNING recipient_id",
        )
        .bind(unique("recipient"))
        .bind(institute_id)
        .fetch_one(pool)
        .await
        .unwrap();

        for n in 1..=count {
            sqlx::query(
                "INSERT INTO research_grants \
                 (ref_number, agreement_value, agreement_start_date, agreement_title_en, \
                  org, recipient_id) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(unique("ref"))
            .bind(f64::from(n) * 1_000.0)
            .bind(NaiveDate::from_ymd_opt(2020, 1, n))
            .bind(format!("Grant {n}"))
            .bind(&org)
            .bind(recipient_id)
            .execute(pool)
            .await
            .unwrap();
        }
        org
    }

    fn by_agency(agency: &str, page: i64, page_size: i64) -> SearchQuery {
        let mut query = SearchQuery::default();
        query.filters.agencies = vec![agency.to_string()];
        query.page = Page { page, page_size };
        query
    }

    #[tokio::test]
    #[ignore]
    async fn test_toggle_is_idempotent() {
        let pool = pool().await;
        let user = seed_user(&pool).await;
        let org = seed_grants(&pool, "ON", 1).await;
        let grants = PgGrantRepo::new(pool.clone());
        let found = grants.search(&by_agency(&org, 1, 10), None).await.unwrap();
        let grant_id = found.data[0].grant_id;

        let repo = PgBookmarkRepo::new(pool.clone());
        assert!(repo.toggle(user, EntityKind::Grant, grant_id, false).await.unwrap());
        assert!(repo.toggle(user, EntityKind::Grant, grant_id, false).await.unwrap());
        assert_eq!(repo.list(user, EntityKind::Grant).await.unwrap().len(), 1);
        assert!(repo.is_bookmarked(user, EntityKind::Grant, grant_id).await.unwrap());

        assert!(!repo.toggle(user, EntityKind::Grant, grant_id, true).await.unwrap());
        assert!(!repo.toggle(user, EntityKind::Grant, grant_id, true).await.unwrap());
        assert!(repo.list(user, EntityKind::Grant).await.unwrap().is_empty());
        assert!(!repo.is_bookmarked(user, EntityKind::Grant, grant_id).await.unwrap());
    }

    #[tokio::test]
    #[ignore]
    async fn test_note_on_missing_bookmark_is_not_found() {
        let pool = pool().await;
        let user = seed_user(&pool).await;
        let repo = PgBookmarkRepo::new(pool);

        let err = repo
            .update_note(user, EntityKind::Recipient, i64::MAX, Some("follow up"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[tokio::test]
    #[ignore]
    async fn test_saved_search_bookmark_requires_ownership() {
        let pool = pool().await;
        let owner = seed_user(&pool).await;
        let other = seed_user(&pool).await;
        let history_id = PgSearchHistoryRepo::new(pool.clone())
            .record(owner, serde_json::json!({}), "All grants", 0)
            .await
            .unwrap();

        let repo = PgBookmarkRepo::new(pool);
        let err = repo
            .toggle(other, EntityKind::Search, history_id, false)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));

        assert!(repo.toggle(owner, EntityKind::Search, history_id, false).await.unwrap());
    }

    #[tokio::test]
    #[ignore]
    async fn test_count_and_pages_agree() {
        let pool = pool().await;
        let org = seed_grants(&pool, "QC", 5).await;
        let repo = PgGrantRepo::new(pool);

        let mut seen = Vec::new();
        for page in 1..=3 {
            let result = repo.search(&by_agency(&org, page, 2), None).await.unwrap();
            assert_eq!(result.metadata.total_count, 5);
            assert_eq!(result.metadata.total_pages, 3);
            seen.extend(result.data.into_iter().map(|g| g.grant_id));
        }
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 5);

        let past_end = repo.search(&by_agency(&org, 4, 2), None).await.unwrap();
        assert!(past_end.data.is_empty());
        assert_eq!(past_end.metadata.total_count, 5);
    }

    #[tokio::test]
    #[ignore]
    async fn test_list_filters_ignore_case() {
        let pool = pool().await;
        let province = unique("prov");
        let org = seed_grants(&pool, &province, 2).await;
        let repo = PgGrantRepo::new(pool);

        let mut query = by_agency(&org.to_uppercase(), 1, 10);
        query.filters.provinces = vec![province.to_uppercase()];
        let result = repo.search(&query, None).await.unwrap();
        assert_eq!(result.metadata.total_count, 2);
        assert!(result.data.iter().all(|g| g.org == org));
    }

    #[tokio::test]
    #[ignore]
    async fn test_visualization_reports_truncation() {
        let pool = pool().await;
        let org = seed_grants(&pool, "BC", 4).await;
        let repo = PgGrantRepo::new(pool);
        let query = by_agency(&org, 1, 10);

        let capped = repo.visualization(&query, 3).await.unwrap();
        assert_eq!(capped.data.len(), 3);
        assert!(capped.truncated);

        let exact = repo.visualization(&query, 4).await.unwrap();
        assert_eq!(exact.data.len(), 4);
        assert!(!exact.truncated);
    }

    #[tokio::test]
    #[ignore]
    async fn test_expired_session_is_rejected() {
        let pool = pool().await;
        let user = seed_user(&pool).await;
        let repo = PgUserRepo::new(pool);

        let expired = unique("expired");
        repo.create_session(user, &expired, Utc::now() - Duration::minutes(1), None, None)
            .await
            .unwrap();
        assert!(repo.get_session_user(&expired).await.unwrap().is_none());

        let live = unique("live");
        repo.create_session(user, &live, Utc::now() + Duration::days(1), None, None)
            .await
            .unwrap();
        let owner = repo.get_session_user(&live).await.unwrap().unwrap();
        assert_eq!(owner.user_id(), user);

        assert!(repo.delete_expired_sessions().await.unwrap() >= 1);
        assert!(repo.get_session_user(&live).await.unwrap().is_some());
    }
}
