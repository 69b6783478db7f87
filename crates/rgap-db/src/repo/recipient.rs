//! Recipient repository.

use async_trait::async_trait;
use chrono::NaiveDate;
use rgap_core::UserId;
use rgap_core::pagination::{Page, Paginated};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::search::contains_pattern;
use crate::{DbError, DbResult};

/// A recipient with its host institute and funding aggregates.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RecipientSummary {
    pub recipient_id: i64,
    pub legal_name: String,
    pub research_organization_name: Option<String>,
    pub recipient_type: Option<String>,
    pub institute_id: Option<i64>,
    pub institute_name: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub country: Option<String>,
    pub grant_count: i64,
    pub total_funding: f64,
    pub first_grant_date: Option<NaiveDate>,
    pub latest_grant_date: Option<NaiveDate>,
    pub is_bookmarked: bool,
}

#[async_trait]
pub trait RecipientRepo: Send + Sync {
    async fn get(&self, id: i64, user: Option<UserId>) -> DbResult<RecipientSummary>;

    /// Recipients whose legal name contains `name`, highest total funding first.
    async fn search(
        &self,
        name: Option<&str>,
        page: Page,
        user: Option<UserId>,
    ) -> DbResult<Paginated<RecipientSummary>>;

    async fn list_by_institute(
        &self,
        institute_id: i64,
        page: Page,
        user: Option<UserId>,
    ) -> DbResult<Paginated<RecipientSummary>>;
}

/// PostgreSQL implementation of RecipientRepo.
pub struct PgRecipientRepo {
    pool: PgPool,
}

impl PgRecipientRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn page(
        &self,
        filter: RecipientFilter<'_>,
        page: Page,
        user: Option<UserId>,
    ) -> DbResult<Paginated<RecipientSummary>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM recipients r");
        filter.push(&mut count);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut qb = select_recipients(user);
        filter.push(&mut qb);
        qb.push(
            "\nGROUP BY r.recipient_id, i.institute_id\
             \nORDER BY total_funding DESC, r.recipient_id ASC\nLIMIT ",
        );
        qb.push_bind(page.limit());
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());
        let data = qb
            .build_query_as::<RecipientSummary>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Paginated {
            data,
            metadata: page.meta(total),
        })
    }
}

#[derive(Clone, Copy)]
enum RecipientFilter<'a> {
    Id(i64),
    Name(Option<&'a str>),
    Institute(i64),
}

impl RecipientFilter<'_> {
    fn push(&self, qb: &mut QueryBuilder<'static, Postgres>) {
        match *self {
            RecipientFilter::Id(id) => {
                qb.push("\nWHERE r.recipient_id = ");
                qb.push_bind(id);
            }
            RecipientFilter::Name(Some(name)) => {
                qb.push("\nWHERE r.legal_name ILIKE ");
                qb.push_bind(contains_pattern(name));
            }
            RecipientFilter::Name(None) => {}
            RecipientFilter::Institute(id) => {
                qb.push("\nWHERE r.institute_id = ");
                qb.push_bind(id);
            }
        }
    }
}

fn select_recipients(user: Option<UserId>) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(
        r#"
SELECT r.recipient_id, r.legal_name, r.research_organization_name, r.recipient_type,
       r.institute_id, i.name AS institute_name, i.city, i.province, i.country,
       COUNT(g.grant_id) AS grant_count,
       COALESCE(SUM(g.agreement_value), 0)::FLOAT8 AS total_funding,
       MIN(g.agreement_start_date) AS first_grant_date,
       MAX(g.agreement_start_date) AS latest_grant_date,
       "#,
    );
    match user {
        Some(user) => {
            qb.push(
                "EXISTS (SELECT 1 FROM bookmarked_recipients b \
                 WHERE b.recipient_id = r.recipient_id AND b.user_id = ",
            );
            qb.push_bind(*user.as_uuid());
            qb.push(") AS is_bookmarked");
        }
        None => {
            qb.push("FALSE AS is_bookmarked");
        }
    }
    qb.push(
        r#"
FROM recipients r
LEFT JOIN institutes i ON i.institute_id = r.institute_id
LEFT JOIN research_grants g ON g.recipient_id = r.recipient_id"#,
    );
    qb
}

#[async_trait]
impl RecipientRepo for PgRecipientRepo {
    async fn get(&self, id: i64, user: Option<UserId>) -> DbResult<RecipientSummary> {
        let mut qb = select_recipients(user);
        RecipientFilter::Id(id).push(&mut qb);
        qb.push("\nGROUP BY r.recipient_id, i.institute_id");
        let summary = qb
            .build_query_as::<RecipientSummary>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("recipient {}", id)))?;
        Ok(summary)
    }

    async fn search(
        &self,
        name: Option<&str>,
        page: Page,
        user: Option<UserId>,
    ) -> DbResult<Paginated<RecipientSummary>> {
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        self.page(RecipientFilter::Name(name), page, user).await
    }

    async fn list_by_institute(
        &self,
        institute_id: i64,
        page: Page,
        user: Option<UserId>,
    ) -> DbResult<Paginated<RecipientSummary>> {
        self.page(RecipientFilter::Institute(institute_id), page, user)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collapsed(qb: &QueryBuilder<'static, Postgres>) -> String {
        qb.sql().split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_anonymous_select_reports_not_bookmarked() {
        let qb = select_recipients(None);
        assert!(collapsed(&qb).contains("FALSE AS is_bookmarked FROM recipients r"));
    }

    #[test]
    fn test_user_select_binds_user_before_filter() {
        let mut qb = select_recipients(Some(UserId::new()));
        RecipientFilter::Name(Some("laval")).push(&mut qb);
        let sql = collapsed(&qb);
        assert!(sql.contains("b.user_id = $1) AS is_bookmarked"));
        assert!(sql.ends_with("WHERE r.legal_name ILIKE $2"));
    }

    #[test]
    fn test_empty_name_filter_adds_nothing() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM recipients r");
        RecipientFilter::Name(None).push(&mut qb);
        assert_eq!(qb.sql(), "SELECT COUNT(*) FROM recipients r");
    }
}
