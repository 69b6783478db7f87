//! Institute repository.

use async_trait::async_trait;
use chrono::NaiveDate;
use rgap_core::UserId;
use rgap_core::pagination::{Page, Paginated};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::search::contains_pattern;
use crate::{DbError, DbResult};

/// An institute with funding aggregates across all of its recipients.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InstituteSummary {
    pub institute_id: i64,
    pub name: String,
    pub city: Option<String>,
    pub province: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub riding_name_en: Option<String>,
    pub riding_number: Option<String>,
    pub recipient_count: i64,
    pub grant_count: i64,
    pub total_funding: f64,
    pub first_grant_date: Option<NaiveDate>,
    pub latest_grant_date: Option<NaiveDate>,
    pub is_bookmarked: bool,
}

#[async_trait]
pub trait InstituteRepo: Send + Sync {
    async fn get(&self, id: i64, user: Option<UserId>) -> DbResult<InstituteSummary>;

    /// Institutes whose name contains `name`, highest total funding first.
    async fn search(
        &self,
        name: Option<&str>,
        page: Page,
        user: Option<UserId>,
    ) -> DbResult<Paginated<InstituteSummary>>;
}

/// PostgreSQL implementation of InstituteRepo.
pub struct PgInstituteRepo {
    pool: PgPool,
}

impl PgInstituteRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn select_institutes(user: Option<UserId>) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(
        r#"
SELECT i.institute_id, i.name, i.city, i.province, i.country, i.postal_code,
       i.riding_name_en, i.riding_number,
       COUNT(DISTINCT r.recipient_id) AS recipient_count,
       COUNT(g.grant_id) AS grant_count,
       COALESCE(SUM(g.agreement_value), 0)::FLOAT8 AS total_funding,
       MIN(g.agreement_start_date) AS first_grant_date,
       MAX(g.agreement_start_date) AS latest_grant_date,
       "#,
    );
    match user {
        Some(user) => {
            qb.push(
                "EXISTS (SELECT 1 FROM bookmarked_institutes b \
                 WHERE b.institute_id = i.institute_id AND b.user_id = ",
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
FROM institutes i
LEFT JOIN recipients r ON r.institute_id = i.institute_id
LEFT JOIN research_grants g ON g.recipient_id = r.recipient_id"#,
    );
    qb
}

fn push_name_filter(qb: &mut QueryBuilder<'static, Postgres>, name: Option<&str>) {
    if let Some(name) = name {
        qb.push("\nWHERE i.name ILIKE ");
        qb.push_bind(contains_pattern(name));
    }
}

#[async_trait]
impl InstituteRepo for PgInstituteRepo {
    async fn get(&self, id: i64, user: Option<UserId>) -> DbResult<InstituteSummary> {
        let mut qb = select_institutes(user);
        qb.push("\nWHERE i.institute_id = ");
        qb.push_bind(id);
        qb.push("\nGROUP BY i.institute_id");
        let summary = qb
            .build_query_as::<InstituteSummary>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("institute {}", id)))?;
        Ok(summary)
    }

    async fn search(
        &self,
        name: Option<&str>,
        page: Page,
        user: Option<UserId>,
    ) -> DbResult<Paginated<InstituteSummary>> {
        let name = name.map(str::trim).filter(|n| !n.is_empty());

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM institutes i");
        push_name_filter(&mut count, name);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut qb = select_institutes(user);
        push_name_filter(&mut qb, name);
        qb.push("\nGROUP BY i.institute_id\nORDER BY total_funding DESC, i.institute_id ASC\nLIMIT ");
        qb.push_bind(page.limit());
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());
        let data = qb
            .build_query_as::<InstituteSummary>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Paginated {
            data,
            metadata: page.meta(total),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_filter_is_bound() {
        let mut qb = select_institutes(None);
        push_name_filter(&mut qb, Some("McGill"));
        let sql = qb.sql();
        assert!(sql.contains("i.name ILIKE $1"));
        assert!(!sql.contains("McGill"));
    }
}
