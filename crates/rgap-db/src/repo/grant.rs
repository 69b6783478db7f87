//! Grant repository: search, detail lookups and chart aggregates.

use async_trait::async_trait;
use chrono::NaiveDate;
use rgap_core::UserId;
use rgap_core::grant::{Amendment, amendment_timeline};
use rgap_core::pagination::Paginated;
use rgap_core::search::SearchQuery;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::types::Json;

use crate::search::{count_query, page_query, select_grants, visualization_query};
use crate::{DbError, DbResult};

/// A grant joined with its recipient, institute, agency and program.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GrantRecord {
    pub grant_id: i64,
    pub ref_number: String,
    pub latest_amendment_number: i32,
    pub amendment_date: Option<NaiveDate>,
    pub agreement_number: Option<String>,
    pub agreement_value: f64,
    pub foreign_currency_type: Option<String>,
    pub foreign_currency_value: Option<f64>,
    pub agreement_start_date: Option<NaiveDate>,
    pub agreement_end_date: Option<NaiveDate>,
    pub agreement_title_en: Option<String>,
    pub description_en: Option<String>,
    pub expected_results_en: Option<String>,
    pub additional_information_en: Option<String>,
    pub org: String,
    pub org_title_en: Option<String>,
    pub prog_id: Option<String>,
    pub prog_title_en: Option<String>,
    pub prog_purpose_en: Option<String>,
    pub recipient_id: i64,
    pub legal_name: String,
    pub research_organization_name: Option<String>,
    pub recipient_type: Option<String>,
    pub institute_id: Option<i64>,
    pub institute_name: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub country: Option<String>,
    pub amendments_history: Json<Vec<Amendment>>,
    pub is_bookmarked: bool,
}

impl GrantRecord {
    /// The version described by the row's own columns.
    pub fn current_version(&self) -> Amendment {
        Amendment {
            amendment_number: self.latest_amendment_number,
            amendment_date: self.amendment_date,
            agreement_value: Some(self.agreement_value),
            agreement_start_date: self.agreement_start_date,
            agreement_end_date: self.agreement_end_date,
            additional_information_en: self.additional_information_en.clone(),
        }
    }

    /// Every version of the agreement, newest first.
    pub fn amendments(&self) -> Vec<Amendment> {
        amendment_timeline(&self.amendments_history.0, self.current_version())
    }
}

/// Flat row used by chart clients.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VisualizationRow {
    pub grant_id: i64,
    pub agreement_value: f64,
    pub agreement_start_date: Option<NaiveDate>,
    pub org: String,
    pub country: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub recipient_id: i64,
    pub legal_name: String,
    pub institute_id: Option<i64>,
    pub institute_name: Option<String>,
}

/// Chart rows plus whether more rows matched than were returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Visualization {
    pub data: Vec<VisualizationRow>,
    pub truncated: bool,
}

impl Visualization {
    /// Build from a fetch of up to `limit + 1` rows; the extra row only signals truncation.
    pub fn from_rows(mut rows: Vec<VisualizationRow>, limit: i64) -> Self {
        let cap = usize::try_from(limit).unwrap_or(0);
        let truncated = rows.len() > cap;
        rows.truncate(cap);
        Self {
            data: rows,
            truncated,
        }
    }
}

/// Funding awarded by one agency in one calendar year.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FundingByYear {
    pub year: i32,
    pub org: String,
    pub grant_count: i64,
    pub total_value: f64,
}

/// Headline numbers for the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PortalTotals {
    pub grant_count: i64,
    pub total_value: f64,
    pub recipient_count: i64,
    pub institute_count: i64,
}

#[async_trait]
pub trait GrantRepo: Send + Sync {
    /// Count and fetch one page of matching grants.
    async fn search(
        &self,
        query: &SearchQuery,
        user: Option<UserId>,
    ) -> DbResult<Paginated<GrantRecord>>;

    /// All matching grants as flat chart rows, capped at `limit`.
    async fn visualization(&self, query: &SearchQuery, limit: i64) -> DbResult<Visualization>;

    async fn get_by_id(&self, id: i64, user: Option<UserId>) -> DbResult<GrantRecord>;

    async fn list_by_recipient(
        &self,
        recipient_id: i64,
        user: Option<UserId>,
        limit: i64,
    ) -> DbResult<Vec<GrantRecord>>;

    async fn list_by_institute(
        &self,
        institute_id: i64,
        user: Option<UserId>,
        limit: i64,
    ) -> DbResult<Vec<GrantRecord>>;

    async fn funding_by_year(&self) -> DbResult<Vec<FundingByYear>>;

    async fn totals(&self) -> DbResult<PortalTotals>;
}

/// PostgreSQL implementation of GrantRepo.
pub struct PgGrantRepo {
    pool: PgPool,
}

impl PgGrantRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GrantRepo for PgGrantRepo {
    async fn search(
        &self,
        query: &SearchQuery,
        user: Option<UserId>,
    ) -> DbResult<Paginated<GrantRecord>> {
        let total: i64 = count_query(query)
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        // skip the data query when the page is past the end
        let data = if query.page.offset() < total {
            page_query(query, user)
                .build_query_as::<GrantRecord>()
                .fetch_all(&self.pool)
                .await?
        } else {
            Vec::new()
        };

        tracing::debug!(
            total,
            returned = data.len(),
            page = query.page.page,
            "Grant search"
        );

        Ok(Paginated {
            data,
            metadata: query.page.meta(total),
        })
    }

    async fn visualization(
        &self,
        query: &SearchQuery,
        limit: i64,
    ) -> DbResult<Visualization> {
        let rows = visualization_query(query, limit.saturating_add(1))
            .build_query_as::<VisualizationRow>()
            .fetch_all(&self.pool)
            .await?;
        let visualization = Visualization::from_rows(rows, limit);
        if visualization.truncated {
            tracing::warn!(limit, "Visualization result truncated");
        }
        Ok(visualization)
    }

    async fn get_by_id(&self, id: i64, user: Option<UserId>) -> DbResult<GrantRecord> {
        let mut qb = select_grants(user);
        qb.push("\nWHERE g.grant_id = ");
        qb.push_bind(id);
        let record = qb
            .build_query_as::<GrantRecord>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("grant {}", id)))?;
        Ok(record)
    }

    async fn list_by_recipient(
        &self,
        recipient_id: i64,
        user: Option<UserId>,
        limit: i64,
    ) -> DbResult<Vec<GrantRecord>> {
        let mut qb = select_grants(user);
        qb.push("\nWHERE g.recipient_id = ");
        qb.push_bind(recipient_id);
        qb.push("\nORDER BY g.agreement_start_date DESC NULLS LAST, g.grant_id DESC LIMIT ");
        qb.push_bind(limit);
        let records = qb
            .build_query_as::<GrantRecord>()
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn list_by_institute(
        &self,
        institute_id: i64,
        user: Option<UserId>,
        limit: i64,
    ) -> DbResult<Vec<GrantRecord>> {
        let mut qb = select_grants(user);
        qb.push("\nWHERE r.institute_id = ");
        qb.push_bind(institute_id);
        qb.push("\nORDER BY g.agreement_start_date DESC NULLS LAST, g.grant_id DESC LIMIT ");
        qb.push_bind(limit);
        let records = qb
            .build_query_as::<GrantRecord>()
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn funding_by_year(&self) -> DbResult<Vec<FundingByYear>> {
        let rows = sqlx::query_as::<_, FundingByYear>(
            r#"
            SELECT EXTRACT(YEAR FROM agreement_start_date)::INT AS year,
                   org,
                   COUNT(*) AS grant_count,
                   COALESCE(SUM(agreement_value), 0)::FLOAT8 AS total_value
            FROM research_grants
            WHERE agreement_start_date IS NOT NULL
            GROUP BY 1, 2
            ORDER BY 1, 2
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn totals(&self) -> DbResult<PortalTotals> {
        let totals = sqlx::query_as::<_, PortalTotals>(
            r#"
            SELECT COUNT(*) AS grant_count,
                   COALESCE(SUM(agreement_value), 0)::FLOAT8 AS total_value,
                   COUNT(DISTINCT recipient_id) AS recipient_count,
                   (SELECT COUNT(*) FROM institutes) AS institute_count
            FROM research_grants
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(history: Vec<Amendment>) -> GrantRecord {
        GrantRecord {
            grant_id: 7,
            ref_number: "NSERC-2021-0007".to_string(),
            latest_amendment_number: 2,
            amendment_date: NaiveDate::from_ymd_opt(2023, 2, 1),
            agreement_number: None,
            agreement_value: 180_000.0,
            foreign_currency_type: None,
            foreign_currency_value: None,
            agreement_start_date: NaiveDate::from_ymd_opt(2021, 4, 1),
            agreement_end_date: NaiveDate::from_ymd_opt(2026, 3, 31),
            agreement_title_en: Some("Discovery Grants".to_string()),
            description_en: None,
            expected_results_en: None,
            additional_information_en: None,
            org: "NSERC".to_string(),
            org_title_en: None,
            prog_id: None,
            prog_title_en: None,
            prog_purpose_en: None,
            recipient_id: 3,
            legal_name: "Example University".to_string(),
            research_organization_name: None,
            recipient_type: None,
            institute_id: None,
            institute_name: None,
            city: None,
            province: None,
            country: None,
            amendments_history: Json(history),
            is_bookmarked: false,
        }
    }

    fn prior(number: i32, value: f64) -> Amendment {
        Amendment {
            amendment_number: number,
            amendment_date: None,
            agreement_value: Some(value),
            agreement_start_date: NaiveDate::from_ymd_opt(2021, 4, 1),
            agreement_end_date: NaiveDate::from_ymd_opt(2026, 3, 31),
            additional_information_en: None,
        }
    }

    #[test]
    fn test_amendments_include_current_row() {
        let grant = record(vec![prior(0, 120_000.0), prior(1, 150_000.0)]);
        let amendments = grant.amendments();
        assert_eq!(amendments.len(), 3);
        assert_eq!(amendments[0].amendment_number, 2);
        assert_eq!(amendments[0].agreement_value, Some(180_000.0));
    }

    fn chart_row(grant_id: i64) -> VisualizationRow {
        VisualizationRow {
            grant_id,
            agreement_value: 1_000.0,
            agreement_start_date: None,
            org: "SSHRC".to_string(),
            country: None,
            province: None,
            city: None,
            recipient_id: 1,
            legal_name: "Example College".to_string(),
            institute_id: None,
            institute_name: None,
        }
    }

    #[test]
    fn test_visualization_exactly_at_limit_is_not_truncated() {
        let viz = Visualization::from_rows((0..3).map(chart_row).collect(), 3);
        assert_eq!(viz.data.len(), 3);
        assert!(!viz.truncated);
    }

    #[test]
    fn test_visualization_over_limit_is_truncated() {
        let viz = Visualization::from_rows((0..4).map(chart_row).collect(), 3);
        assert_eq!(viz.data.len(), 3);
        assert!(viz.truncated);
        assert_eq!(viz.data.last().map(|r| r.grant_id), Some(2));
    }

    #[test]
    fn test_amendments_dedupe_current_row() {
        let grant = record(vec![prior(2, 180_000.0), prior(0, 120_000.0)]);
        let numbers: Vec<i32> = grant
            .amendments()
            .iter()
            .map(|a| a.amendment_number)
            .collect();
        assert_eq!(numbers, vec![2, 0]);
    }
}
