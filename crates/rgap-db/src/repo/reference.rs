//! Reference data: funding agencies, programs and filter picker values.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::DbResult;

/// A funding agency.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Organization {
    pub org: String,
    pub org_title_en: String,
}

/// A funding program.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Program {
    pub prog_id: String,
    pub name_en: String,
    pub purpose_en: Option<String>,
    pub naics_identifier: Option<String>,
}

/// Distinct values offered by the search filter pickers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterOptions {
    pub agencies: Vec<String>,
    pub countries: Vec<String>,
    pub provinces: Vec<String>,
    pub cities: Vec<String>,
}

#[async_trait]
pub trait ReferenceRepo: Send + Sync {
    async fn list_organizations(&self) -> DbResult<Vec<Organization>>;
    async fn list_programs(&self) -> DbResult<Vec<Program>>;
    async fn filter_options(&self) -> DbResult<FilterOptions>;
}

/// PostgreSQL implementation of ReferenceRepo.
pub struct PgReferenceRepo {
    pool: PgPool,
}

impl PgReferenceRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn distinct(&self, sql: &'static str) -> DbResult<Vec<String>> {
        let values = sqlx::query_scalar::<_, String>(sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(values)
    }
}

#[async_trait]
impl ReferenceRepo for PgReferenceRepo {
    async fn list_organizations(&self) -> DbResult<Vec<Organization>> {
        let orgs = sqlx::query_as::<_, Organization>("SELECT * FROM organizations ORDER BY org")
            .fetch_all(&self.pool)
            .await?;
        Ok(orgs)
    }

    async fn list_programs(&self) -> DbResult<Vec<Program>> {
        let programs = sqlx::query_as::<_, Program>("SELECT * FROM programs ORDER BY name_en")
            .fetch_all(&self.pool)
            .await?;
        Ok(programs)
    }

    async fn filter_options(&self) -> DbResult<FilterOptions> {
        Ok(FilterOptions {
            agencies: self
                .distinct("SELECT DISTINCT org FROM research_grants ORDER BY org")
                .await?,
            countries: self
                .distinct(
                    "SELECT DISTINCT country FROM institutes WHERE country IS NOT NULL ORDER BY country",
                )
                .await?,
            provinces: self
                .distinct(
                    "SELECT DISTINCT province FROM institutes WHERE province IS NOT NULL ORDER BY province",
                )
                .await?,
            cities: self
                .distinct("SELECT DISTINCT city FROM institutes WHERE city IS NOT NULL ORDER BY city")
                .await?,
        })
    }
}
