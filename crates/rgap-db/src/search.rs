//! Dynamic grant search queries.
//!
//! Every value taken from a request is bound as a parameter. The only text
//! spliced into SQL comes from `&'static str` tables: the sort whitelist in
//! [`SortField::column`](rgap_core::search::SortField::column) and the
//! predicate fragments below.

use rgap_core::UserId;
use rgap_core::search::{SearchQuery, SortDirection};
use sqlx::{Postgres, QueryBuilder};

/// Joined relation every grant query reads from.
pub const GRANT_FROM: &str = r#"
FROM research_grants g
JOIN recipients r ON r.recipient_id = g.recipient_id
LEFT JOIN institutes i ON i.institute_id = r.institute_id
LEFT JOIN organizations o ON o.org = g.org
LEFT JOIN programs p ON p.prog_id = g.prog_id"#;

/// Columns decoded into [`GrantRecord`](crate::GrantRecord), minus
/// `is_bookmarked`.
pub const GRANT_COLUMNS: &str = r#"
SELECT g.grant_id, g.ref_number, g.latest_amendment_number, g.amendment_date,
       g.agreement_number, g.agreement_value, g.foreign_currency_type,
       g.foreign_currency_value, g.agreement_start_date, g.agreement_end_date,
       g.agreement_title_en, g.description_en, g.expected_results_en,
       g.additional_information_en, g.org, o.org_title_en, g.prog_id,
       p.name_en AS prog_title_en, p.purpose_en AS prog_purpose_en,
       g.recipient_id, r.legal_name, r.research_organization_name, r.recipient_type,
       r.institute_id, i.name AS institute_name, i.city, i.province, i.country,
       g.amendments_history"#;

/// Escape `LIKE` metacharacters so a term matches literally, and wrap it
/// for a substring match.
pub fn contains_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn upper_all(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.to_uppercase()).collect()
}

/// Start a grant select. With a user, a `bookmarked_grants` join reports
/// whether that user bookmarked each row.
pub fn select_grants(user: Option<UserId>) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(GRANT_COLUMNS);
    match user {
        Some(user) => {
            qb.push(", (bg.grant_id IS NOT NULL) AS is_bookmarked");
            qb.push(GRANT_FROM);
            qb.push(
                "\nLEFT JOIN bookmarked_grants bg ON bg.grant_id = g.grant_id AND bg.user_id = ",
            );
            qb.push_bind(*user.as_uuid());
        }
        None => {
            qb.push(", FALSE AS is_bookmarked");
            qb.push(GRANT_FROM);
        }
    }
    qb
}

/// Append the `WHERE` clause for the query's terms and filters. Nothing is
/// appended when the search is unconstrained.
pub fn push_predicates(qb: &mut QueryBuilder<'static, Postgres>, query: &SearchQuery) {
    if query.terms.is_empty() && query.filters.is_empty() {
        return;
    }

    qb.push("\nWHERE ");
    let mut preds = qb.separated(" AND ");

    let terms = &query.terms;
    if let Some(term) = &terms.recipient {
        preds.push("r.legal_name ILIKE ");
        preds.push_bind_unseparated(contains_pattern(term));
    }
    if let Some(term) = &terms.institute {
        preds.push("i.name ILIKE ");
        preds.push_bind_unseparated(contains_pattern(term));
    }
    if let Some(term) = &terms.grant {
        preds.push("g.agreement_title_en ILIKE ");
        preds.push_bind_unseparated(contains_pattern(term));
    }

    let filters = &query.filters;
    if let Some(from) = filters.date_from {
        preds.push("g.agreement_start_date >= ");
        preds.push_bind_unseparated(from);
    }
    if let Some(to) = filters.date_to {
        preds.push("g.agreement_start_date <= ");
        preds.push_bind_unseparated(to);
    }
    if let Some(min) = filters.value_min {
        preds.push("g.agreement_value >= ");
        preds.push_bind_unseparated(min);
    }
    if let Some(max) = filters.value_max {
        preds.push("g.agreement_value <= ");
        preds.push_bind_unseparated(max);
    }

    for (column, values) in [
        ("g.org", &filters.agencies),
        ("i.country", &filters.countries),
        ("i.province", &filters.provinces),
        ("i.city", &filters.cities),
    ] {
        if values.is_empty() {
            continue;
        }
        preds.push(format_args!("UPPER({column}) = ANY("));
        preds.push_bind_unseparated(upper_all(values));
        preds.push_unseparated(")");
    }
}

/// `SELECT COUNT(*)` over the filtered join.
pub fn count_query(query: &SearchQuery) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*)");
    qb.push(GRANT_FROM);
    push_predicates(&mut qb, query);
    qb
}

/// One sorted page of grants.
pub fn page_query(query: &SearchQuery, user: Option<UserId>) -> QueryBuilder<'static, Postgres> {
    let mut qb = select_grants(user);
    push_predicates(&mut qb, query);

    let nulls = match query.sort.direction {
        SortDirection::Asc => "NULLS FIRST",
        SortDirection::Desc => "NULLS LAST",
    };
    qb.push(format_args!(
        "\nORDER BY {} {} {}, g.grant_id DESC",
        query.sort.field.column(),
        query.sort.direction.as_sql(),
        nulls
    ));
    qb.push("\nLIMIT ");
    qb.push_bind(query.page.limit());
    qb.push(" OFFSET ");
    qb.push_bind(query.page.offset());
    qb
}

/// Flat rows for charting: every match, oldest first, capped at `limit`.
pub fn visualization_query(query: &SearchQuery, limit: i64) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(
        r#"
SELECT g.grant_id, g.agreement_value, g.agreement_start_date, g.org,
       i.country, i.province, i.city, g.recipient_id, r.legal_name,
       r.institute_id, i.name AS institute_name"#,
    );
    qb.push(GRANT_FROM);
    push_predicates(&mut qb, query);
    qb.push("\nORDER BY g.agreement_start_date ASC NULLS LAST, g.grant_id ASC");
    qb.push("\nLIMIT ");
    qb.push_bind(limit);
    qb
}
