//! Grant search request model.
//!
//! A [`SearchRequest`] is what a client posts. It is loosely typed: every
//! field is optional and free text is kept as sent. [`SearchRequest::validate`]
//! turns it into a [`SearchQuery`], which is what the database layer consumes:
//! terms are trimmed, empty filters are gone, the sort field has been checked
//! against the whitelist and pagination defaults are applied.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::FieldError;
use crate::pagination::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, Page, PaginationInput};

/// Cap on rows returned by the visualization format.
pub const DEFAULT_VISUALIZATION_LIMIT: i64 = 10_000;

/// Columns a search may be ordered by.
///
/// This is the only path by which a sort column reaches SQL; request text
/// is matched against the names below and never interpolated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortField {
    AgreementStartDate,
    AgreementEndDate,
    AgreementValue,
    RecipientName,
    InstituteName,
    Title,
    Agency,
}

impl SortField {
    pub const ALL: [SortField; 7] = [
        SortField::AgreementStartDate,
        SortField::AgreementEndDate,
        SortField::AgreementValue,
        SortField::RecipientName,
        SortField::InstituteName,
        SortField::Title,
        SortField::Agency,
    ];

    /// Match a client-supplied field name, accepting the short aliases the
    /// web client uses.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "agreement_start_date" | "date" => Some(Self::AgreementStartDate),
            "agreement_end_date" => Some(Self::AgreementEndDate),
            "agreement_value" | "value" => Some(Self::AgreementValue),
            "legal_name" | "recipient" => Some(Self::RecipientName),
            "name" | "institute" => Some(Self::InstituteName),
            "agreement_title_en" | "title" => Some(Self::Title),
            "org" | "agency" => Some(Self::Agency),
            _ => None,
        }
    }

    /// Canonical field name, as echoed back to clients.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgreementStartDate => "agreement_start_date",
            Self::AgreementEndDate => "agreement_end_date",
            Self::AgreementValue => "agreement_value",
            Self::RecipientName => "legal_name",
            Self::InstituteName => "name",
            Self::Title => "agreement_title_en",
            Self::Agency => "org",
        }
    }

    /// Qualified column in the grant search join (`g` grants, `r` recipients,
    /// `i` institutes).
    pub fn column(&self) -> &'static str {
        match self {
            Self::AgreementStartDate => "g.agreement_start_date",
            Self::AgreementEndDate => "g.agreement_end_date",
            Self::AgreementValue => "g.agreement_value",
            Self::RecipientName => "r.legal_name",
            Self::InstituteName => "i.name",
            Self::Title => "g.agreement_title_en",
            Self::Agency => "g.org",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// A resolved ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            field: SortField::AgreementStartDate,
            direction: SortDirection::Desc,
        }
    }
}

impl Sort {
    /// Resolve a requested sort. Unknown fields fall back to `default`
    /// entirely, direction included.
    pub fn resolve(config: Option<&SortConfig>, default: Sort) -> Self {
        let Some(config) = config else {
            return default;
        };
        match SortField::parse(&config.field) {
            Some(field) => Self {
                field,
                direction: config.direction,
            },
            None => default,
        }
    }
}

/// Shape of the result set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultFormat {
    #[default]
    Full,
    Visualization,
}

/// Bounds applied while validating a request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchLimits {
    pub default_page_size: i64,
    pub max_page_size: i64,
    pub visualization_limit: i64,
    pub default_sort: Sort,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            visualization_limit: DEFAULT_VISUALIZATION_LIMIT,
            default_sort: Sort::default(),
        }
    }
}

// ============================================================================
// Request
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchRequest {
    pub search_terms: SearchTerms,
    pub filters: SearchFilters,
    pub sort_config: Option<SortConfig>,
    pub pagination: PaginationInput,
    pub format: ResultFormat,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchTerms {
    pub recipient: Option<String>,
    pub institute: Option<String>,
    pub grant: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchFilters {
    pub date_range: Option<DateRange>,
    pub value_range: Option<ValueRange>,
    pub agencies: Vec<String>,
    pub countries: Vec<String>,
    pub provinces: Vec<String>,
    pub cities: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateRange {
    #[serde(deserialize_with = "deserialize_date")]
    pub from: Option<NaiveDate>,
    #[serde(deserialize_with = "deserialize_date")]
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortConfig {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Accepts `YYYY-MM-DD`, a full ISO-8601 timestamp (date part is kept), an
/// empty string or null.
fn deserialize_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_date(s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid date: {s}"))),
    }
}

/// Parse the leading `YYYY-MM-DD` of a date or timestamp string.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let head = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

// ============================================================================
// Validated query
// ============================================================================

/// Normalized search terms; `None` means "no predicate".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Terms {
    pub recipient: Option<String>,
    pub institute: Option<String>,
    pub grant: Option<String>,
}

impl Terms {
    pub fn is_empty(&self) -> bool {
        self.recipient.is_none() && self.institute.is_none() && self.grant.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Filters {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub value_min: Option<f64>,
    pub value_max: Option<f64>,
    pub agencies: Vec<String>,
    pub countries: Vec<String>,
    pub provinces: Vec<String>,
    pub cities: Vec<String>,
}

impl Filters {
    pub fn is_empty(&self) -> bool {
        self.date_from.is_none()
            && self.date_to.is_none()
            && self.value_min.is_none()
            && self.value_max.is_none()
            && self.agencies.is_empty()
            && self.countries.is_empty()
            && self.provinces.is_empty()
            && self.cities.is_empty()
    }
}

/// A search ready to be turned into SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub terms: Terms,
    pub filters: Filters,
    pub sort: Sort,
    pub page: Page,
    pub format: ResultFormat,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            terms: Terms::default(),
            filters: Filters::default(),
            sort: Sort::default(),
            page: Page::default(),
            format: ResultFormat::Full,
        }
    }
}

impl SearchRequest {
    /// Check bounds and normalize. All problems are collected, not just the
    /// first one.
    pub fn validate(&self, limits: &SearchLimits) -> Result<SearchQuery, Vec<FieldError>> {
        let mut errors = Vec::new();

        let page = match self.pagination.resolve(
            "pagination.",
            limits.default_page_size,
            limits.max_page_size,
        ) {
            Ok(page) => page,
            Err(mut errs) => {
                errors.append(&mut errs);
                Page::default()
            }
        };

        let mut filters = Filters::default();
        if let Some(range) = &self.filters.date_range {
            if let (Some(from), Some(to)) = (range.from, range.to) {
                if from > to {
                    errors.push(FieldError::new(
                        "filters.dateRange",
                        "from must not be after to",
                    ));
                }
            }
            filters.date_from = range.from;
            filters.date_to = range.to;
        }
        if let Some(range) = &self.filters.value_range {
            for (name, value) in [("min", range.min), ("max", range.max)] {
                if let Some(v) = value {
                    if !v.is_finite() || v < 0.0 {
                        errors.push(FieldError::new(
                            format!("filters.valueRange.{name}"),
                            "must be a non-negative number",
                        ));
                    }
                }
            }
            if let (Some(min), Some(max)) = (range.min, range.max) {
                if min > max {
                    errors.push(FieldError::new(
                        "filters.valueRange",
                        "min must not exceed max",
                    ));
                }
            }
            filters.value_min = range.min;
            filters.value_max = range.max;
        }
        filters.agencies = normalize_list(&self.filters.agencies);
        filters.countries = normalize_list(&self.filters.countries);
        filters.provinces = normalize_list(&self.filters.provinces);
        filters.cities = normalize_list(&self.filters.cities);

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(SearchQuery {
            terms: Terms {
                recipient: normalize_term(self.search_terms.recipient.as_deref()),
                institute: normalize_term(self.search_terms.institute.as_deref()),
                grant: normalize_term(self.search_terms.grant.as_deref()),
            },
            filters,
            sort: Sort::resolve(self.sort_config.as_ref(), limits.default_sort),
            page,
            format: self.format,
        })
    }
}

impl SearchQuery {
    /// One-line description of what was searched for, shown in search
    /// history and saved-search bookmarks.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        let terms = &self.terms;
        for (label, term) in [
            ("recipient", &terms.recipient),
            ("institute", &terms.institute),
            ("grant", &terms.grant),
        ] {
            if let Some(term) = term {
                parts.push(format!("{label} \"{term}\""));
            }
        }

        let filters = &self.filters;
        for (label, values) in [
            ("agencies", &filters.agencies),
            ("countries", &filters.countries),
            ("provinces", &filters.provinces),
            ("cities", &filters.cities),
        ] {
            if !values.is_empty() {
                parts.push(format!("{label} {}", values.join(", ")));
            }
        }
        match (filters.date_from, filters.date_to) {
            (Some(from), Some(to)) => parts.push(format!("{from} to {to}")),
            (Some(from), None) => parts.push(format!("from {from}")),
            (None, Some(to)) => parts.push(format!("until {to}")),
            (None, None) => {}
        }
        match (filters.value_min, filters.value_max) {
            (Some(min), Some(max)) => parts.push(format!("${min:.0}-${max:.0}")),
            (Some(min), None) => parts.push(format!("at least ${min:.0}")),
            (None, Some(max)) => parts.push(format!("at most ${max:.0}")),
            (None, None) => {}
        }

        if parts.is_empty() {
            "All grants".to_string()
        } else {
            parts.join("; ")
        }
    }
}

fn normalize_term(term: Option<&str>) -> Option<String> {
    term.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn normalize_list(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for v in values {
        let v = v.trim();
        if !v.is_empty() && !out.iter().any(|seen| seen.eq_ignore_ascii_case(v)) {
            out.push(v.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> SearchRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_empty_body_uses_defaults() {
        let query = parse(json!({})).validate(&SearchLimits::default()).unwrap();
        assert!(query.terms.is_empty());
        assert!(query.filters.is_empty());
        assert_eq!(query.sort, Sort::default());
        assert_eq!(query.page, Page::default());
        assert_eq!(query.format, ResultFormat::Full);
    }

    #[test]
    fn test_full_request_parses() {
        let req = parse(json!({
            "searchTerms": { "recipient": "  McGill ", "institute": "", "grant": "quantum" },
            "filters": {
                "dateRange": { "from": "2019-01-01", "to": "2023-12-31T00:00:00.000Z" },
                "valueRange": { "min": 1000, "max": 500000 },
                "agencies": ["NSERC", "CIHR", " nserc ", ""],
                "provinces": ["QC"]
            },
            "sortConfig": { "field": "value", "direction": "asc" },
            "pagination": { "page": 2, "pageSize": 50 },
            "format": "visualization"
        }));
        let query = req.validate(&SearchLimits::default()).unwrap();

        assert_eq!(query.terms.recipient.as_deref(), Some("McGill"));
        assert_eq!(query.terms.institute, None);
        assert_eq!(query.terms.grant.as_deref(), Some("quantum"));
        assert_eq!(query.filters.date_from, NaiveDate::from_ymd_opt(2019, 1, 1));
        assert_eq!(query.filters.date_to, NaiveDate::from_ymd_opt(2023, 12, 31));
        assert_eq!(query.filters.agencies, vec!["NSERC", "CIHR"]);
        assert_eq!(query.filters.provinces, vec!["QC"]);
        assert_eq!(query.sort.field, SortField::AgreementValue);
        assert_eq!(query.sort.direction, SortDirection::Asc);
        assert_eq!(query.page.offset(), 50);
        assert_eq!(query.format, ResultFormat::Visualization);
    }

    #[test]
    fn test_unknown_sort_field_falls_back_to_default() {
        let req = parse(json!({
            "sortConfig": { "field": "password_hash; DROP TABLE users", "direction": "asc" }
        }));
        let query = req.validate(&SearchLimits::default()).unwrap();
        assert_eq!(query.sort, Sort::default());
    }

    #[test]
    fn test_sort_without_field_falls_back_to_default() {
        let query = parse(json!({ "sortConfig": { "direction": "asc" } }))
            .validate(&SearchLimits::default())
            .unwrap();
        assert_eq!(query.sort, Sort::default());
    }

    #[test]
    fn test_configured_default_sort_is_used() {
        let limits = SearchLimits {
            default_sort: Sort {
                field: SortField::AgreementValue,
                direction: SortDirection::Asc,
            },
            ..SearchLimits::default()
        };
        let query = parse(json!({ "sortConfig": { "field": "bogus" } }))
            .validate(&limits)
            .unwrap();
        assert_eq!(query.sort, limits.default_sort);
    }

    #[test]
    fn test_every_sort_field_round_trips_its_name() {
        for field in SortField::ALL {
            assert_eq!(SortField::parse(field.as_str()), Some(field));
            assert!(field.column().starts_with(['g', 'r', 'i']));
        }
    }

    #[test]
    fn test_invalid_ranges_are_collected() {
        let req = parse(json!({
            "filters": {
                "dateRange": { "from": "2024-01-01", "to": "2020-01-01" },
                "valueRange": { "min": -5, "max": -10 }
            },
            "pagination": { "page": 0 }
        }));
        let errors = req.validate(&SearchLimits::default()).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"pagination.page"));
        assert!(fields.contains(&"filters.dateRange"));
        assert!(fields.contains(&"filters.valueRange.min"));
        assert!(fields.contains(&"filters.valueRange.max"));
        assert!(fields.contains(&"filters.valueRange"));
    }

    #[test]
    fn test_page_size_above_limit_is_rejected() {
        let req = parse(json!({ "pagination": { "pageSize": 101 } }));
        let errors = req.validate(&SearchLimits::default()).unwrap_err();
        assert_eq!(errors[0].field, "pagination.pageSize");
    }

    #[test]
    fn test_bad_date_and_direction_fail_to_deserialize() {
        assert!(
            serde_json::from_value::<SearchRequest>(json!({
                "filters": { "dateRange": { "from": "yesterday" } }
            }))
            .is_err()
        );
        assert!(
            serde_json::from_value::<SearchRequest>(json!({
                "sortConfig": { "field": "date", "direction": "sideways" }
            }))
            .is_err()
        );
        assert!(serde_json::from_value::<SearchRequest>(json!({ "format": "csv" })).is_err());
    }

    #[test]
    fn test_summary_describes_constraints() {
        let query = parse(json!({
            "searchTerms": { "recipient": "Laval" },
            "filters": {
                "agencies": ["CIHR"],
                "dateRange": { "from": "2020-01-01" },
                "valueRange": { "min": 5000, "max": 20000 }
            }
        }))
        .validate(&SearchLimits::default())
        .unwrap();
        assert_eq!(
            query.summary(),
            "recipient \"Laval\"; agencies CIHR; from 2020-01-01; $5000-$20000"
        );
        assert_eq!(SearchQuery::default().summary(), "All grants");
    }

    #[test]
    fn test_blank_dates_are_no_filter() {
        let req = parse(json!({ "filters": { "dateRange": { "from": "", "to": null } } }));
        let query = req.validate(&SearchLimits::default()).unwrap();
        assert!(query.filters.is_empty());
    }
}
