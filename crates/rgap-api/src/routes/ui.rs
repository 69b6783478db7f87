//! UI routes serving HTML templates.

use askama::Template;
use axum::Router;
use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Form, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum_extra::extract::CookieJar;
use chrono::NaiveDate;
use rgap_core::FieldError;
use rgap_core::bookmark::EntityKind;
use rgap_core::grant::value_change;
use rgap_core::pagination::PaginationInput;
use rgap_core::search::{
    DateRange, ResultFormat, SearchFilters, SearchRequest, SearchTerms, SortConfig, SortDirection,
    SortField, ValueRange, parse_date,
};
use rgap_db::{BookmarkRepo, GrantRecord, GrantRepo};
use serde::Deserialize;

use super::auth::{SignupRequest, register};
use super::grants::record_search;
use crate::AppState;
use crate::auth::{MaybeUser, authenticate, end_session, removal_cookie, start_session};
use crate::error::ApiError;

// ============================================================================
// Template structs
// ============================================================================

#[derive(Template)]
#[template(path = "pages/dashboard.html")]
struct DashboardTemplate {
    user: Option<String>,
    grant_count: i64,
    total_value: String,
    recipient_count: i64,
    institute_count: i64,
    years: Vec<YearView>,
}

#[derive(Template)]
#[template(path = "pages/search.html")]
struct SearchTemplate {
    user: Option<String>,
    form: SearchForm,
    sort_options: Vec<SortOption>,
    errors: Vec<FieldError>,
    summary: String,
    total_count: i64,
    page: i64,
    total_pages: i64,
    prev_url: Option<String>,
    next_url: Option<String>,
    grants: Vec<GrantRowView>,
}

#[derive(Template)]
#[template(path = "pages/grant.html")]
struct GrantTemplate {
    user: Option<String>,
    grant: GrantView,
    amendments: Vec<AmendmentView>,
    value_change: Option<String>,
    is_bookmarked: bool,
}

#[derive(Template)]
#[template(path = "pages/bookmarks.html")]
struct BookmarksTemplate {
    user: Option<String>,
    sections: Vec<BookmarkSection>,
}

#[derive(Template)]
#[template(path = "pages/login.html")]
struct LoginTemplate {
    user: Option<String>,
    email: String,
    error: Option<String>,
}

// ============================================================================
// View models
// ============================================================================

struct YearView {
    year: i32,
    org: String,
    grant_count: i64,
    total_value: String,
}

struct SortOption {
    value: &'static str,
    label: &'static str,
    selected: bool,
}

struct GrantRowView {
    id: i64,
    ref_number: String,
    title: String,
    recipient_id: i64,
    recipient: String,
    institute: String,
    org: String,
    value: String,
    start: String,
    end: String,
    is_bookmarked: bool,
}

struct GrantView {
    id: i64,
    ref_number: String,
    title: String,
    description: String,
    expected_results: String,
    org: String,
    program: String,
    recipient_id: i64,
    recipient: String,
    institute: String,
    location: String,
    value: String,
    start: String,
    end: String,
}

struct AmendmentView {
    number: i32,
    date: String,
    value: String,
    start: String,
    end: String,
    info: String,
}

struct BookmarkSection {
    title: &'static str,
    items: Vec<BookmarkView>,
}

struct BookmarkView {
    label: String,
    href: String,
    notes: String,
    saved: String,
}

impl From<&GrantRecord> for GrantRowView {
    fn from(g: &GrantRecord) -> Self {
        Self {
            id: g.grant_id,
            ref_number: g.ref_number.clone(),
            title: g.agreement_title_en.clone().unwrap_or_default(),
            recipient_id: g.recipient_id,
            recipient: g.legal_name.clone(),
            institute: g.institute_name.clone().unwrap_or_default(),
            org: g.org.clone(),
            value: format_money(g.agreement_value),
            start: format_date(g.agreement_start_date),
            end: format_date(g.agreement_end_date),
            is_bookmarked: g.is_bookmarked,
        }
    }
}

impl From<&GrantRecord> for GrantView {
    fn from(g: &GrantRecord) -> Self {
        let location = [&g.city, &g.province, &g.country]
            .into_iter()
            .flatten()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            id: g.grant_id,
            ref_number: g.ref_number.clone(),
            title: g
                .agreement_title_en
                .clone()
                .unwrap_or_else(|| g.ref_number.clone()),
            description: g.description_en.clone().unwrap_or_default(),
            expected_results: g.expected_results_en.clone().unwrap_or_default(),
            org: g.org_title_en.clone().unwrap_or_else(|| g.org.clone()),
            program: g.prog_title_en.clone().unwrap_or_default(),
            recipient_id: g.recipient_id,
            recipient: g.legal_name.clone(),
            institute: g.institute_name.clone().unwrap_or_default(),
            location,
            value: format_money(g.agreement_value),
            start: format_date(g.agreement_start_date),
            end: format_date(g.agreement_end_date),
        }
    }
}

// ============================================================================
// Search form
// ============================================================================

/// `/search` query parameters. List filters are comma separated.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct SearchForm {
    recipient: String,
    institute: String,
    grant: String,
    agencies: String,
    countries: String,
    provinces: String,
    cities: String,
    from: String,
    to: String,
    min: String,
    max: String,
    sort: String,
    dir: String,
    page: String,
}

impl SearchForm {
    /// Map the form onto the JSON search request; field errors use the same
    /// paths the JSON API reports.
    fn to_request(&self) -> Result<SearchRequest, Vec<FieldError>> {
        let mut errors = Vec::new();

        let from = parse_form_date("filters.dateRange.from", &self.from, &mut errors);
        let to = parse_form_date("filters.dateRange.to", &self.to, &mut errors);
        let min = parse_form_value::<f64>("filters.valueRange.min", &self.min, &mut errors);
        let max = parse_form_value::<f64>("filters.valueRange.max", &self.max, &mut errors);
        let page = parse_form_value::<i64>("pagination.page", &self.page, &mut errors);

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(SearchRequest {
            search_terms: SearchTerms {
                recipient: non_blank(&self.recipient),
                institute: non_blank(&self.institute),
                grant: non_blank(&self.grant),
            },
            filters: SearchFilters {
                date_range: (from.is_some() || to.is_some()).then_some(DateRange { from, to }),
                value_range: (min.is_some() || max.is_some()).then_some(ValueRange { min, max }),
                agencies: split_list(&self.agencies),
                countries: split_list(&self.countries),
                provinces: split_list(&self.provinces),
                cities: split_list(&self.cities),
            },
            sort_config: non_blank(&self.sort).map(|field| SortConfig {
                field,
                direction: SortDirection::parse(&self.dir).unwrap_or_default(),
            }),
            pagination: PaginationInput {
                page,
                page_size: None,
            },
            format: ResultFormat::Full,
        })
    }

    /// Query string reproducing this search at `page`.
    fn query_string(&self, page: i64) -> String {
        let fields = [
            ("recipient", &self.recipient),
            ("institute", &self.institute),
            ("grant", &self.grant),
            ("agencies", &self.agencies),
            ("countries", &self.countries),
            ("provinces", &self.provinces),
            ("cities", &self.cities),
            ("from", &self.from),
            ("to", &self.to),
            ("min", &self.min),
            ("max", &self.max),
            ("sort", &self.sort),
            ("dir", &self.dir),
        ];
        let mut parts: Vec<String> = fields
            .iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value.trim())))
            .collect();
        parts.push(format!("page={}", page));
        parts.join("&")
    }
}

fn non_blank(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_form_date(field: &str, raw: &str, errors: &mut Vec<FieldError>) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let date = parse_date(raw);
    if date.is_none() {
        errors.push(FieldError::new(field, "must be a date (YYYY-MM-DD)"));
    }
    date
}

fn parse_form_value<T: std::str::FromStr>(
    field: &str,
    raw: &str,
    errors: &mut Vec<FieldError>,
) -> Option<T> {
    let raw = raw.trim().replace(',', "");
    if raw.is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            errors.push(FieldError::new(field, "must be a number"));
            None
        }
    }
}

fn sort_label(field: SortField) -> &'static str {
    match field {
        SortField::AgreementStartDate => "Start date",
        SortField::AgreementEndDate => "End date",
        SortField::AgreementValue => "Value",
        SortField::RecipientName => "Recipient",
        SortField::InstituteName => "Institute",
        SortField::Title => "Title",
        SortField::Agency => "Agency",
    }
}

// ============================================================================
// Routes
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(dashboard_page))
        .route("/search", get(search_page))
        .route("/grants/{id}", get(grant_page))
        .route("/grants/{id}/bookmark", post(toggle_grant_bookmark))
        .route("/bookmarks", get(bookmarks_page))
        .route("/login", get(login_page).post(login_submit))
        .route("/signup", post(signup_submit))
        .route("/logout", post(logout_submit))
}

fn render<T: Template>(template: T) -> Result<Html<String>, ApiError> {
    template
        .render()
        .map(Html)
        .map_err(|e| ApiError::Internal(format!("Template error: {}", e)))
}

fn display_name(user: &MaybeUser) -> Option<String> {
    user.0
        .as_ref()
        .map(|u| u.name.clone().unwrap_or_else(|| u.email.clone()))
}

// ============================================================================
// Page handlers
// ============================================================================

async fn dashboard_page(
    State(state): State<AppState>,
    user: MaybeUser,
) -> Result<impl IntoResponse, ApiError> {
    let totals = state.grant_repo.totals().await?;
    let years = state
        .grant_repo
        .funding_by_year()
        .await?
        .into_iter()
        .map(|row| YearView {
            year: row.year,
            org: row.org,
            grant_count: row.grant_count,
            total_value: format_money(row.total_value),
        })
        .collect();

    render(DashboardTemplate {
        user: display_name(&user),
        grant_count: totals.grant_count,
        total_value: format_money(totals.total_value),
        recipient_count: totals.recipient_count,
        institute_count: totals.institute_count,
        years,
    })
}

async fn search_page(
    State(state): State<AppState>,
    user: MaybeUser,
    form: Result<Query<SearchForm>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(form) = form?;
    let sort_field = SortField::parse(&form.sort);
    let sort_options = SortField::ALL
        .iter()
        .map(|&field| SortOption {
            value: field.as_str(),
            label: sort_label(field),
            selected: sort_field == Some(field),
        })
        .collect();

    let mut template = SearchTemplate {
        user: display_name(&user),
        form: form.clone(),
        sort_options,
        errors: Vec::new(),
        summary: String::new(),
        total_count: 0,
        page: 1,
        total_pages: 0,
        prev_url: None,
        next_url: None,
        grants: Vec::new(),
    };

    let validated = form
        .to_request()
        .and_then(|request| {
            let query = request.validate(&state.config.search)?;
            Ok((request, query))
        });
    let (request, query) = match validated {
        Ok(ok) => ok,
        Err(errors) => {
            template.errors = errors;
            return Ok((StatusCode::BAD_REQUEST, render(template)?).into_response());
        }
    };

    let result = state.grant_repo.search(&query, user.id()).await?;
    if let Some(user_id) = user.id() {
        if query.page.page == 1 {
            record_search(&state, user_id, &request, &query, result.metadata.total_count).await;
        }
    }

    let meta = result.metadata;
    template.summary = query.summary();
    template.total_count = meta.total_count;
    template.page = meta.page;
    template.total_pages = meta.total_pages;
    template.prev_url = meta
        .has_prev()
        .then(|| format!("/search?{}", form.query_string(meta.page - 1)));
    template.next_url = meta
        .has_next()
        .then(|| format!("/search?{}", form.query_string(meta.page + 1)));
    template.grants = result.data.iter().map(GrantRowView::from).collect();

    Ok(render(template)?.into_response())
}

async fn grant_page(
    State(state): State<AppState>,
    user: MaybeUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = path?;
    let grant = state.grant_repo.get_by_id(id, user.id()).await?;
    let timeline = grant.amendments();
    let change = value_change(&timeline).filter(|delta| *delta != 0.0);

    let amendments = timeline
        .iter()
        .map(|a| AmendmentView {
            number: a.amendment_number,
            date: format_date(a.amendment_date),
            value: a.agreement_value.map(format_money).unwrap_or_default(),
            start: format_date(a.agreement_start_date),
            end: format_date(a.agreement_end_date),
            info: a.additional_information_en.clone().unwrap_or_default(),
        })
        .collect();

    render(GrantTemplate {
        user: display_name(&user),
        grant: GrantView::from(&grant),
        amendments,
        value_change: change.map(format_signed_money),
        is_bookmarked: grant.is_bookmarked,
    })
}

#[derive(Debug, Deserialize)]
struct BookmarkForm {
    is_bookmarked: bool,
}

async fn toggle_grant_bookmark(
    State(state): State<AppState>,
    user: MaybeUser,
    path: Result<Path<i64>, PathRejection>,
    Form(form): Form<BookmarkForm>,
) -> Result<Redirect, ApiError> {
    let Path(id) = path?;
    let Some(user_id) = user.id() else {
        return Ok(Redirect::to("/login"));
    };
    state
        .bookmark_repo
        .toggle(user_id, EntityKind::Grant, id, form.is_bookmarked)
        .await?;
    Ok(Redirect::to(&format!("/grants/{}", id)))
}

async fn bookmarks_page(
    State(state): State<AppState>,
    user: MaybeUser,
) -> Result<Response, ApiError> {
    let Some(user_id) = user.id() else {
        return Ok(Redirect::to("/login").into_response());
    };

    let mut sections = Vec::with_capacity(EntityKind::ALL.len());
    for kind in EntityKind::ALL {
        let items = state
            .bookmark_repo
            .list(user_id, kind)
            .await?
            .into_iter()
            .map(|b| BookmarkView {
                href: bookmark_href(kind, b.entity_id),
                label: b.label,
                notes: b.notes.unwrap_or_default(),
                saved: b.bookmarked_at.format("%Y-%m-%d").to_string(),
            })
            .collect();
        sections.push(BookmarkSection {
            title: section_title(kind),
            items,
        });
    }

    Ok(render(BookmarksTemplate {
        user: display_name(&user),
        sections,
    })?
    .into_response())
}

fn bookmark_href(kind: EntityKind, id: i64) -> String {
    match kind {
        EntityKind::Grant => format!("/grants/{}", id),
        EntityKind::Recipient => format!("/api/recipients/{}", id),
        EntityKind::Institute => format!("/api/institutes/{}", id),
        EntityKind::Search => format!("/api/history/{}", id),
    }
}

fn section_title(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Grant => "Grants",
        EntityKind::Recipient => "Recipients",
        EntityKind::Institute => "Institutes",
        EntityKind::Search => "Saved searches",
    }
}

// ============================================================================
// Sign-in forms
// ============================================================================

async fn login_page(user: MaybeUser) -> Result<impl IntoResponse, ApiError> {
    render(LoginTemplate {
        user: display_name(&user),
        email: String::new(),
        error: None,
    })
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    email: String,
    password: String,
}

fn login_error(email: String, status: StatusCode, message: String) -> Result<Response, ApiError> {
    let page = render(LoginTemplate {
        user: None,
        email,
        error: Some(message),
    })?;
    Ok((status, page).into_response())
}

async fn login_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
    let user = match authenticate(&state, &form.email, &form.password).await {
        Ok(user) => user,
        Err(ApiError::Unauthorized(message)) => {
            return login_error(form.email, StatusCode::UNAUTHORIZED, message);
        }
        Err(e) => return Err(e),
    };
    let cookie = start_session(&state, &user, &headers).await?;
    Ok((jar.add(cookie), Redirect::to("/")).into_response())
}

async fn signup_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Form(form): Form<SignupRequest>,
) -> Result<Response, ApiError> {
    let user = match register(&state, &form).await {
        Ok(user) => user,
        Err(ApiError::Validation(errors)) => {
            let message = errors
                .iter()
                .map(|e| format!("{} {}", e.field, e.message))
                .collect::<Vec<_>>()
                .join("; ");
            return login_error(form.email, StatusCode::BAD_REQUEST, message);
        }
        Err(ApiError::Conflict(_)) => {
            return login_error(
                form.email,
                StatusCode::CONFLICT,
                "An account with that email already exists".to_string(),
            );
        }
        Err(e) => return Err(e),
    };
    let cookie = start_session(&state, &user, &headers).await?;
    Ok((jar.add(cookie), Redirect::to("/")).into_response())
}

async fn logout_submit(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), ApiError> {
    end_session(&state, &jar).await?;
    Ok((jar.remove(removal_cookie()), Redirect::to("/")))
}

// ============================================================================
// Formatting helpers
// ============================================================================

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Whole dollars with thousands separators.
fn format_money(value: f64) -> String {
    let rounded = value.abs().round() as u64;
    let digits = rounded.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if value < 0.0 && rounded > 0 {
        format!("-${}", grouped)
    } else {
        format!("${}", grouped)
    }
}

fn format_signed_money(value: f64) -> String {
    if value > 0.0 {
        format!("+{}", format_money(value))
    } else {
        format_money(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(0.0), "$0");
        assert_eq!(format_money(999.4), "$999");
        assert_eq!(format_money(1_000.0), "$1,000");
        assert_eq!(format_money(1_234_567.8), "$1,234,568");
        assert_eq!(format_money(-2_500.0), "-$2,500");
        assert_eq!(format_signed_money(2_500.0), "+$2,500");
        assert_eq!(format_signed_money(-10.0), "-$10");
    }

    #[test]
    fn test_form_maps_onto_search_request() {
        let form = SearchForm {
            recipient: "  Laval ".to_string(),
            agencies: "NSERC, CIHR,,".to_string(),
            from: "2020-01-01".to_string(),
            min: "5,000".to_string(),
            sort: "value".to_string(),
            dir: "asc".to_string(),
            page: "2".to_string(),
            ..SearchForm::default()
        };
        let request = form.to_request().unwrap();

        assert_eq!(request.search_terms.recipient.as_deref(), Some("Laval"));
        assert_eq!(request.search_terms.institute, None);
        assert_eq!(request.filters.agencies, vec!["NSERC", "CIHR"]);
        assert_eq!(
            request.filters.date_range,
            Some(DateRange {
                from: NaiveDate::from_ymd_opt(2020, 1, 1),
                to: None,
            })
        );
        assert_eq!(request.filters.value_range.unwrap().min, Some(5_000.0));
        let sort = request.sort_config.unwrap();
        assert_eq!(sort.field, "value");
        assert_eq!(sort.direction, SortDirection::Asc);
        assert_eq!(request.pagination.page, Some(2));
    }

    #[test]
    fn test_form_reports_unparseable_fields() {
        let form = SearchForm {
            to: "yesterday".to_string(),
            max: "lots".to_string(),
            ..SearchForm::default()
        };
        let errors = form.to_request().unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["filters.dateRange.to", "filters.valueRange.max"]);
    }

    #[test]
    fn test_empty_form_searches_everything() {
        let request = SearchForm::default().to_request().unwrap();
        assert_eq!(request, SearchRequest::default());
    }

    #[test]
    fn test_query_string_keeps_filters_and_sets_page() {
        let form = SearchForm {
            recipient: "Université Laval".to_string(),
            agencies: "NSERC,CIHR".to_string(),
            page: "1".to_string(),
            ..SearchForm::default()
        };
        assert_eq!(
            form.query_string(3),
            "recipient=Universit%C3%A9%20Laval&agencies=NSERC%2CCIHR&page=3"
        );
    }

    #[test]
    fn test_bookmark_links() {
        assert_eq!(bookmark_href(EntityKind::Grant, 9), "/grants/9");
        assert_eq!(bookmark_href(EntityKind::Search, 4), "/api/history/4");
    }
}
