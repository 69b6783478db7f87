//! Offset pagination.

use serde::{Deserialize, Serialize};

use crate::FieldError;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Page bounds as sent by a client. Both fields are optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaginationInput {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl PaginationInput {
    /// Resolve defaults and check bounds. Errors are reported under `prefix`.
    pub fn resolve(
        &self,
        prefix: &str,
        default_page_size: i64,
        max_page_size: i64,
    ) -> Result<Page, Vec<FieldError>> {
        let mut errors = Vec::new();
        let page = self.page.unwrap_or(1);
        let page_size = self.page_size.unwrap_or(default_page_size);

        if page < 1 {
            errors.push(FieldError::new(
                format!("{prefix}page"),
                "must be greater than or equal to 1",
            ));
        }
        if page_size < 1 || page_size > max_page_size {
            errors.push(FieldError::new(
                format!("{prefix}pageSize"),
                format!("must be between 1 and {max_page_size}"),
            ));
        }

        if errors.is_empty() {
            Ok(Page { page, page_size })
        } else {
            Err(errors)
        }
    }
}

/// A validated, 1-based page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub page: i64,
    pub page_size: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Page {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    /// Metadata for a result set of `total_count` rows viewed through this page.
    pub fn meta(&self, total_count: i64) -> PageMeta {
        let total_count = total_count.max(0);
        let total_pages = if total_count == 0 {
            0
        } else {
            (total_count + self.page_size - 1) / self.page_size
        };
        PageMeta {
            total_count,
            page: self.page,
            page_size: self.page_size,
            total_pages,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total_count: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl PageMeta {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

/// One page of rows plus the metadata describing where it sits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub metadata: PageMeta,
}
