pub mod audit;
pub mod health;
pub mod incidents;
pub mod services;
pub mod slos;

use axum::http::{HeaderName, HeaderValue, Response};
use serde::Deserialize;
use vigil_core::{Error, Result};

pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const MAX_PAGE_LIMIT: i64 = 200;

#[derive(Debug, Clone, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub status: Option<String>,
    pub severity: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

/// Clamps the limit into `[1, 200]` (default 50) and rejects negative
/// offsets.
pub fn resolve_page(limit: Option<i64>, offset: Option<i64>) -> Result<Page> {
    let offset = offset.unwrap_or(0);
    if offset < 0 {
        return Err(Error::validation("offset must be non-negative"));
    }
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    Ok(Page { limit, offset })
}

/// Stamps the `X-Pagination-Limit` / `X-Pagination-Offset` response headers.
pub fn set_pagination_headers<B>(response: &mut Response<B>, page: Page) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&page.limit.to_string()) {
        headers.insert(HeaderName::from_static("x-pagination-limit"), value);
    }
    if let Ok(value) = HeaderValue::from_str(&page.offset.to_string()) {
        headers.insert(HeaderName::from_static("x-pagination-offset"), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_page() {
        let page = resolve_page(None, None).unwrap();
        assert_eq!(page, Page { limit: 50, offset: 0 });
    }

    #[test]
    fn limit_clamps_to_bounds() {
        assert_eq!(resolve_page(Some(500), None).unwrap().limit, 200);
        assert_eq!(resolve_page(Some(0), None).unwrap().limit, 1);
        assert_eq!(resolve_page(Some(-3), None).unwrap().limit, 1);
        assert_eq!(resolve_page(Some(120), None).unwrap().limit, 120);
    }

    #[test]
    fn negative_offset_is_rejected() {
        let err = resolve_page(None, Some(-1)).unwrap_err();
        assert_eq!(err.http_status(), 400);
        assert_eq!(resolve_page(None, Some(30)).unwrap().offset, 30);
    }
}
