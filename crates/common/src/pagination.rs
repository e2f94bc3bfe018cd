//! Page-number pagination for list endpoints

use serde::{Deserialize, Serialize};

/// `?page=&limit=` query parameters
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl PageParams {
    /// 1-based page number; 0 and missing both mean the first page
    pub fn page(&self) -> u64 {
        self.page.filter(|p| *p > 0).unwrap_or(1)
    }
}

/// One page of results with links to its neighbours
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>, count: u64, links: PageLinks) -> Self {
        Self {
            count,
            next: links.next,
            previous: links.previous,
            results,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLinks {
    pub next: Option<String>,
    pub previous: Option<String>,
}

/// Build `next`/`previous` links for `page` of a list at `base_url` + `path`.
///
/// A link back to page 1 carries only `limit`. No `previous` is offered when
/// the requested page is already past the end of the results.
pub fn page_links(base_url: &str, path: &str, page: u64, limit: u64, count: u64) -> PageLinks {
    let url = format!("{}{}", base_url.trim_end_matches('/'), path);
    let page = page.max(1);

    let next = (page.saturating_mul(limit) < count)
        .then(|| format!("{}?page={}&limit={}", url, page + 1, limit));

    let previous = if page == 1 || (page - 1).saturating_mul(limit) > count {
        None
    } else if page == 2 {
        Some(format!("{}?limit={}", url, limit))
    } else {
        Some(format!("{}?page={}&limit={}", url, page - 1, limit))
    };

    PageLinks { next, previous }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://localhost:8000";

    #[test]
    fn test_first_page() {
        let links = page_links(BASE, "/api/recipes", 1, 6, 20);
        assert_eq!(
            links.next.as_deref(),
            Some("http://localhost:8000/api/recipes?page=2&limit=6")
        );
        assert_eq!(links.previous, None);
    }

    #[test]
    fn test_second_page_points_back_without_page() {
        let links = page_links(BASE, "/api/recipes", 2, 6, 20);
        assert_eq!(
            links.previous.as_deref(),
            Some("http://localhost:8000/api/recipes?limit=6")
        );
        assert_eq!(
            links.next.as_deref(),
            Some("http://localhost:8000/api/recipes?page=3&limit=6")
        );
    }

    #[test]
    fn test_last_page_has_no_next() {
        let links = page_links(BASE, "/api/recipes", 4, 6, 20);
        assert_eq!(links.next, None);
        assert_eq!(
            links.previous.as_deref(),
            Some("http://localhost:8000/api/recipes?page=3&limit=6")
        );
    }

    #[test]
    fn test_exact_fit_has_no_next() {
        let links = page_links(BASE, "/api/tags", 2, 5, 10);
        assert_eq!(links.next, None);
    }

    #[test]
    fn test_past_the_end() {
        let links = page_links(BASE, "/api/recipes", 10, 6, 20);
        assert_eq!(links, PageLinks::default());
    }

    #[test]
    fn test_trailing_slash_in_base() {
        let links = page_links("http://example.com/", "/api/users/subscriptions", 1, 2, 3);
        assert_eq!(
            links.next.as_deref(),
            Some("http://example.com/api/users/subscriptions?page=2&limit=2")
        );
    }

    #[test]
    fn test_page_param_defaults() {
        assert_eq!(PageParams::default().page(), 1);
        assert_eq!(PageParams { page: Some(0), limit: None }.page(), 1);
        assert_eq!(PageParams { page: Some(3), limit: None }.page(), 3);
    }
}
