//! Page windows and page metadata.

use serde::{Deserialize, Serialize};

/// Maximum page size, whatever the caller asks for.
pub const HARD_CAP: u64 = 50;

/// Page size when the caller gives none.
pub const DEFAULT_LIMIT: u64 = 10;

/// Raw page parameters as they arrive from the request layer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl PageRequest {
    /// Request `page` of size `limit`.
    #[must_use]
    pub fn new(page: u64, limit: u64) -> Self {
        Self {
            page: Some(page.to_string()),
            limit: Some(limit.to_string()),
        }
    }

    /// Resolve against [`HARD_CAP`].
    #[must_use]
    pub fn window(&self) -> PageWindow {
        resolve(self.page.as_deref(), self.limit.as_deref(), HARD_CAP)
    }
}

/// A resolved page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u64,
    pub skip: u64,
    pub limit: u64,
}

fn parse_or(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(default)
}

/// Resolve page parameters. Unparseable input falls back to the defaults.
#[must_use]
pub fn resolve(page: Option<&str>, limit: Option<&str>, hard_cap: u64) -> PageWindow {
    let page = parse_or(page, 1).max(1) as u64;
    let limit = (parse_or(limit, DEFAULT_LIMIT as i64).max(1) as u64).min(hard_cap.max(1));
    PageWindow {
        page,
        skip: (page - 1).saturating_mul(limit),
        limit,
    }
}

/// Page metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub total_count: u64,
    pub total_pages: u64,
    pub page: u64,
    pub limit: u64,
    pub has_next: bool,
    pub has_prev: bool,
    pub next_page: Option<u64>,
    pub prev_page: Option<u64>,
}

impl PageInfo {
    /// Metadata for `window` over `total_count` items.
    #[must_use]
    pub fn new(window: PageWindow, total_count: u64) -> Self {
        let total_pages = total_count.div_ceil(window.limit);
        let has_next = window.page < total_pages;
        let has_prev = window.page > 1;
        Self {
            total_count,
            total_pages,
            page: window.page,
            limit: window.limit,
            has_next,
            has_prev,
            next_page: has_next.then(|| window.page + 1),
            prev_page: has_prev.then(|| window.page - 1),
        }
    }
}

/// One page of items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(flatten)]
    pub info: PageInfo,
}

impl<T> Page<T> {
    /// Assemble a page.
    #[must_use]
    pub fn new(items: Vec<T>, window: PageWindow, total_count: u64) -> Self {
        Self {
            items,
            info: PageInfo::new(window, total_count),
        }
    }

    /// Transform the items, keeping the metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            info: self.info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let w = resolve(None, None, HARD_CAP);
        assert_eq!(w, PageWindow { page: 1, skip: 0, limit: 10 });
    }

    #[test]
    fn test_limit_is_capped() {
        for requested in ["51", "100", "999999"] {
            assert_eq!(resolve(None, Some(requested), HARD_CAP).limit, 50);
        }
        assert_eq!(resolve(None, Some("50"), HARD_CAP).limit, 50);
    }

    #[test]
    fn test_page_floor_and_skip() {
        assert_eq!(resolve(Some("0"), None, HARD_CAP).page, 1);
        assert_eq!(resolve(Some("-3"), None, HARD_CAP).page, 1);

        let w = resolve(Some("4"), Some("20"), HARD_CAP);
        assert_eq!(w.skip, 60);
        assert_eq!(resolve(Some("3"), Some("0"), HARD_CAP).limit, 1);
    }

    #[test]
    fn test_garbage_falls_back() {
        let w = resolve(Some("abc"), Some("ten"), HARD_CAP);
        assert_eq!(w, PageWindow { page: 1, skip: 0, limit: 10 });
    }

    #[test]
    fn test_page_info() {
        let info = PageInfo::new(resolve(Some("2"), Some("10"), HARD_CAP), 25);
        assert_eq!(info.total_pages, 3);
        assert!(info.has_next);
        assert!(info.has_prev);
        assert_eq!(info.next_page, Some(3));
        assert_eq!(info.prev_page, Some(1));

        let last = PageInfo::new(resolve(Some("3"), Some("10"), HARD_CAP), 25);
        assert!(!last.has_next);
        assert_eq!(last.next_page, None);
    }

    #[test]
    fn test_empty_total_is_an_empty_page() {
        let page: Page<u8> = Page::new(Vec::new(), resolve(None, None, HARD_CAP), 0);
        assert_eq!(page.info.total_pages, 0);
        assert!(!page.info.has_next);
        assert!(!page.info.has_prev);
        assert!(page.items.is_empty());
    }
}
