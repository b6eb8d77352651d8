//! Offset/limit pagination primitives shared by stores and the API layer.

use serde::{Deserialize, Serialize};

/// A pagination request (1-based page, bounded limit).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 200;

    /// Normalize raw query values into a safe pagination window.
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        let page = page.unwrap_or(1).max(1);
        let limit = limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT);
        Self { page, limit }
    }

    pub fn offset(&self) -> usize {
        ((self.page - 1) as usize) * (self.limit as usize)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of results plus totals for the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

impl<T> Page<T> {
    /// Slice an already-filtered, already-ordered collection into a page.
    pub fn slice(all: Vec<T>, pagination: Pagination) -> Self {
        let total = all.len() as u64;
        let items = all
            .into_iter()
            .skip(pagination.offset())
            .take(pagination.limit as usize)
            .collect();
        Self {
            items,
            page: pagination.page,
            limit: pagination.limit,
            total,
        }
    }

    pub fn total_pages(&self) -> u32 {
        if self.total == 0 {
            0
        } else {
            ((self.total + self.limit as u64 - 1) / self.limit as u64) as u32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_normalizes_out_of_range_values() {
        let p = Pagination::new(Some(0), Some(10_000));
        assert_eq!(p.page, 1);
        assert_eq!(p.limit, Pagination::MAX_LIMIT);
    }

    #[test]
    fn page_slice_returns_requested_window() {
        let all: Vec<u32> = (0..25).collect();
        let page = Page::slice(all, Pagination::new(Some(2), Some(10)));
        assert_eq!(page.items, (10..20).collect::<Vec<_>>());
        assert_eq!(page.total, 25);
        assert_eq!(page.total_pages(), 3);
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let page = Page::slice(vec![1, 2, 3], Pagination::new(Some(5), Some(10)));
        assert!(page.items.is_empty());
        assert_eq!(page.total, 3);
    }
}
