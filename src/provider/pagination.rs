// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

/// Default items per page
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Page window over a result set. Pages are zero-based.
///
/// Once the item count is known, a page past the end is clamped to the
/// last page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: usize,
    page_size: usize,
    item_count: Option<u64>,
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl Pagination {
    pub fn new(page_size: usize) -> Self {
        Self { page: 0, page_size, item_count: None }
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn with_item_count(mut self, item_count: u64) -> Self {
        self.item_count = Some(item_count);
        self
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[must_use]
    pub fn item_count(&self) -> Option<u64> {
        self.item_count
    }

    /// Number of pages, when the item count is known.
    #[must_use]
    pub fn page_count(&self) -> Option<usize> {
        let count = self.item_count? as usize;
        if self.page_size == 0 {
            return Some(usize::from(count > 0));
        }
        Some(count.div_ceil(self.page_size))
    }

    /// Requested page, clamped to the last page.
    #[must_use]
    pub fn current_page(&self) -> usize {
        match self.page_count() {
            Some(pages) => self.page.min(pages.saturating_sub(1)),
            None => self.page,
        }
    }

    #[must_use]
    pub fn offset(&self) -> usize {
        self.current_page() * self.page_size
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.page_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_and_limit() {
        let pagination = Pagination::new(10).page(2);
        assert_eq!(pagination.offset(), 20);
        assert_eq!(pagination.limit(), 10);
        assert_eq!(pagination.page_count(), None);
    }

    #[test]
    fn test_page_clamped_to_item_count() {
        let pagination = Pagination::new(10).page(9).with_item_count(35);
        assert_eq!(pagination.page_count(), Some(4));
        assert_eq!(pagination.current_page(), 3);
        assert_eq!(pagination.offset(), 30);
    }

    #[test]
    fn test_empty_result_first_page() {
        let pagination = Pagination::new(10).page(3).with_item_count(0);
        assert_eq!(pagination.page_count(), Some(0));
        assert_eq!(pagination.offset(), 0);
    }

    #[test]
    fn test_default_page_size() {
        assert_eq!(Pagination::default().page_size(), DEFAULT_PAGE_SIZE);
    }
}
