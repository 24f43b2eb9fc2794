//! Per-profile page cache and infinite-scroll pagination guard.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::row::ScannerRow;
use crate::scanner_api::{FetchError, ScannerPage};

/// Distance from the content's bottom edge that triggers the next page.
pub const SCROLL_PROXIMITY_PX: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollPosition {
    pub scroll_top: f64,
    pub client_height: f64,
    pub scroll_height: f64,
}

impl ScrollPosition {
    pub fn near_bottom(&self) -> bool {
        self.scroll_top + self.client_height >= self.scroll_height - SCROLL_PROXIMITY_PX
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageCache {
    pages: BTreeMap<u32, Vec<ScannerRow>>,
    total_rows: Option<u64>,
    in_flight: Option<u32>,
    error: Option<FetchError>,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// All cached rows, pages in index order, rows in first-seen order.
    pub fn accumulate(&self) -> Vec<ScannerRow> {
        self.pages.values().flatten().cloned().collect()
    }

    pub fn accumulated_len(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn total_rows(&self) -> Option<u64> {
        self.total_rows
    }

    /// True before the first page and while fewer rows than the first page's
    /// total have been accumulated.
    pub fn has_more(&self) -> bool {
        match self.total_rows {
            None => self.pages.is_empty(),
            Some(total) => (self.accumulated_len() as u64) < total,
        }
    }

    pub fn is_fetching(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.error.as_ref()
    }

    pub fn next_page_index(&self) -> u32 {
        self.pages.keys().next_back().map(|last| last + 1).unwrap_or(1)
    }

    /// Claims the next page for fetching. Returns `None` while a fetch is in
    /// flight, after a failure, or when no pages remain.
    pub fn begin_fetch(&mut self) -> Option<u32> {
        if self.in_flight.is_some() || self.error.is_some() || !self.has_more() {
            return None;
        }
        let page = self.next_page_index();
        self.in_flight = Some(page);
        Some(page)
    }

    /// Stores a fetched page. Re-storing an index replaces it.
    pub fn complete(&mut self, page: ScannerPage) {
        if self.in_flight == Some(page.page_index) {
            self.in_flight = None;
        }
        if page.page_index == 1 || self.total_rows.is_none() {
            self.total_rows = Some(page.total_rows);
        }
        self.pages.insert(page.page_index, page.pairs);
    }

    pub fn fail(&mut self, page_index: u32, error: FetchError) {
        if self.in_flight == Some(page_index) {
            self.in_flight = None;
        }
        self.error = Some(error);
    }

    /// Clears a pending fetch error; the next `begin_fetch` retries.
    pub fn clear_error(&mut self) -> bool {
        self.error.take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(index: u32, keys: &[&str], total: u64) -> ScannerPage {
        ScannerPage {
            page_index: index,
            pairs: keys.iter().map(|key| ScannerRow::with_pair(*key)).collect(),
            total_rows: total,
        }
    }

    fn keys(rows: &[ScannerRow]) -> Vec<&str> {
        rows.iter().map(|row| row.pair_address.as_str()).collect()
    }

    #[test]
    fn empty_cache_wants_first_page() {
        let mut cache = PageCache::new();
        assert!(cache.has_more());
        assert_eq!(cache.begin_fetch(), Some(1));
        assert_eq!(cache.begin_fetch(), None, "in-flight fetch blocks re-entry");
    }

    #[test]
    fn accumulates_in_index_order_regardless_of_arrival() {
        let mut cache = PageCache::new();
        cache.complete(page(2, &["C", "D"], 6));
        cache.complete(page(1, &["A", "B"], 6));

        assert_eq!(keys(&cache.accumulate()), vec!["A", "B", "C", "D"]);
        assert!(cache.has_more());
        assert_eq!(cache.next_page_index(), 3);
    }

    #[test]
    fn has_more_stops_at_first_page_total() {
        let mut cache = PageCache::new();
        assert_eq!(cache.begin_fetch(), Some(1));
        cache.complete(page(1, &["A", "B"], 3));
        assert_eq!(cache.begin_fetch(), Some(2));
        cache.complete(page(2, &["C"], 99));

        assert_eq!(cache.total_rows(), Some(3));
        assert!(!cache.has_more());
        assert_eq!(cache.begin_fetch(), None);
    }

    #[test]
    fn refetching_an_index_is_idempotent() {
        let mut cache = PageCache::new();
        cache.complete(page(1, &["A", "B"], 10));
        cache.complete(page(1, &["A", "B"], 10));
        assert_eq!(cache.accumulated_len(), 2);
    }

    #[test]
    fn failure_halts_pagination_until_cleared() {
        let mut cache = PageCache::new();
        let claimed = cache.begin_fetch().unwrap();
        cache.fail(
            claimed,
            FetchError::HttpRequest {
                url: "u".to_string(),
                message: "boom".to_string(),
            },
        );

        assert!(cache.error().is_some());
        assert_eq!(cache.begin_fetch(), None);
        assert!(cache.clear_error());
        assert_eq!(cache.begin_fetch(), Some(1));
    }

    #[test]
    fn proximity_threshold_is_100px() {
        let at_edge = ScrollPosition {
            scroll_top: 400.0,
            client_height: 500.0,
            scroll_height: 1000.0,
        };
        let above = ScrollPosition {
            scroll_top: 399.0,
            ..at_edge
        };

        assert!(at_edge.near_bottom());
        assert!(!above.near_bottom());
    }
}
