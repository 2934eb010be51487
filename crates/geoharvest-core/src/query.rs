//! Bounded query client: count probes and paginated fetches for one cell.

use crate::api::{SearchApi, SearchRequest};
use crate::error::Result;
use crate::models::{BoundingBox, DateWindow, ExtraFilters, Record};

/// Page size used for full fetches.
pub const PAGE_SIZE: u32 = 250;

/// Number of pages needed to read `total` records at `page_size` per page.
pub fn page_count(total: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size as u64) as u32
}

/// Issues probes and fetches for one cell's bounding box.
///
/// Every request goes through here, so [`requests`](Self::requests) is the
/// cell's cumulative request count.
pub struct BoundedQueryClient<'a> {
    api: &'a dyn SearchApi,
    bbox: BoundingBox,
    filters: &'a ExtraFilters,
    page_size: u32,
    requests: u64,
}

impl<'a> BoundedQueryClient<'a> {
    pub fn new(api: &'a dyn SearchApi, bbox: BoundingBox, filters: &'a ExtraFilters) -> Self {
        Self {
            api,
            bbox,
            filters,
            page_size: PAGE_SIZE,
            requests: 0,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Authoritative match count for `window` (one request, page size 1).
    pub async fn probe_count(&mut self, window: DateWindow) -> Result<u64> {
        let page = self.request(window, 1, 1).await?;
        Ok(page.total)
    }

    /// Read every page of `window`, sized from the probed `total`.
    ///
    /// Pages are requested sequentially and concatenated in page order. Any
    /// single failed page fails the whole fetch; the caller decides whether
    /// to retry the window.
    pub async fn fetch_all(&mut self, window: DateWindow, total: u64) -> Result<Vec<Record>> {
        let pages = page_count(total, self.page_size);
        let mut rows = Vec::with_capacity(total.min(u32::MAX as u64) as usize);

        for page in 1..=pages {
            let result = self.request(window, page, self.page_size).await?;
            log::debug!(
                "{} {} page {} of {}: {} rows",
                self.bbox,
                window,
                page,
                pages,
                result.rows.len()
            );
            if result.rows.len() > self.page_size as usize {
                log::warn!(
                    "{} returned {} rows for page size {}",
                    self.api.name(),
                    result.rows.len(),
                    self.page_size
                );
            }
            rows.extend(result.rows);
        }

        if rows.len() as u64 != total {
            log::debug!(
                "{} {}: probed {} records, fetched {}",
                self.bbox,
                window,
                total,
                rows.len()
            );
        }
        Ok(rows)
    }

    async fn request(
        &mut self,
        window: DateWindow,
        page: u32,
        page_size: u32,
    ) -> Result<crate::api::SearchPage> {
        self.requests += 1;
        let request = SearchRequest {
            bbox: &self.bbox,
            window,
            page,
            page_size,
            filters: self.filters,
        };
        self.api.search(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedApi;
    use chrono::NaiveDate;

    fn window() -> DateWindow {
        DateWindow::new(
            NaiveDate::from_ymd_opt(2010, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2010, 2, 1).unwrap(),
        )
    }

    fn bbox() -> BoundingBox {
        BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap()
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(0, 250), 0);
        assert_eq!(page_count(1, 250), 1);
        assert_eq!(page_count(250, 250), 1);
        assert_eq!(page_count(251, 250), 2);
        assert_eq!(page_count(3800, 250), 16);
        assert_eq!(page_count(4000, 250), 16);
    }

    #[tokio::test]
    async fn test_probe_uses_page_size_one() {
        let api = ScriptedApi::with_counts(|_, _| 777);
        let filters = ExtraFilters::new();
        let mut client = BoundedQueryClient::new(&api, bbox(), &filters);

        assert_eq!(client.probe_count(window()).await.unwrap(), 777);
        let calls = api.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].page, 1);
        assert_eq!(calls[0].page_size, 1);
        assert_eq!(client.requests(), 1);
    }

    #[tokio::test]
    async fn test_fetch_all_reads_every_page_in_order() {
        let api = ScriptedApi::with_counts(|_, _| 600);
        let filters = ExtraFilters::new();
        let mut client = BoundedQueryClient::new(&api, bbox(), &filters);

        let rows = client.fetch_all(window(), 600).await.unwrap();
        assert_eq!(rows.len(), 600);

        let pages: Vec<u32> = api.calls().iter().map(|c| c.page).collect();
        assert_eq!(pages, vec![1, 2, 3]);
        assert!(api.calls().iter().all(|c| c.page_size == PAGE_SIZE));
        assert_eq!(client.requests(), 3);
    }

    #[tokio::test]
    async fn test_fetch_zero_issues_no_requests() {
        let api = ScriptedApi::with_counts(|_, _| 0);
        let filters = ExtraFilters::new();
        let mut client = BoundedQueryClient::new(&api, bbox(), &filters);

        let rows = client.fetch_all(window(), 0).await.unwrap();
        assert!(rows.is_empty());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_page_failure_fails_fetch() {
        let api = ScriptedApi::with_counts(|_, _| 500).fail_requests(&[2]);
        let filters = ExtraFilters::new();
        let mut client = BoundedQueryClient::new(&api, bbox(), &filters);

        let err = client.fetch_all(window(), 500).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_filters_forwarded() {
        let api = ScriptedApi::with_counts(|_, _| 1);
        let mut filters = ExtraFilters::new();
        filters.insert("has_geo", "1");
        let mut client = BoundedQueryClient::new(&api, bbox(), &filters);

        client.probe_count(window()).await.unwrap();
        assert_eq!(api.calls()[0].filters.get("has_geo"), Some("1"));
    }
}
