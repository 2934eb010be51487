//! Retry with exponential backoff at the request boundary.
//!
//! [`RetryingApi`] wraps any [`SearchApi`] and re-issues a request when it
//! fails with a transient error (network, HTTP 429/5xx, malformed body).
//! Rejections are returned immediately. The delay before attempt `n` is
//! `base · 2^(n-1)` with the exponent capped at 5, so the default 1s base
//! waits 1s, 2s, 4s, 8s, 16s, 32s, 32s, ...

use async_trait::async_trait;
use geoharvest_core::api::{SearchApi, SearchPage, SearchRequest};
use geoharvest_core::Result;
use std::time::Duration;

pub struct RetryingApi<A> {
    inner: A,
    max_retries: u32,
    base: Duration,
}

impl<A: SearchApi> RetryingApi<A> {
    pub fn new(inner: A, max_retries: u32, base: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base,
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * (1u32 << (attempt.saturating_sub(1)).min(5))
}

#[async_trait]
impl<A: SearchApi> SearchApi for RetryingApi<A> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn search(&self, request: &SearchRequest<'_>) -> Result<SearchPage> {
        let mut attempt = 0;
        loop {
            match self.inner.search(request).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = backoff_delay(self.base, attempt);
                    log::warn!(
                        "{} {} page {}: {} (retry {}/{} in {:?})",
                        self.inner.name(),
                        request.window,
                        request.page,
                        e,
                        attempt,
                        self.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use geoharvest_core::models::{BoundingBox, DateWindow, ExtraFilters};
    use geoharvest_core::scripted::ScriptedApi;
    use geoharvest_core::HarvestError;

    fn request<'a>(bbox: &'a BoundingBox, filters: &'a ExtraFilters) -> SearchRequest<'a> {
        SearchRequest {
            bbox,
            window: DateWindow::new(
                NaiveDate::from_ymd_opt(2010, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2011, 1, 1).unwrap(),
            ),
            page: 1,
            page_size: 1,
            filters,
        }
    }

    #[test]
    fn test_backoff_delay_doubles_and_caps() {
        let base = Duration::from_millis(1000);
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 4), Duration::from_secs(8));
        assert_eq!(backoff_delay(base, 6), Duration::from_secs(32));
        assert_eq!(backoff_delay(base, 9), Duration::from_secs(32));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let scripted = ScriptedApi::with_counts(|_, _| 42).fail_requests(&[1, 2]);
        let api = RetryingApi::new(scripted, 5, Duration::from_millis(1));
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let filters = ExtraFilters::new();

        let page = api.search(&request(&bbox, &filters)).await.unwrap();
        assert_eq!(page.total, 42);
        assert_eq!(api.inner().calls().len(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let scripted = ScriptedApi::with_counts(|_, _| 42).fail_requests(&[1, 2, 3, 4]);
        let api = RetryingApi::new(scripted, 2, Duration::from_millis(1));
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let filters = ExtraFilters::new();

        let err = api.search(&request(&bbox, &filters)).await.unwrap_err();
        assert!(matches!(err, HarvestError::TransientQuery(_)));
        assert_eq!(api.inner().calls().len(), 3);
    }

    #[tokio::test]
    async fn test_rejections_are_not_retried() {
        let scripted = ScriptedApi::with_counts(|_, _| 42).reject_requests(&[1]);
        let api = RetryingApi::new(scripted, 5, Duration::from_millis(1));
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let filters = ExtraFilters::new();

        let err = api.search(&request(&bbox, &filters)).await.unwrap_err();
        assert!(matches!(err, HarvestError::QueryRejected(_)));
        assert_eq!(api.inner().calls().len(), 1);
    }
}
