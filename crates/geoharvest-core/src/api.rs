//! The remote search capability consumed by the core.
//!
//! Contract assumed by the controller:
//!
//! - `total` is authoritative for the bbox + window at query time, but may
//!   drift between calls on a live dataset.
//! - `rows.len() <= page_size`.
//! - A page past the last one returns no rows rather than an error.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{BoundingBox, DateWindow, ExtraFilters, Record};

/// One search request: a page of the records in `bbox` taken inside `window`.
#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
    pub bbox: &'a BoundingBox,
    pub window: DateWindow,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
    pub filters: &'a ExtraFilters,
}

/// One page of results plus the API-reported total match count.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub total: u64,
    pub rows: Vec<Record>,
}

/// A paginated, capped search API.
///
/// Implementations must be `Send + Sync`; one instance is shared by every
/// cell task of a run.
#[async_trait]
pub trait SearchApi: Send + Sync {
    /// Short label used in logs (e.g. `"flickr"`).
    fn name(&self) -> &str;

    /// Run one search request.
    async fn search(&self, request: &SearchRequest<'_>) -> Result<SearchPage>;
}
