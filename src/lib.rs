//! # geoharvest
//!
//! Bulk retrieval of geotagged records from a paginated search API that
//! caps every query at a few thousand results.
//!
//! The bounding box is split into an `n x n` grid of cells. Each cell walks
//! its date range in windows that the controller in
//! [`geoharvest_core::controller`] grows and shrinks until the probed count
//! fits under the cap, then fetches every page. Cells run concurrently;
//! their results are merged, deduplicated, and written as a single CSV.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌────────────────┐   ┌──────────┐
//! │  Config +  │──▶│  Coordinator │──▶│ Cell (window   │──▶│  Flickr  │
//! │  CLI       │   │  JoinSet     │   │ controller)    │   │  + retry │
//! └────────────┘   └──────┬───────┘   └────────────────┘   └──────────┘
//!                         │ merge
//!                         ▼
//!                   ┌──────────┐
//!                   │ CSV/zip  │
//!                   └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`flickr`] | `flickr.photos.search` client |
//! | [`retry`] | Exponential backoff around transient failures |
//! | [`coordinator`] | Cell planning, concurrent harvest, run-level merge |
//! | [`export`] | CSV and zip output |
//! | [`plan`] | `cells` and `probe` commands |
//! | [`run_cmd`] | `run` command and run report |
//! | [`progress`] | Human and JSON progress on stderr |

pub mod config;
pub mod coordinator;
pub mod export;
pub mod flickr;
pub mod plan;
pub mod progress;
pub mod retry;
pub mod run_cmd;
