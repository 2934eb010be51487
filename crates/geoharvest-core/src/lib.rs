//! # geoharvest core
//!
//! Runtime-agnostic logic for geoharvest: the data model, the spatial grid
//! partitioner, the bounded query client, the adaptive date-window
//! controller, and the cell-level post-processing.
//!
//! This crate contains no tokio, HTTP, or filesystem code. The remote search
//! API is reached only through the [`api::SearchApi`] trait, so the whole
//! pipeline can be driven by [`scripted::ScriptedApi`] in tests.
//!
//! ```text
//! partition ──▶ cell::run_cell ──▶ controller::WindowController ──▶ query::BoundedQueryClient
//!                   │                                                   │
//!                   ▼                                                   ▼
//!             merge + derive                                     api::SearchApi
//! ```

pub mod api;
pub mod cell;
pub mod controller;
pub mod derive;
pub mod error;
pub mod merge;
pub mod models;
pub mod partition;
pub mod progress;
pub mod query;
pub mod scripted;

pub use error::{HarvestError, Result};
