//! TOML configuration.
//!
//! ```toml
//! [run]
//! name = "example_run"
//! bbox = [-79.2201, 43.7838, -78.7961, 44.0474]
//! segments = 2
//! start_year = 2008
//! end_year = 2010
//!
//! [api]
//! api_key_env = "FLICKR_API_KEY"
//!
//! [output]
//! dir = "./data"
//! zipped = true
//!
//! [filters]
//! has_geo = 1
//! sort = "date-taken-asc"
//! extras = "url_c,date_upload,date_taken,owner_name,geo,tags,views"
//! ```
//!
//! `[filters]` is forwarded verbatim to every search request; non-string
//! values are stringified.

use anyhow::{bail, Context, Result};
use geoharvest_core::controller::WindowPolicy;
use geoharvest_core::models::{BoundingBox, DateRange, ExtraFilters};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub run: RunConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub filters: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    pub name: String,
    pub bbox: Vec<f64>,
    #[serde(default = "default_segments")]
    pub segments: u32,
    pub start_year: i32,
    pub end_year: i32,
    /// Concurrent cell tasks; defaults to the available parallelism.
    #[serde(default)]
    pub workers: Option<usize>,
}

fn default_segments() -> u32 {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
        }
    }
}

fn default_endpoint() -> String {
    "https://api.flickr.com/services/rest/".to_string()
}
fn default_api_key_env() -> String {
    "FLICKR_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    5
}
fn default_retry_base_ms() -> u64 {
    1000
}

/// Overrides for the window controller. Unset fields keep the defaults.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct WindowConfig {
    pub cap: Option<u64>,
    pub band_floor: Option<u64>,
    pub page_size: Option<u32>,
    pub grow_factor: Option<f64>,
    pub shrink_factor: Option<f64>,
    pub stop_on_empty_window: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub zipped: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            zipped: false,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Config {
    pub fn bbox(&self) -> Result<BoundingBox> {
        BoundingBox::from_slice(&self.run.bbox).context("run.bbox")
    }

    pub fn date_range(&self) -> Result<DateRange> {
        DateRange::from_years(self.run.start_year, self.run.end_year)
            .context("run.start_year / run.end_year")
    }

    pub fn policy(&self) -> WindowPolicy {
        let defaults = WindowPolicy::default();
        let w = &self.window;
        WindowPolicy {
            cap: w.cap.unwrap_or(defaults.cap),
            band_floor: w.band_floor.unwrap_or(defaults.band_floor),
            page_size: w.page_size.unwrap_or(defaults.page_size),
            grow_factor: w.grow_factor.unwrap_or(defaults.grow_factor),
            shrink_factor: w.shrink_factor.unwrap_or(defaults.shrink_factor),
            stop_on_empty_window: w
                .stop_on_empty_window
                .unwrap_or(defaults.stop_on_empty_window),
            ..defaults
        }
    }

    pub fn extra_filters(&self) -> ExtraFilters {
        let mut filters = ExtraFilters::new();
        for (key, value) in &self.filters {
            let text = match value {
                toml::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            filters.insert(key.clone(), text);
        }
        filters
    }

    pub fn workers(&self) -> usize {
        self.run.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.run.name.trim().is_empty() {
        bail!("run.name must not be empty");
    }
    if config.run.segments < 1 {
        bail!("run.segments must be >= 1");
    }
    config.bbox()?;
    config.date_range()?;
    if config.run.workers == Some(0) {
        bail!("run.workers must be >= 1");
    }
    config
        .policy()
        .validate()
        .with_context(|| "Invalid [window] settings")?;
    if config.api.endpoint.is_empty() {
        bail!("api.endpoint must not be empty");
    }

    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[run]
name = "example_run"
bbox = [-79.2201, 43.7838, -78.7961, 44.0474]
segments = 2
start_year = 2008
end_year = 2010

[filters]
has_geo = 1
sort = "date-taken-asc"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.run.segments, 2);
        assert_eq!(cfg.api.api_key_env, "FLICKR_API_KEY");
        assert_eq!(cfg.api.max_retries, 5);
        assert!(!cfg.output.zipped);
        assert_eq!(cfg.policy(), WindowPolicy::default());
        assert!(cfg.workers() >= 1);
    }

    #[test]
    fn test_filters_stringified() {
        let cfg = parse_config(MINIMAL).unwrap();
        let filters = cfg.extra_filters();
        assert_eq!(filters.get("has_geo"), Some("1"));
        assert_eq!(filters.get("sort"), Some("date-taken-asc"));
    }

    #[test]
    fn test_window_overrides() {
        let cfg = parse_config(&format!(
            "{}\n[window]\ncap = 2000\nband_floor = 1500\nstop_on_empty_window = false\n",
            MINIMAL
        ))
        .unwrap();
        let policy = cfg.policy();
        assert_eq!(policy.cap, 2000);
        assert_eq!(policy.band_floor, 1500);
        assert!(!policy.stop_on_empty_window);
        assert_eq!(policy.page_size, 250);
    }

    #[test]
    fn test_rejects_invalid_inputs() {
        let bad_bbox = MINIMAL.replace("-78.7961", "-80.0");
        assert!(parse_config(&bad_bbox).is_err());

        let zero_segments = MINIMAL.replace("segments = 2", "segments = 0");
        assert!(parse_config(&zero_segments).is_err());

        let backwards = MINIMAL.replace("end_year = 2010", "end_year = 2007");
        assert!(parse_config(&backwards).is_err());

        let bad_band = format!("{}\n[window]\nband_floor = 5000\n", MINIMAL);
        assert!(parse_config(&bad_band).is_err());
    }
}
