use crate::recency::{parse_timestamp, Cutoff, TimestampFormat};
use crate::ConfigError;
use chrono::{Duration, Local};
use serde::Deserialize;

/// Main configuration structure for pagewalk
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub recency: RecencyConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub forum: Vec<ForumEntry>,
    #[serde(default)]
    pub album: Vec<AlbumEntry>,
    #[serde(default)]
    pub fanclub: Option<FanclubConfig>,
}

/// Walk and fan-out behavior
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of walks running at once
    #[serde(rename = "max-concurrent-walks", default = "default_max_concurrent_walks")]
    pub max_concurrent_walks: u32,

    /// Pause between consecutive page fetches of one walk (milliseconds)
    #[serde(rename = "page-delay-ms", default = "default_page_delay_ms")]
    pub page_delay_ms: u64,

    /// Safety cap on pages fetched per walk
    #[serde(rename = "max-pages", default)]
    pub max_pages: Option<u32>,

    /// End a walk after a page with fewer items than the page size
    #[serde(rename = "stop-on-short-page", default = "default_true")]
    pub stop_on_short_page: bool,

    /// End a walk at the first item outside the recency window
    #[serde(rename = "stop-on-stale-item", default = "default_true")]
    pub stop_on_stale_item: bool,

    /// Cancel every sibling walk as soon as one fails
    #[serde(rename = "all-or-nothing", default)]
    pub all_or_nothing: bool,
}

fn default_max_concurrent_walks() -> u32 {
    4
}

fn default_page_delay_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_walks: default_max_concurrent_walks(),
            page_delay_ms: default_page_delay_ms(),
            max_pages: None,
            stop_on_short_page: true,
            stop_on_stale_item: true,
            all_or_nothing: false,
        }
    }
}

/// Recency window; at most one key may be set, six months if none is
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecencyConfig {
    #[serde(rename = "window-hours")]
    pub window_hours: Option<u32>,

    #[serde(rename = "window-months")]
    pub window_months: Option<u32>,

    /// Absolute cutoff, `YYYY-MM-DD` or `YYYY-MM-DD HH:MM[:SS]`
    pub since: Option<String>,
}

impl RecencyConfig {
    /// Builds the cutoff this section describes
    pub fn cutoff(&self) -> Result<Cutoff, ConfigError> {
        if let Some(hours) = self.window_hours {
            return Ok(Cutoff::Window(Duration::hours(i64::from(hours))));
        }

        if let Some(months) = self.window_months {
            return Ok(Cutoff::Months(months));
        }

        if let Some(since) = &self.since {
            let (instant, format) = parse_timestamp(since, Local::now().naive_local())
                .map_err(|e| ConfigError::InvalidTimestamp(format!("since = '{}': {}", since, e)))?;
            if format == TimestampFormat::ShortForm {
                return Err(ConfigError::InvalidTimestamp(format!(
                    "since = '{}' must include a year",
                    since
                )));
            }
            return Ok(Cutoff::Since(instant));
        }

        Ok(Cutoff::default())
    }

    /// Number of recency keys that are set
    pub fn keys_set(&self) -> usize {
        [
            self.window_hours.is_some(),
            self.window_months.is_some(),
            self.since.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the harvester
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the harvester
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the harvester
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for harvester-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// A discussion group whose topics and replies are harvested
#[derive(Debug, Clone, Deserialize)]
pub struct ForumEntry {
    #[serde(rename = "group-id")]
    pub group_id: String,

    /// Site root, e.g. `https://forum.example.com`
    #[serde(rename = "base-url")]
    pub base_url: String,
}

/// A fan-app account whose albums are harvested
#[derive(Debug, Clone, Deserialize)]
pub struct AlbumEntry {
    #[serde(rename = "owner-id")]
    pub owner_id: i64,

    #[serde(rename = "owner-name", default)]
    pub owner_name: String,

    /// Album listing endpoint (JSON POST)
    #[serde(rename = "api-url")]
    pub api_url: String,

    #[serde(rename = "page-size", default = "default_album_page_size")]
    pub page_size: usize,

    /// Session token sent as the `token` header
    #[serde(default)]
    pub token: Option<String>,
}

fn default_album_page_size() -> usize {
    1000
}

/// Fan-app account used for the channel and broadcast listings
#[derive(Debug, Clone, Deserialize)]
pub struct FanclubConfig {
    /// API host root, e.g. `https://api.example.com`
    #[serde(rename = "api-base")]
    pub api_base: String,

    /// Session token sent as the `token` header
    #[serde(default)]
    pub token: Option<String>,

    /// Harvest the chat channels of every followed star
    #[serde(default)]
    pub channels: bool,

    /// Harvest the live and radio broadcast feed
    #[serde(default)]
    pub lives: bool,
}

impl FanclubConfig {
    /// True when at least one listing is switched on
    pub fn is_enabled(&self) -> bool {
        self.channels || self.lives
    }
}
