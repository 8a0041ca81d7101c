//! Configuration module for pagewalk
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use pagewalk::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("pagewalk.toml")).unwrap();
//! println!("Walks at once: {}", config.crawler.max_concurrent_walks);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AlbumEntry, Config, CrawlerConfig, FanclubConfig, ForumEntry, OutputConfig, RecencyConfig,
    UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, hash_config, load_config, load_config_with_hash, parse_config};
