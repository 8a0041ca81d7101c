use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Parses and validates configuration text
///
/// The recency section is resolved here too, so a malformed `since` or an
/// out-of-range window fails the load rather than the first harvest.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;

    if config.forum.is_empty()
        && config.album.is_empty()
        && !config.fanclub.as_ref().map_or(false, |f| f.is_enabled())
    {
        tracing::warn!("Configuration names no harvest targets");
    }

    Ok(config)
}

/// Hex-encoded SHA-256 of configuration text, recorded with each run
pub fn hash_config(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Loads and validates a configuration file
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use pagewalk::config::load_config;
///
/// let config = load_config(Path::new("pagewalk.toml")).unwrap();
/// println!("Forum groups: {}", config.forum.len());
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    parse_config(&std::fs::read_to_string(path)?)
}

/// Hashes a configuration file without parsing it
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    Ok(hash_config(&std::fs::read_to_string(path)?))
}

/// Loads a configuration and the hash of the exact text that was parsed
///
/// The file is read once, so an edit between parsing and hashing cannot
/// record a hash for settings the run never used.
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, hash_config(&content)))
}
