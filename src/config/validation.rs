use crate::config::types::{
    AlbumEntry, Config, CrawlerConfig, FanclubConfig, ForumEntry, OutputConfig, RecencyConfig,
    UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Longest accepted `window-hours` (one hundred years)
pub const MAX_WINDOW_HOURS: u32 = 100 * 365 * 24;

/// Longest accepted `window-months`
pub const MAX_WINDOW_MONTHS: u32 = 100 * 12;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_recency_config(&config.recency)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_forums(&config.forum)?;
    validate_albums(&config.album)?;
    if let Some(fanclub) = &config.fanclub {
        validate_fanclub(fanclub)?;
    }
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_walks < 1 || config.max_concurrent_walks > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_walks must be between 1 and 100, got {}",
            config.max_concurrent_walks
        )));
    }

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates the recency window
fn validate_recency_config(config: &RecencyConfig) -> Result<(), ConfigError> {
    if config.keys_set() > 1 {
        return Err(ConfigError::Validation(
            "recency accepts only one of window-hours, window-months, since".to_string(),
        ));
    }

    if config.window_hours == Some(0) || config.window_months == Some(0) {
        return Err(ConfigError::Validation(
            "recency window must be greater than zero".to_string(),
        ));
    }

    if config.window_hours.map_or(false, |hours| hours > MAX_WINDOW_HOURS) {
        return Err(ConfigError::Validation(format!(
            "window-hours must be at most {}",
            MAX_WINDOW_HOURS
        )));
    }

    if config.window_months.map_or(false, |months| months > MAX_WINDOW_MONTHS) {
        return Err(ConfigError::Validation(format!(
            "window-months must be at most {}",
            MAX_WINDOW_MONTHS
        )));
    }

    // Surfaces malformed `since` values at load time
    config.cutoff()?;

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates forum group entries
fn validate_forums(forums: &[ForumEntry]) -> Result<(), ConfigError> {
    for entry in forums {
        if entry.group_id.is_empty()
            || !entry
                .group_id
                .chars()
                .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::Validation(format!(
                "Invalid forum group-id '{}'",
                entry.group_id
            )));
        }

        validate_http_url(&entry.base_url, "base-url")?;
    }

    Ok(())
}

/// Validates album owner entries
fn validate_albums(albums: &[AlbumEntry]) -> Result<(), ConfigError> {
    for entry in albums {
        validate_http_url(&entry.api_url, "api-url")?;

        if entry.page_size == 0 {
            return Err(ConfigError::Validation(format!(
                "Album page-size for owner {} must be >= 1",
                entry.owner_id
            )));
        }
    }

    Ok(())
}

/// Validates the fan-app account section
fn validate_fanclub(config: &FanclubConfig) -> Result<(), ConfigError> {
    validate_http_url(&config.api_base, "api-base")?;

    if config.token.as_deref() == Some("") {
        return Err(ConfigError::Validation(
            "fanclub token cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}

/// Requires an absolute http(s) URL
fn validate_http_url(value: &str, field: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            field, value
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    // Basic email format check: must contain @ and have text on both sides
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
