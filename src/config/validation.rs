use crate::config::types::{
    Config, CrawlerConfig, OutputConfig, RetryConfig, SelectorConfig, UserAgentConfig,
};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_retry_config(&config.retry)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_selector_config(&config.selectors)?;
    validate_output_config(&config.output)?;

    // Surfaces empty or duplicate labels
    config.partitions()?;

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' must use http or https",
            config.base_url
        )));
    }

    if let Some(partitions) = &config.partitions {
        if partitions.is_empty() {
            return Err(ConfigError::Validation(
                "partitions cannot be an empty list".to_string(),
            ));
        }
    }

    if config.page_load_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "page_load_timeout_ms must be >= 100ms, got {}ms",
            config.page_load_timeout_ms
        )));
    }

    if config.max_retries < 1 || config.max_retries > 20 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be between 1 and 20, got {}",
            config.max_retries
        )));
    }

    if config.max_pages_per_partition < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages_per_partition must be >= 1, got {}",
            config.max_pages_per_partition
        )));
    }

    if config.sessions < 1 || config.sessions > 16 {
        return Err(ConfigError::Validation(format!(
            "sessions must be between 1 and 16, got {}",
            config.sessions
        )));
    }

    if config.poll_interval_ms < 10 || config.poll_interval_ms > config.page_load_timeout_ms {
        return Err(ConfigError::Validation(format!(
            "poll_interval_ms must be between 10ms and page_load_timeout_ms, got {}ms",
            config.poll_interval_ms
        )));
    }

    Ok(())
}

/// Validates retry configuration
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if !config.multiplier.is_finite() || config.multiplier < 1.0 {
        return Err(ConfigError::Validation(format!(
            "retry multiplier must be >= 1.0, got {}",
            config.multiplier
        )));
    }

    if config.max_delay_ms < config.base_delay_ms {
        return Err(ConfigError::Validation(format!(
            "retry max_delay_ms ({}) must be >= base_delay_ms ({})",
            config.max_delay_ms, config.base_delay_ms
        )));
    }

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

/// Validates that every selector parses
fn validate_selector_config(config: &SelectorConfig) -> Result<(), ConfigError> {
    for (name, selector) in [
        ("listing", &config.listing),
        ("rows", &config.rows),
        ("next-button", &config.next_button),
    ] {
        Selector::parse(selector).map_err(|e| {
            ConfigError::InvalidSelector(format!("{} selector '{}': {:?}", name, selector, e))
        })?;
    }

    if config.disabled_class.trim().is_empty() || config.disabled_class.contains(' ') {
        return Err(ConfigError::InvalidSelector(format!(
            "disabled-class must be a single class name, got '{}'",
            config.disabled_class
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if matches!(&config.csv_path, Some(path) if path.is_empty()) {
        return Err(ConfigError::Validation(
            "csv_path cannot be empty when set".to_string(),
        ));
    }

    if matches!(&config.summary_path, Some(path) if path.is_empty()) {
        return Err(ConfigError::Validation(
            "summary_path cannot be empty when set".to_string(),
        ));
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

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    Ok(())
}
