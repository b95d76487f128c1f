use crate::config::types::{
    ApiConfig, Config, FanoutConfig, FilterConfig, OutputConfig, ScrapeConfig, MAX_SECONDS,
};
use crate::{ConfigError, ConfigResult};
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_api_config(&config.api)?;
    validate_filter_config(&config.filters)?;
    validate_scrape_config(&config.scrape)?;
    validate_output_config(&config.output)?;
    validate_fanout_config(&config.fanout)?;
    Ok(())
}

/// Validates endpoints and request identity
fn validate_api_config(config: &ApiConfig) -> ConfigResult<()> {
    Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;
    Url::parse(&config.api_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid api-url: {}", e)))?;

    if config.token_cookie.is_empty() {
        return Err(ConfigError::Validation(
            "token-cookie cannot be empty".to_string(),
        ));
    }

    if config.user_agents.is_empty() {
        return Err(ConfigError::Validation(
            "user-agents must contain at least one entry".to_string(),
        ));
    }

    Ok(())
}

fn validate_filter_config(config: &FilterConfig) -> ConfigResult<()> {
    if config.page_size == 0 {
        return Err(ConfigError::Validation(
            "page-size must be >= 1, got 0".to_string(),
        ));
    }
    Ok(())
}

/// Checks that the run's start page doesn't lie past its end page
///
/// `end_page` is the explicit end page, if one was given; otherwise the
/// configured `default-end-page` is the bound.
pub fn validate_page_range(config: &Config, end_page: Option<u32>) -> ConfigResult<()> {
    let start_page = config.scrape.start_page;
    match end_page {
        Some(end_page) if end_page < start_page => Err(ConfigError::Validation(format!(
            "end-page ({}) must not precede start-page ({})",
            end_page, start_page
        ))),
        None if config.scrape.default_end_page < start_page => {
            Err(ConfigError::Validation(format!(
                "default-end-page ({}) must not precede start-page ({}); pass an end page",
                config.scrape.default_end_page, start_page
            )))
        }
        _ => Ok(()),
    }
}

/// Validates paging, retry and timing settings
fn validate_scrape_config(config: &ScrapeConfig) -> ConfigResult<()> {
    if config.start_page == 0 {
        return Err(ConfigError::Validation(
            "start-page must be >= 1 (pages are 1-based)".to_string(),
        ));
    }

    if config.batch_size == 0 {
        return Err(ConfigError::Validation(
            "batch-size must be >= 1, got 0".to_string(),
        ));
    }

    if config.checkpoint_interval == 0 {
        return Err(ConfigError::Validation(
            "checkpoint-interval must be >= 1, got 0".to_string(),
        ));
    }

    if config.max_attempts == 0 || config.retry_max_attempts == 0 {
        return Err(ConfigError::Validation(format!(
            "max-attempts and retry-max-attempts must be >= 1, got {} and {}",
            config.max_attempts, config.retry_max_attempts
        )));
    }

    validate_delay_pair("delay", config.min_delay, config.max_delay)?;
    validate_delay_pair("retry-delay", config.retry_min_delay, config.retry_max_delay)?;
    validate_delay_pair(
        "server-error-delay",
        config.server_error_min_delay,
        config.server_error_max_delay,
    )?;
    validate_seconds("rate-limit-backoff", config.rate_limit_backoff)?;
    validate_seconds("connect-timeout", config.connect_timeout)?;
    validate_seconds("read-timeout", config.read_timeout)?;

    if config.connect_timeout == 0.0 || config.read_timeout == 0.0 {
        return Err(ConfigError::Validation(
            "connect-timeout and read-timeout must be positive".to_string(),
        ));
    }

    if config.pool_max_idle == 0 {
        return Err(ConfigError::Validation(
            "pool-max-idle must be >= 1, got 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> ConfigResult<()> {
    for (name, value) in [
        ("checkpoint-file", &config.checkpoint_file),
        ("data-file", &config.data_file),
        ("failed-pages-file", &config.failed_pages_file),
        ("processed-file", &config.processed_file),
    ] {
        if value.is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    if config.directory.as_os_str().is_empty() || config.cache_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "directory and cache-dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_fanout_config(config: &FanoutConfig) -> ConfigResult<()> {
    if config.workers == 0 {
        return Err(ConfigError::Validation(
            "workers must be >= 1, got 0".to_string(),
        ));
    }

    if !config.rate_limit.is_finite() || config.rate_limit < 0.0 {
        return Err(ConfigError::Validation(format!(
            "rate-limit must be a non-negative number, got {}",
            config.rate_limit
        )));
    }

    // 0 disables pacing; anything else must allow at least one request per MAX_SECONDS
    if config.rate_limit > 0.0 && config.rate_limit < 1.0 / MAX_SECONDS {
        return Err(ConfigError::Validation(format!(
            "rate-limit must be 0 or at least {} req/sec, got {}",
            1.0 / MAX_SECONDS,
            config.rate_limit
        )));
    }

    if config.worker_batch_size == 0 {
        return Err(ConfigError::Validation(
            "worker-batch-size must be >= 1, got 0".to_string(),
        ));
    }

    Ok(())
}

/// A delay range must be made of two non-negative seconds values with min <= max
fn validate_delay_pair(name: &str, min: f64, max: f64) -> ConfigResult<()> {
    validate_seconds(&format!("min-{}", name), min)?;
    validate_seconds(&format!("max-{}", name), max)?;

    if min > max {
        return Err(ConfigError::Validation(format!(
            "min-{name} ({min}s) must not exceed max-{name} ({max}s)"
        )));
    }

    Ok(())
}

fn validate_seconds(name: &str, value: f64) -> ConfigResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Validation(format!(
            "{} must be a non-negative number of seconds, got {}",
            name, value
        )));
    }

    if value > MAX_SECONDS {
        return Err(ConfigError::Validation(format!(
            "{} must not exceed {} seconds, got {}",
            name, MAX_SECONDS, value
        )));
    }
    Ok(())
}
