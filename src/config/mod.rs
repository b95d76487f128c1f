//! Configuration module for Listing-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section is optional; missing keys fall back to the built-in defaults.
//!
//! # Example
//!
//! ```no_run
//! use listing_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Page size: {}", config.filters.page_size);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    seconds, ApiConfig, Config, FanoutConfig, FilterConfig, OutputConfig, ScrapeConfig, MAX_SECONDS,
};

// Re-export parser functions
pub use parser::{load_config, load_or_default};
pub use validation::{validate, validate_page_range};
