//! Stack configuration.
//!
//! Configuration comes from an optional JSON file overlaid with a fixed set of
//! environment variables. The environment is read once, through an injectable lookup,
//! and the result is validated before any resource is declared or any request is sent.
//!
//! Environment variables:
//! - `SITESTACK_STACK` - Stack name (default: `dev`)
//! - `SITESTACK_WEBHOOK_URL` - Swag webhook endpoint
//! - `SWAG_NAME`, `SWAG_EMAIL`, `SWAG_ADDRESS`, `SWAG_SIZE` - Swag request fields;
//!   set all four or none

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::SwagProps;
use crate::stack::SiteSettings;

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "sitestack.json";

const SWAG_VARS: [&str; 4] = ["SWAG_NAME", "SWAG_EMAIL", "SWAG_ADDRESS", "SWAG_SIZE"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Missing required configuration value: {0}")]
    Missing(String),

    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StackConfig {
    /// Stack name, also used to pick the `Environment` tag.
    pub stack: String,
    /// Logical name of the site component; prefixes resource names.
    pub site_name: String,
    /// Directory whose files are uploaded.
    pub content_dir: PathBuf,
    #[serde(flatten)]
    pub site: SiteSettings,
    pub webhook_url: Option<String>,
    pub swag: Option<SwagProps>,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            stack: "dev".into(),
            site_name: "static-site".into(),
            content_dir: PathBuf::from("website"),
            site: SiteSettings::default(),
            webhook_url: None,
            swag: None,
        }
    }
}

impl StackConfig {
    /// Load from `path`, or from [`DEFAULT_CONFIG_FILE`] if it exists, or use defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay values from the environment. `lookup` is usually `std::env::var(..).ok()`.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(stack) = lookup("SITESTACK_STACK") {
            self.stack = stack;
        }
        if let Some(url) = lookup("SITESTACK_WEBHOOK_URL") {
            self.webhook_url = Some(url);
        }

        let values: Vec<Option<String>> = SWAG_VARS.iter().map(|v| lookup(v)).collect();
        if values.iter().any(Option::is_some) {
            let field = |i: usize| {
                values[i]
                    .clone()
                    .ok_or_else(|| ConfigError::Missing(SWAG_VARS[i].to_string()))
            };
            self.swag = Some(SwagProps {
                name: field(0)?,
                email: field(1)?,
                address: field(2)?,
                size: field(3)?,
            });
        }

        Ok(self)
    }

    /// Check every field a run depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stack.trim().is_empty() {
            return Err(ConfigError::Missing("stack".into()));
        }
        if self.site_name.trim().is_empty() {
            return Err(ConfigError::Missing("site_name".into()));
        }

        for o in &self.site.ordered_cache_behaviors {
            if o.path_pattern.is_empty() {
                return Err(ConfigError::invalid(
                    "ordered_cache_behaviors",
                    "path_pattern must not be empty",
                ));
            }
            if !o.behavior.ttls_are_ordered() {
                return Err(ConfigError::invalid(
                    "ordered_cache_behaviors",
                    format!("TTLs for '{}' must satisfy min <= default <= max", o.path_pattern),
                ));
            }
        }

        if let Some(logging) = &self.site.logging {
            if logging.bucket.trim().is_empty() {
                return Err(ConfigError::invalid("logging.bucket", "must not be empty"));
            }
        }

        if let Some(swag) = &self.swag {
            validate_swag(swag)?;
            let url = self
                .webhook_url
                .as_deref()
                .ok_or_else(|| ConfigError::Missing("webhook_url".into()))?;
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(ConfigError::invalid("webhook_url", "must be an http(s) URL"));
            }
        }

        Ok(())
    }
}

fn validate_swag(swag: &SwagProps) -> Result<(), ConfigError> {
    let fields = [
        ("swag.name", &swag.name),
        ("swag.email", &swag.email),
        ("swag.address", &swag.address),
        ("swag.size", &swag.size),
    ];
    for (field, value) in fields {
        if value.trim().is_empty() {
            return Err(ConfigError::Missing(field.to_string()));
        }
    }
    if !swag.email.contains('@') {
        return Err(ConfigError::invalid("swag.email", "must be an email address"));
    }
    Ok(())
}
