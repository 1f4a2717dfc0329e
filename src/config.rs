use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ingest::MAX_SKIPPED_DETAILS;

/// Application configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub ingest: IngestConfig,
    pub campaign: CampaignConfig,
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
    pub format: String, // "json" or "text"
}

/// CSV upload settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Skipped rows reported back in detail
    pub max_skipped_details: usize,
    /// File name used when an upload has none
    pub default_file_name: String,
    /// Contacts scanned when listing a batch's placeholders
    pub placeholder_scan_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignConfig {
    pub preview_sample_size: usize,
    pub default_delay_seconds: u64,
    pub removed_list_limit: usize,
}

/// How messages leave the machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// "applescript" or "dry_run"
    pub mode: String,
    /// Messages.app service type, normally "SMS"
    pub service: String,
    pub osascript_path: String,
    pub timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite:data/campaigns.db".to_string(),
                max_connections: 10,
                connection_timeout_secs: 30,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
            ingest: IngestConfig {
                max_skipped_details: MAX_SKIPPED_DETAILS,
                default_file_name: "Manual Upload".to_string(),
                placeholder_scan_limit: 1000,
            },
            campaign: CampaignConfig {
                preview_sample_size: 3,
                default_delay_seconds: 0,
                removed_list_limit: 10,
            },
            delivery: DeliveryConfig {
                mode: "applescript".to_string(),
                service: "SMS".to_string(),
                osascript_path: "/usr/bin/osascript".to_string(),
                timeout_secs: 30,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like [`AppConfig::load`], with an extra file that overrides the
    /// default locations.
    pub fn load_from(extra_file: Option<&Path>) -> Result<Self> {
        let defaults = Config::try_from(&Self::default()).context("Failed to encode default configuration")?;

        let mut builder = Config::builder()
            // Start with default values
            .add_source(defaults)
            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("config").required(false));
        if let Some(path) = extra_file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            // Add environment variables with prefix, e.g. TXT_CAMPAIGN_DATABASE__URL
            .add_source(
                Environment::with_prefix("TXT_CAMPAIGN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?;

        let app_config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate database config
        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("max_connections must be greater than 0"));
        }
        if self.database.connection_timeout_secs == 0 {
            return Err(anyhow::anyhow!("connection_timeout_secs must be greater than 0"));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        // Validate ingest config
        if self.ingest.placeholder_scan_limit == 0 {
            return Err(anyhow::anyhow!("placeholder_scan_limit must be greater than 0"));
        }
        if self.ingest.default_file_name.trim().is_empty() {
            return Err(anyhow::anyhow!("default_file_name cannot be empty"));
        }

        // Validate campaign config
        if self.campaign.preview_sample_size == 0 {
            return Err(anyhow::anyhow!("preview_sample_size must be greater than 0"));
        }
        if self.campaign.removed_list_limit == 0 {
            return Err(anyhow::anyhow!("removed_list_limit must be greater than 0"));
        }

        // Validate delivery config
        let valid_modes = ["applescript", "dry_run"];
        if !valid_modes.contains(&self.delivery.mode.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid delivery mode: {}. Must be one of: {:?}",
                self.delivery.mode,
                valid_modes
            ));
        }
        if self.delivery.service.trim().is_empty() {
            return Err(anyhow::anyhow!("delivery service cannot be empty"));
        }
        if self.delivery.timeout_secs == 0 {
            return Err(anyhow::anyhow!("delivery timeout_secs must be greater than 0"));
        }

        Ok(())
    }

    /// Get database URL from environment or config
    pub fn get_database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.database.url.clone())
    }

    /// Get log level from environment or config
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.logging.level.clone())
    }

    /// Pool checkout timeout.
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.database.connection_timeout_secs)
    }

    /// Per-message delivery timeout.
    #[must_use]
    pub const fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery.timeout_secs)
    }

    /// True when messages are only logged.
    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.delivery.mode == "dry_run"
    }

    /// Render the effective configuration as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to render configuration as YAML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.database.url, "sqlite:data/campaigns.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.ingest.max_skipped_details, 10);
        assert_eq!(config.campaign.preview_sample_size, 3);
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AppConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }
}
