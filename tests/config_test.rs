//! Unit tests for config.rs module

use std::io::Write;
use txt_campaign::config::AppConfig;

#[test]
fn test_default_config_values() {
    let config = AppConfig::default();

    assert_eq!(config.database.url, "sqlite:data/campaigns.db");
    assert_eq!(config.database.max_connections, 10);
    assert_eq!(config.database.connection_timeout_secs, 30);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.file_path, None);
    assert_eq!(config.logging.format, "text");
}

#[test]
fn test_default_campaign_and_delivery_config() {
    let config = AppConfig::default();

    assert_eq!(config.ingest.default_file_name, "Manual Upload");
    assert_eq!(config.ingest.placeholder_scan_limit, 1000);
    assert_eq!(config.campaign.default_delay_seconds, 0);
    assert_eq!(config.campaign.removed_list_limit, 10);
    assert_eq!(config.delivery.mode, "applescript");
    assert_eq!(config.delivery.service, "SMS");
    assert!(!config.is_dry_run());
    assert_eq!(config.delivery_timeout().as_secs(), 30);
}

#[test]
fn test_validation_rejects_bad_values() {
    let mut config = AppConfig::default();
    config.logging.level = "verbose".to_string();
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.logging.format = "xml".to_string();
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.delivery.mode = "carrier_pigeon".to_string();
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.campaign.preview_sample_size = 0;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.delivery.mode = "dry_run".to_string();
    assert!(config.validate().is_ok());
    assert!(config.is_dry_run());
}

#[test]
fn test_load_from_file_overrides_defaults() {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("Failed to create temp file");
    writeln!(
        file,
        "delivery:\n  mode: dry_run\ncampaign:\n  preview_sample_size: 5\n"
    )
    .unwrap();

    let config = AppConfig::load_from(Some(file.path())).expect("Failed to load config");
    assert!(config.is_dry_run());
    assert_eq!(config.campaign.preview_sample_size, 5);
    // Untouched sections keep their defaults.
    assert_eq!(config.delivery.service, "SMS");
    assert_eq!(config.ingest.max_skipped_details, 10);
}

#[test]
fn test_load_from_invalid_file_fails_validation() {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("Failed to create temp file");
    writeln!(file, "database:\n  max_connections: 0\n").unwrap();

    assert!(AppConfig::load_from(Some(file.path())).is_err());
}

#[test]
fn test_config_renders_as_yaml() {
    let yaml = AppConfig::default().to_yaml().unwrap();
    assert!(yaml.contains("preview_sample_size: 3"));
    let parsed: AppConfig = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(parsed, AppConfig::default());
}
