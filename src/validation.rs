use std::path::Path;
use std::time::Duration;

use crate::error::{CampaignError, Result};

/// Longest pause accepted between two deliveries.
const MAX_DELAY_SECONDS: u64 = 3600;

/// Validation utilities for input sanitization and edge case handling
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Phone with spaces, dashes and parentheses removed
    #[must_use]
    pub fn normalize_phone(phone: &str) -> String {
        phone
            .chars()
            .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')'))
            .collect()
    }

    /// Phone forms to match when removing a contact: as typed, and normalized
    pub fn removal_phone_forms(phone: &str) -> Result<Vec<String>> {
        let raw = phone.trim();
        if raw.is_empty() {
            return Err(CampaignError::validation("Phone number is required"));
        }
        let normalized = Self::normalize_phone(raw);
        let mut forms = vec![raw.to_string()];
        if normalized != raw && !normalized.is_empty() {
            forms.push(normalized);
        }
        Ok(forms)
    }

    /// Validate a batch id given for deletion
    pub fn validate_deletable_batch_id(batch_id: &str) -> Result<&str> {
        let batch_id = batch_id.trim();
        if batch_id.is_empty() || batch_id == "default" || batch_id == "null" {
            return Err(CampaignError::validation(
                "Invalid batch ID. Cannot delete default or null batches.",
            ));
        }
        Ok(batch_id)
    }

    /// Batch selector for previews: `null` / `default` mean the legacy set
    pub fn validate_preview_batch_id(batch_id: &str) -> Result<Option<&str>> {
        match batch_id.trim() {
            "" | "all" => Err(CampaignError::validation("A valid batch ID is required for previews.")),
            "null" | "default" => Ok(None),
            id => Ok(Some(id)),
        }
    }

    /// Batch selector for placeholder listing: `null` means the legacy set
    pub fn validate_placeholder_batch_id(batch_id: &str) -> Result<Option<&str>> {
        match batch_id.trim() {
            "" | "default" => Err(CampaignError::validation(
                "A valid batch ID is required to load placeholders.",
            )),
            "null" => Ok(None),
            id => Ok(Some(id)),
        }
    }

    /// Validate campaign id
    pub fn validate_campaign_id(campaign_id: i64) -> Result<()> {
        if campaign_id <= 0 {
            return Err(CampaignError::validation("Invalid campaign ID"));
        }
        Ok(())
    }

    /// Validate a follow-up number (1-based)
    pub fn validate_followup_number(number: i64) -> Result<u32> {
        u32::try_from(number)
            .ok()
            .filter(|n| *n >= 1)
            .ok_or_else(|| CampaignError::validation(format!("Invalid follow-up number: {number}")))
    }

    /// Validate the pause between deliveries
    pub fn validate_delay_seconds(seconds: u64) -> Result<Duration> {
        if seconds > MAX_DELAY_SECONDS {
            return Err(CampaignError::validation(format!(
                "Delay too large (max {MAX_DELAY_SECONDS} seconds)"
            )));
        }
        Ok(Duration::from_secs(seconds))
    }

    /// Validate file path
    pub fn validate_file_path(path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        if path_str.trim().is_empty() {
            return Err(CampaignError::validation("File path cannot be empty"));
        }

        // Check path length
        if path_str.len() > 4096 {
            return Err(CampaignError::validation("File path too long (max 4096 characters)"));
        }

        Ok(())
    }

    /// Sanitize text input
    #[must_use]
    pub fn sanitize_text(text: &str) -> String {
        text.chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t' || *c == '\r')
            .collect::<String>()
            .trim()
            .to_string()
    }

    /// Validate database URL
    pub fn validate_database_url(url: &str) -> Result<()> {
        let url = url.trim();
        if url.is_empty() {
            return Err(CampaignError::validation("Database URL cannot be empty"));
        }

        if url.contains("://") && !url.starts_with("sqlite://") {
            return Err(CampaignError::validation("Only SQLite databases are supported"));
        }

        if url.len() > 1000 {
            return Err(CampaignError::validation("Database URL too long"));
        }

        Ok(())
    }
}
