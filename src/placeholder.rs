//! `{key}` placeholder resolution against contact records.
//!
//! Standard fields are substituted first, custom fields second, so a custom
//! column named like a standard field never wins. Tokens without a value are
//! left in the text untouched.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CampaignError, Result};
use crate::models::Contact;

/// Standard placeholder keys, in resolution order.
pub const STANDARD_PLACEHOLDERS: &[&str] = &["phone", "first_name", "company", "city", "use_ai"];

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Value `{use_ai}` resolves to: the override text, else `"true"` when the
/// flag is set, else nothing.
#[must_use]
pub fn use_ai_value(contact: &Contact) -> Option<&str> {
    non_blank(contact.use_ai_text.as_deref()).or_else(|| contact.use_ai.then_some("true"))
}

/// Value of a standard placeholder for `contact`, if it has one.
#[must_use]
pub fn standard_value<'a>(contact: &'a Contact, key: &str) -> Option<&'a str> {
    match key {
        "phone" => non_blank(Some(contact.phone.as_str())),
        "first_name" => non_blank(contact.first_name.as_deref()),
        "company" => non_blank(contact.company.as_deref()),
        "city" => non_blank(contact.city.as_deref()),
        "use_ai" => use_ai_value(contact),
        _ => None,
    }
}

/// Substitute every known `{key}` token of `template` with the contact's data.
///
/// Matching is literal and case-sensitive; braces or regex metacharacters in a
/// custom header need no escaping.
#[must_use]
pub fn resolve_placeholders(template: &str, contact: &Contact) -> String {
    let mut text = template.to_string();

    for key in STANDARD_PLACEHOLDERS {
        if let Some(value) = standard_value(contact, key) {
            text = text.replace(&format!("{{{key}}}"), value);
        }
    }

    for (key, value) in &contact.custom_fields {
        let token = format!("{{{key}}}");
        if text.contains(&token) {
            text = text.replace(&token, value);
        }
    }

    text
}

/// Finds `{key}` tokens in templates.
#[derive(Debug, Clone)]
pub struct PlaceholderScanner {
    pattern: Regex,
}

impl PlaceholderScanner {
    /// Compile the token pattern.
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(r"\{([^{}]+)\}")
            .map_err(|e| CampaignError::Other(format!("Failed to compile placeholder regex: {e}")))?;
        Ok(Self { pattern })
    }

    /// Distinct keys referenced by `template`, in first-seen order.
    #[must_use]
    pub fn keys<'t>(&self, template: &'t str) -> Vec<&'t str> {
        let mut keys: Vec<&str> = Vec::new();
        for capture in self.pattern.captures_iter(template) {
            if let Some(key) = capture.get(1).map(|m| m.as_str()) {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    /// Keys of `template` that would stay unresolved for `contact`.
    #[must_use]
    pub fn unresolved<'t>(&self, template: &'t str, contact: &Contact) -> Vec<&'t str> {
        let resolved = resolve_placeholders(template, contact);
        self.keys(template)
            .into_iter()
            .filter(|key| resolved.contains(&format!("{{{key}}}")))
            .collect()
    }
}

/// A custom column offered as a placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderColumn {
    /// Header text as first seen; the token is `{key}`
    pub key: String,
    /// Display label
    pub label: String,
    /// First non-empty value seen for this column
    pub sample_value: String,
}

/// Placeholders available for a set of contacts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderCatalog {
    /// Custom columns, sorted case-insensitively
    pub placeholders: Vec<PlaceholderColumn>,
    /// First non-empty sample of each standard field
    pub normalized_samples: BTreeMap<String, String>,
}

/// Build the placeholder catalog of `contacts` (already ordered by row).
///
/// Custom keys are deduplicated case-insensitively; the first casing wins and
/// a missing sample is filled from later rows.
#[must_use]
pub fn catalog_placeholders(contacts: &[Contact]) -> PlaceholderCatalog {
    let mut columns: BTreeMap<String, PlaceholderColumn> = BTreeMap::new();
    let mut samples: BTreeMap<String, String> = BTreeMap::new();

    let mut sample = |name: &str, value: Option<&str>| {
        if let Some(value) = non_blank(value) {
            samples.entry(name.to_string()).or_insert_with(|| value.to_string());
        }
    };

    for contact in contacts {
        sample("phone", Some(&contact.phone));
        sample("first_name", contact.first_name.as_deref());
        sample("company", contact.company.as_deref());
        sample("city", contact.city.as_deref());
        match non_blank(contact.use_ai_text.as_deref()) {
            Some(text) => sample("use_ai_text", Some(text)),
            None => sample("use_ai", Some(if contact.use_ai { "true" } else { "false" })),
        }

        for (key, value) in &contact.custom_fields {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            let column = columns.entry(key.to_lowercase()).or_insert_with(|| PlaceholderColumn {
                key: key.to_string(),
                label: key.to_string(),
                sample_value: String::new(),
            });
            if column.sample_value.is_empty() && !value.is_empty() {
                column.sample_value.clone_from(value);
            }
        }
    }

    PlaceholderCatalog {
        // keyed by the lower-cased header, so already in case-insensitive order
        placeholders: columns.into_values().collect(),
        normalized_samples: samples,
    }
}
