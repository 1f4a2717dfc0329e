//! Campaign validation and message generation.
//!
//! A campaign expands against its target contacts into one `initial` message
//! and `followup_count` follow-ups per contact. Generation is keyed by
//! `(contact, message_type)`, so running it again reconciles with what is
//! already stored instead of duplicating it.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{CampaignError, Result};
use crate::models::{
    Campaign, CampaignMessage, CampaignStatus, CampaignUpdate, Contact, MessageStatus, MessageType, NewCampaign,
    RowRange, Targeting,
};
use crate::placeholder::resolve_placeholders;

/// Validated campaign fields, ready to be stored as a draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignDraft {
    /// Campaign name
    pub name: String,
    /// Initial message template
    pub message: String,
    /// Follow-up templates, exactly `followup_count` long
    pub followup_messages: Vec<String>,
    /// Number of follow-ups per contact
    pub followup_count: u32,
    /// Optional batch/range restriction
    pub targeting: Option<Targeting>,
}

/// Treat empty, `"null"` and `"default"` batch ids as "no batch".
#[must_use]
pub fn normalize_batch_selector(batch_id: Option<&str>) -> Option<&str> {
    batch_id
        .map(str::trim)
        .filter(|id| !id.is_empty() && *id != "null" && *id != "default")
}

/// Check that targeting fields are either all present or all absent.
pub fn validate_targeting(
    batch_id: Option<&str>,
    range_start: Option<i64>,
    range_end: Option<i64>,
) -> Result<Option<Targeting>> {
    match (normalize_batch_selector(batch_id), range_start, range_end) {
        (Some(batch_id), Some(start), Some(end)) => Ok(Some(Targeting {
            batch_id: batch_id.to_string(),
            range: RowRange::new(start, end)?,
        })),
        (Some(_), _, _) => Err(CampaignError::validation(
            "Both start and end rows are required when selecting a batch.",
        )),
        (None, None, None) => Ok(None),
        (None, _, _) => Err(CampaignError::validation(
            "Row range can only be used when a batch is selected.",
        )),
    }
}

/// Pad follow-up templates to `count`; blank slots fall back to the main
/// message at generation time.
pub fn normalize_followups(mut templates: Vec<String>, count: u32) -> Result<Vec<String>> {
    let count = count as usize;
    if templates.len() > count {
        return Err(CampaignError::validation(format!(
            "{} follow-up templates given but follow-up count is {count}.",
            templates.len()
        )));
    }
    templates.resize(count, String::new());
    Ok(templates)
}

fn template_count(templates: &[String]) -> u32 {
    u32::try_from(templates.len()).unwrap_or(u32::MAX)
}

/// Validate a create request.
///
/// Whether the targeted range actually holds contacts is checked against the
/// store by the caller.
pub fn validate_new_campaign(request: NewCampaign) -> Result<CampaignDraft> {
    let name = request.name.trim();
    let message = request.message.trim();
    if name.is_empty() || message.is_empty() {
        return Err(CampaignError::validation("Campaign name and message are required."));
    }

    let targeting = validate_targeting(
        request.contact_batch_id.as_deref(),
        request.range_start,
        request.range_end,
    )?;
    let followup_count = request
        .followup_count
        .unwrap_or_else(|| template_count(&request.followup_messages));

    Ok(CampaignDraft {
        name: name.to_string(),
        message: message.to_string(),
        followup_messages: normalize_followups(request.followup_messages, followup_count)?,
        followup_count,
        targeting,
    })
}

/// Apply an edit to `campaign`, returning the updated campaign.
///
/// Drafts may change everything. Active campaigns only take new follow-up
/// templates and count; name and message edits are ignored.
pub fn apply_campaign_update(campaign: &Campaign, update: CampaignUpdate) -> Result<Campaign> {
    let mut updated = campaign.clone();
    match campaign.status {
        CampaignStatus::Draft => {
            let name = update.name.as_deref().map(str::trim).unwrap_or_default();
            let message = update.message.as_deref().map(str::trim).unwrap_or_default();
            if name.is_empty() || message.is_empty() {
                return Err(CampaignError::validation(
                    "Campaign name and message are required for draft campaigns.",
                ));
            }
            let templates = update
                .followup_messages
                .unwrap_or_else(|| campaign.followup_messages.clone());
            let count = update.followup_count.unwrap_or_else(|| template_count(&templates));
            updated.name = name.to_string();
            updated.message = message.to_string();
            updated.followup_messages = normalize_followups(templates, count)?;
            updated.followup_count = count;
        }
        CampaignStatus::Active => {
            let templates = update.followup_messages.ok_or_else(|| {
                CampaignError::validation("Followup messages are required for active campaigns.")
            })?;
            let count = update.followup_count.unwrap_or(campaign.followup_count);
            updated.followup_messages = normalize_followups(templates, count)?;
            updated.followup_count = count;
        }
    }
    Ok(updated)
}

/// A message the generator wants to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedMessage {
    /// Recipient
    pub contact_id: i64,
    /// `initial` or `followup_<n>`
    pub message_type: MessageType,
    /// Resolved text
    pub message_text: String,
}

/// Output of [`generate_campaign_messages`], in dispatch order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GeneratedMessages {
    /// One per contact, in contact order
    pub initial: Vec<PlannedMessage>,
    /// `followup_count` per contact, grouped by contact
    pub followups: Vec<PlannedMessage>,
}

impl GeneratedMessages {
    /// Every planned message, initials first.
    pub fn all(&self) -> impl Iterator<Item = &PlannedMessage> {
        self.initial.iter().chain(self.followups.iter())
    }

    /// Total number of planned messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.initial.len() + self.followups.len()
    }

    /// True if no contact was targeted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.initial.is_empty()
    }
}

/// Expand `campaign` against `contacts`.
///
/// Contacts are taken in the order given; callers pass them in selection
/// order so dispatch follows generation order.
#[must_use]
pub fn generate_campaign_messages(campaign: &Campaign, contacts: &[Contact]) -> GeneratedMessages {
    let mut generated = GeneratedMessages::default();
    for contact in contacts {
        generated.initial.push(PlannedMessage {
            contact_id: contact.id,
            message_type: MessageType::Initial,
            message_text: resolve_placeholders(&campaign.message, contact),
        });
        for number in 1..=campaign.followup_count {
            generated.followups.push(PlannedMessage {
                contact_id: contact.id,
                message_type: MessageType::Followup(number),
                message_text: resolve_placeholders(campaign.followup_template(number), contact),
            });
        }
    }
    generated
}

/// Storage action for one planned message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageWrite {
    /// Nothing stored yet for this `(contact, message_type)`
    Insert(PlannedMessage),
    /// Stored message whose text changed
    UpdateText {
        /// Existing message id
        id: i64,
        /// New resolved text
        message_text: String,
    },
    /// Already up to date, or no longer `stored`
    Keep {
        /// Existing message id
        id: i64,
    },
}

/// Reconcile planned messages with the campaign's stored ones.
///
/// Only `stored` messages are ever rewritten; `sent` and `failed` rows are kept
/// as they are.
#[must_use]
pub fn reconcile_messages(existing: &[CampaignMessage], planned: Vec<PlannedMessage>) -> Vec<MessageWrite> {
    let by_key: HashMap<(i64, MessageType), &CampaignMessage> = existing
        .iter()
        .map(|message| ((message.contact_id, message.message_type), message))
        .collect();

    planned
        .into_iter()
        .map(|plan| match by_key.get(&(plan.contact_id, plan.message_type)) {
            None => MessageWrite::Insert(plan),
            Some(current) if current.status == MessageStatus::Stored && current.message_text != plan.message_text => {
                MessageWrite::UpdateText {
                    id: current.id,
                    message_text: plan.message_text,
                }
            }
            Some(current) => MessageWrite::Keep { id: current.id },
        })
        .collect()
}

/// New texts for stored follow-ups after the templates of `campaign` changed.
///
/// Returns `(message id, text)` for every `stored` follow-up within the
/// campaign's follow-up count whose resolved text differs from what is stored.
#[must_use]
pub fn regenerate_followups(campaign: &Campaign, stored: &[(CampaignMessage, Contact)]) -> Vec<(i64, String)> {
    stored
        .iter()
        .filter(|(message, _)| message.status == MessageStatus::Stored)
        .filter_map(|(message, contact)| {
            let number = message.message_type.followup_number()?;
            if number > campaign.followup_count {
                return None;
            }
            let text = resolve_placeholders(campaign.followup_template(number), contact);
            (text != message.message_text).then_some((message.id, text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_selector_placeholders_mean_no_batch() {
        assert_eq!(normalize_batch_selector(Some("")), None);
        assert_eq!(normalize_batch_selector(Some("null")), None);
        assert_eq!(normalize_batch_selector(Some("default")), None);
        assert_eq!(normalize_batch_selector(Some(" batch_1 ")), Some("batch_1"));
    }

    #[test]
    fn test_targeting_must_be_all_or_nothing() {
        assert!(validate_targeting(None, None, None).unwrap().is_none());
        assert!(validate_targeting(Some("b"), Some(1), None).is_err());
        assert!(validate_targeting(None, Some(1), Some(3)).is_err());
        assert!(validate_targeting(Some("b"), Some(5), Some(2)).is_err());
        let targeting = validate_targeting(Some("b"), Some(2), Some(5)).unwrap().unwrap();
        assert_eq!(targeting.range.span(), 4);
    }

    #[test]
    fn test_followups_are_padded_to_count() {
        let padded = normalize_followups(vec!["a".to_string()], 3).unwrap();
        assert_eq!(padded, vec!["a".to_string(), String::new(), String::new()]);
        assert!(normalize_followups(vec!["a".to_string(), "b".to_string()], 1).is_err());
    }
}
