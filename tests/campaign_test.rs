//! Tests for campaign validation, message generation and follow-up regeneration

use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use txt_campaign::campaign::{
    apply_campaign_update, generate_campaign_messages, reconcile_messages, regenerate_followups,
    validate_new_campaign, MessageWrite,
};
use txt_campaign::models::{
    Campaign, CampaignMessage, CampaignStatus, CampaignUpdate, Contact, MessageStatus, MessageType, NewCampaign,
};

fn contact(id: i64, first_name: &str) -> Contact {
    Contact {
        id,
        phone: format!("+1555000{id}"),
        first_name: Some(first_name.to_string()),
        company: None,
        city: None,
        use_ai: false,
        use_ai_text: None,
        custom_fields: BTreeMap::new(),
        upload_batch_id: Some("batch_1".to_string()),
        upload_file_name: Some("leads.csv".to_string()),
        batch_row_number: u32::try_from(id).ok(),
        responded: false,
        removed_at: None,
        created_at: NaiveDateTime::default(),
    }
}

fn campaign(status: CampaignStatus, followups: &[&str]) -> Campaign {
    Campaign {
        id: 7,
        name: "Spring".to_string(),
        message: "Hi {first_name}".to_string(),
        followup_messages: followups.iter().map(ToString::to_string).collect(),
        followup_count: u32::try_from(followups.len()).unwrap_or_default(),
        status,
        targeting: None,
        created_at: NaiveDateTime::default(),
    }
}

fn stored(id: i64, contact_id: i64, message_type: MessageType, status: MessageStatus, text: &str) -> CampaignMessage {
    CampaignMessage {
        id,
        campaign_id: 7,
        contact_id,
        message_type,
        status,
        message_text: text.to_string(),
        scheduled_time: None,
        sent_time: None,
    }
}

#[test]
fn test_new_campaign_requires_name_and_message() {
    let request = NewCampaign {
        name: "  ".to_string(),
        message: "Hi".to_string(),
        ..NewCampaign::default()
    };
    assert!(validate_new_campaign(request).is_err());
}

#[test]
fn test_new_campaign_count_defaults_to_templates() {
    let request = NewCampaign {
        name: "Spring".to_string(),
        message: "Hi".to_string(),
        followup_messages: vec!["One".to_string(), "Two".to_string()],
        ..NewCampaign::default()
    };
    let draft = validate_new_campaign(request).expect("valid campaign");
    assert_eq!(draft.followup_count, 2);
    assert!(draft.targeting.is_none());
}

#[test]
fn test_new_campaign_rejects_partial_targeting() {
    let request = NewCampaign {
        name: "Spring".to_string(),
        message: "Hi".to_string(),
        contact_batch_id: Some("batch_1".to_string()),
        range_start: Some(1),
        ..NewCampaign::default()
    };
    assert!(validate_new_campaign(request).is_err());

    let request = NewCampaign {
        name: "Spring".to_string(),
        message: "Hi".to_string(),
        contact_batch_id: Some("batch_1".to_string()),
        range_start: Some(4),
        range_end: Some(2),
        ..NewCampaign::default()
    };
    assert!(validate_new_campaign(request).is_err());
}

#[test]
fn test_generation_counts_and_fallback() {
    let campaign = campaign(CampaignStatus::Draft, &["Still there {first_name}?", ""]);
    let contacts = vec![contact(1, "Ann"), contact(2, "Bob"), contact(3, "Cy")];

    let generated = generate_campaign_messages(&campaign, &contacts);
    assert_eq!(generated.initial.len(), 3);
    assert_eq!(generated.followups.len(), 6);
    assert_eq!(generated.len(), 9);

    assert_eq!(generated.initial[1].message_text, "Hi Bob");
    let bob_followups: Vec<&str> = generated
        .followups
        .iter()
        .filter(|m| m.contact_id == 2)
        .map(|m| m.message_text.as_str())
        .collect();
    // The blank second slot falls back to the main template.
    assert_eq!(bob_followups, vec!["Still there Bob?", "Hi Bob"]);
}

#[test]
fn test_generation_for_no_contacts_is_empty() {
    let generated = generate_campaign_messages(&campaign(CampaignStatus::Draft, &["x"]), &[]);
    assert!(generated.is_empty());
    assert_eq!(generated.all().count(), 0);
}

#[test]
fn test_reconcile_never_touches_sent_messages() {
    let campaign = campaign(CampaignStatus::Draft, &[]);
    let contacts = vec![contact(1, "Ann"), contact(2, "Bob"), contact(3, "Cy")];
    let existing = vec![
        stored(10, 1, MessageType::Initial, MessageStatus::Sent, "Hi old"),
        stored(11, 2, MessageType::Initial, MessageStatus::Stored, "Hi old"),
    ];

    let writes = reconcile_messages(&existing, generate_campaign_messages(&campaign, &contacts).initial);
    assert_eq!(writes[0], MessageWrite::Keep { id: 10 });
    assert_eq!(
        writes[1],
        MessageWrite::UpdateText {
            id: 11,
            message_text: "Hi Bob".to_string()
        }
    );
    assert!(matches!(&writes[2], MessageWrite::Insert(plan) if plan.contact_id == 3));
}

#[test]
fn test_active_update_requires_followups_and_ignores_name() {
    let active = campaign(CampaignStatus::Active, &["Old"]);
    let missing = CampaignUpdate {
        name: Some("Renamed".to_string()),
        ..CampaignUpdate::default()
    };
    assert!(apply_campaign_update(&active, missing).is_err());

    let update = CampaignUpdate {
        name: Some("Renamed".to_string()),
        message: Some("New body".to_string()),
        followup_messages: Some(vec!["New {first_name}".to_string()]),
        followup_count: None,
    };
    let updated = apply_campaign_update(&active, update).expect("valid update");
    assert_eq!(updated.name, "Spring");
    assert_eq!(updated.message, "Hi {first_name}");
    assert_eq!(updated.followup_messages, vec!["New {first_name}".to_string()]);
}

#[test]
fn test_draft_update_requires_name_and_message() {
    let draft = campaign(CampaignStatus::Draft, &[]);
    let update = CampaignUpdate {
        name: Some("Renamed".to_string()),
        ..CampaignUpdate::default()
    };
    assert!(apply_campaign_update(&draft, update).is_err());
}

#[test]
fn test_regenerate_only_rewrites_stored_followups_in_count() {
    let mut updated = campaign(CampaignStatus::Active, &["Ping {first_name}", "Last call {first_name}"]);
    updated.followup_messages = vec!["Ping {first_name}".to_string(), "Final {first_name}".to_string()];
    let ann = contact(1, "Ann");
    let stored_rows = vec![
        (stored(1, 1, MessageType::Followup(1), MessageStatus::Stored, "Ping Ann"), ann.clone()),
        (stored(2, 1, MessageType::Followup(2), MessageStatus::Stored, "Last call Ann"), ann.clone()),
        (stored(3, 1, MessageType::Followup(2), MessageStatus::Sent, "Last call Ann"), ann.clone()),
        (stored(4, 1, MessageType::Followup(3), MessageStatus::Stored, "Extra"), ann),
    ];

    let rewrites = regenerate_followups(&updated, &stored_rows);
    assert_eq!(rewrites, vec![(2, "Final Ann".to_string())]);
}
