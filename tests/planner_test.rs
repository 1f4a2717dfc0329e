//! Tests for batch summaries and range previews

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use txt_campaign::models::{Contact, FilterType, Operator, RowRange};
use txt_campaign::planner::{assemble_preview, plan_preview, summarize_batches, BatchRow, ContactSelection};

fn at(minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 9, 1)
        .and_then(|d| d.and_hms_opt(12, minute, 0))
        .expect("valid timestamp")
}

fn batch_row(batch_id: Option<&str>, file_name: Option<&str>, row: Option<u32>, minute: u32) -> BatchRow {
    BatchRow {
        batch_id: batch_id.map(ToString::to_string),
        file_name: file_name.map(ToString::to_string),
        batch_row_number: row,
        created_at: at(minute),
    }
}

fn contact(row: u32) -> Contact {
    Contact {
        id: i64::from(row),
        phone: format!("+1{row}"),
        first_name: None,
        company: None,
        city: None,
        use_ai: false,
        use_ai_text: None,
        custom_fields: BTreeMap::new(),
        upload_batch_id: Some("b".to_string()),
        upload_file_name: None,
        batch_row_number: Some(row),
        responded: false,
        removed_at: None,
        created_at: at(0),
    }
}

#[test]
fn test_summaries_are_newest_first_with_labels() {
    let rows = vec![
        batch_row(None, None, None, 0),
        batch_row(None, None, None, 1),
        batch_row(Some("b1"), Some("leads.csv"), Some(1), 2),
        batch_row(Some("b1"), Some("leads.csv"), Some(2), 2),
        batch_row(Some("b2"), None, Some(1), 5),
    ];
    let summaries = summarize_batches(&rows);

    assert_eq!(summaries.len(), 3);
    assert_eq!(summaries[0].batch_id.as_deref(), Some("b2"));
    assert_eq!(summaries[0].label, "Upload (1 contacts)");
    assert_eq!(summaries[1].label, "leads.csv (2 contacts)");
    assert_eq!((summaries[1].min_row, summaries[1].max_row), (1, 2));
    assert!(summaries[1].has_row_numbers);

    let legacy = &summaries[2];
    assert_eq!(legacy.batch_id, None);
    assert_eq!(legacy.label, "All Contacts (2 contacts)");
    assert!(!legacy.has_row_numbers);
    assert_eq!((legacy.min_row, legacy.max_row), (1, 2));
}

#[test]
fn test_summaries_of_nothing_are_empty() {
    assert!(summarize_batches(&[]).is_empty());
}

#[test]
fn test_preview_plan_bounds_both_ends() {
    let range = RowRange::new(3, 7).expect("valid range");
    let selection = ContactSelection::batch_range(Some("b"), range);
    let plan = plan_preview(&selection, 3);

    assert_eq!(plan.first.limit, Some(3));
    assert_eq!(plan.last.limit, Some(3));
    assert!(plan.first.order_by.as_deref().is_some_and(|o| o.contains("ASC")));
    assert!(plan.last.order_by.as_deref().is_some_and(|o| o.contains("DESC")));
    assert!(plan.count.limit.is_none());
    assert!(plan
        .count
        .filters
        .iter()
        .any(|f| f.operator == Operator::GreaterThanOrEqual && f.value == FilterType::Integer(3)));
    assert!(plan
        .count
        .filters
        .iter()
        .any(|f| f.operator == Operator::LessThanOrEqual && f.value == FilterType::Integer(7)));
}

#[test]
fn test_legacy_selection_filters_null_batch() {
    let selection = ContactSelection::whole_batch(None);
    let filters = selection.filters().filters;
    assert_eq!(filters.len(), 1);
    assert_eq!(filters[0].value, FilterType::Null);
}

#[test]
fn test_assemble_preview_restores_ascending_tail() {
    let range = RowRange::new(3, 7).expect("valid range");
    let first = vec![contact(3), contact(4), contact(5)];
    let last_desc = vec![contact(7), contact(6), contact(5)];

    let preview = assemble_preview(Some("b"), range, 5, first, last_desc);
    let tail: Vec<Option<u32>> = preview.last_samples.iter().map(|c| c.batch_row_number).collect();
    assert_eq!(tail, vec![Some(5), Some(6), Some(7)]);
    assert_eq!(preview.total_in_range, 5);
    assert_eq!((preview.start, preview.end), (3, 7));
}
