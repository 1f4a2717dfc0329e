//! Tests for CSV ingestion: header aliasing, row skipping and batch stamping

use proptest::prelude::*;
use txt_campaign::ingest::{
    classify_row, ingest_csv_rows, normalize_fields, read_csv_rows, BatchStamp, NormalizedRow, RawRow, SkipReason,
};

fn row(cells: &[(&str, &str)]) -> RawRow {
    cells.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
}

fn stamp() -> BatchStamp {
    BatchStamp::new("batch_test", "leads.csv")
}

#[test]
fn test_whitespace_only_row_is_blank() {
    let normalized = NormalizedRow::from_raw(row(&[("Phone", "   "), ("First Name", "\t")]));
    assert!(normalized.is_blank());
    assert_eq!(classify_row(&normalized), Err(SkipReason::Blank));
}

#[test]
fn test_row_without_phone_is_skipped_with_data() {
    let report = ingest_csv_rows(vec![row(&[("Name", "Ann"), ("Company", "Acme")])], stamp());
    assert!(report.contacts.is_empty());
    assert_eq!(report.skipped_count(), 1);

    let skipped = &report.skipped[0];
    assert_eq!(skipped.row, 1);
    assert_eq!(skipped.reason, SkipReason::MissingPhone);
    let data = skipped.data.as_ref().expect("missing-phone rows keep their data");
    assert_eq!(data.get("Company").map(String::as_str), Some("Acme"));
}

#[test]
fn test_phone_alias_priority() {
    let normalized = NormalizedRow::from_raw(row(&[("Mobile", "222"), ("Phone Number", "111")]));
    let draft = normalize_fields(&normalized);
    assert_eq!(draft.phone, "111");
}

#[test]
fn test_standard_fields_and_custom_columns() {
    let normalized = NormalizedRow::from_raw(row(&[
        ("Mobile Phone", " +1 555 0100 "),
        ("First Name", "John"),
        ("Employer", "Acme"),
        ("Town", "Austin"),
        ("Use AI", "Yes"),
        ("Industry", "Retail"),
        ("Notes", ""),
    ]));
    let draft = normalize_fields(&normalized);

    assert_eq!(draft.phone, "+1 555 0100");
    assert_eq!(draft.first_name.as_deref(), Some("John"));
    assert_eq!(draft.company.as_deref(), Some("Acme"));
    assert_eq!(draft.city.as_deref(), Some("Austin"));
    assert!(draft.use_ai());
    assert_eq!(draft.use_ai_text.as_deref(), Some("Yes"));

    assert_eq!(draft.custom_fields.get("Industry").map(String::as_str), Some("Retail"));
    assert!(!draft.custom_fields.contains_key("Notes"));
    assert_eq!(draft.custom_fields.get("Employer").map(String::as_str), Some("Acme"));
    // The phone column is also available under its own header.
    assert_eq!(draft.custom_fields.get("Mobile Phone").map(String::as_str), Some("+1 555 0100"));
}

#[test]
fn test_standard_columns_keep_their_source_headers() {
    let report = ingest_csv_rows(
        vec![row(&[("Phone", "+1555"), ("First Name", "John"), ("Company Name", "Acme"), ("City", "")])],
        stamp(),
    );
    let contact = &report.contacts[0];

    assert_eq!(contact.first_name.as_deref(), Some("John"));
    assert_eq!(contact.custom_fields.get("Phone").map(String::as_str), Some("+1555"));
    assert_eq!(contact.custom_fields.get("First Name").map(String::as_str), Some("John"));
    assert_eq!(contact.custom_fields.get("Company Name").map(String::as_str), Some("Acme"));
    assert!(!contact.custom_fields.contains_key("City"));
}

#[test]
fn test_use_ai_text_column_wins_over_flag_text() {
    let normalized = NormalizedRow::from_raw(row(&[
        ("phone", "1"),
        ("use_ai", "no"),
        ("use_ai_text", "Custom opener"),
    ]));
    let draft = normalize_fields(&normalized);
    assert!(!draft.use_ai());
    assert_eq!(draft.use_ai_text.as_deref(), Some("Custom opener"));
}

#[test]
fn test_row_numbers_skip_rejected_rows() {
    let rows = vec![
        row(&[("phone", "1")]),
        row(&[("phone", "")]),
        row(&[("phone", " ")]),
        row(&[("phone", "2")]),
    ];
    let report = ingest_csv_rows(rows, stamp());

    let numbers: Vec<u32> = report.contacts.iter().map(|c| c.batch_row_number).collect();
    assert_eq!(numbers, vec![1, 2]);
    assert_eq!(report.total_rows, 4);
    assert_eq!(report.skipped_count(), 2);
    assert_eq!(report.skipped[0].row, 2);
    assert_eq!(report.skipped[1].reason, SkipReason::Blank);
    assert!(report
        .contacts
        .iter()
        .all(|c| c.upload_batch_id == "batch_test" && c.upload_file_name == "leads.csv"));
}

#[test]
fn test_skipped_details_are_capped() {
    let rows: Vec<RawRow> = (0..25).map(|_| row(&[("name", "x")])).collect();
    let report = ingest_csv_rows(rows, stamp());
    assert_eq!(report.skipped_count(), 25);
    assert_eq!(report.skipped_details(10).len(), 10);
    assert_eq!(report.skipped_details(100).len(), 25);
}

#[test]
fn test_read_csv_rows_handles_short_rows() {
    let csv = "Phone,First Name,Company\n555,Ann\n556,Bob,Acme\n";
    let rows = read_csv_rows(csv.as_bytes()).expect("Failed to read CSV");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].len(), 2);
    assert_eq!(rows[1][2], ("Company".to_string(), "Acme".to_string()));
}

#[test]
fn test_empty_input_yields_empty_report() {
    let rows = read_csv_rows("Phone,Name\n".as_bytes()).expect("Failed to read CSV");
    let report = ingest_csv_rows(rows, stamp());
    assert_eq!(report.total_rows, 0);
    assert!(report.contacts.is_empty());
    assert!(report.skipped.is_empty());
}

fn arb_row() -> impl Strategy<Value = RawRow> {
    (
        prop_oneof![Just(String::new()), Just("   ".to_string()), "[0-9]{3,10}"],
        prop_oneof![Just(String::new()), "[A-Za-z]{1,8}"],
    )
        .prop_map(|(phone, name)| vec![("Phone".to_string(), phone), ("First Name".to_string(), name)])
}

proptest! {
    #[test]
    fn prop_row_numbers_are_dense_and_counts_add_up(rows in prop::collection::vec(arb_row(), 0..40)) {
        let total = rows.len();
        let report = ingest_csv_rows(rows, stamp());

        prop_assert_eq!(report.total_rows, total);
        prop_assert_eq!(report.contacts.len() + report.skipped_count(), total);
        for (index, contact) in report.contacts.iter().enumerate() {
            prop_assert_eq!(contact.batch_row_number as usize, index + 1);
            prop_assert!(!contact.phone.is_empty());
        }
    }
}
