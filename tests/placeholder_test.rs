//! Tests for `{placeholder}` resolution and batch placeholder catalogs

use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use txt_campaign::ingest::{ingest_csv_rows, BatchStamp};
use txt_campaign::models::Contact;
use txt_campaign::placeholder::{catalog_placeholders, resolve_placeholders, PlaceholderScanner};

fn contact(id: i64, phone: &str, first_name: Option<&str>, company: Option<&str>) -> Contact {
    Contact {
        id,
        phone: phone.to_string(),
        first_name: first_name.map(ToString::to_string),
        company: company.map(ToString::to_string),
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

#[test]
fn test_resolves_standard_fields() {
    let john = contact(1, "+1234567890", Some("John"), Some("Acme"));
    assert_eq!(
        resolve_placeholders("Hi {first_name} from {company}, call {phone}", &john),
        "Hi John from Acme, call +1234567890"
    );
}

#[test]
fn test_missing_values_leave_token() {
    let anon = contact(1, "+1", None, None);
    assert_eq!(resolve_placeholders("Hi {first_name}!", &anon), "Hi {first_name}!");
    assert_eq!(resolve_placeholders("See {unknown}", &anon), "See {unknown}");
}

#[test]
fn test_use_ai_resolution() {
    let mut c = contact(1, "+1", None, None);
    assert_eq!(resolve_placeholders("{use_ai}", &c), "{use_ai}");

    c.use_ai = true;
    assert_eq!(resolve_placeholders("{use_ai}", &c), "true");

    c.use_ai_text = Some("Saw your post".to_string());
    assert_eq!(resolve_placeholders("{use_ai}", &c), "Saw your post");
}

#[test]
fn test_custom_fields_with_regex_metacharacters() {
    let mut c = contact(1, "+1", Some("Ann"), None);
    c.custom_fields.insert("Deal Size ($)".to_string(), "10k".to_string());
    c.custom_fields.insert("a.b*".to_string(), "star".to_string());
    assert_eq!(
        resolve_placeholders("{first_name}: {Deal Size ($)} / {a.b*}", &c),
        "Ann: 10k / star"
    );
}

#[test]
fn test_custom_field_cannot_shadow_standard_field() {
    let mut c = contact(1, "+1", Some("Ann"), None);
    c.custom_fields.insert("first_name".to_string(), "Shadow".to_string());
    assert_eq!(resolve_placeholders("Hi {first_name}", &c), "Hi Ann");
}

#[test]
fn test_resolution_is_idempotent() {
    let mut c = contact(1, "+1", Some("Ann"), Some("Acme"));
    c.custom_fields.insert("Industry".to_string(), "Retail".to_string());
    let template = "Hi {first_name} at {company} in {Industry} {missing}";
    let once = resolve_placeholders(template, &c);
    assert_eq!(resolve_placeholders(&once, &c), once);
}

#[test]
fn test_scanner_reports_unresolved_keys() {
    let scanner = PlaceholderScanner::new().expect("Failed to build scanner");
    let c = contact(1, "+1", Some("Ann"), None);
    let template = "Hi {first_name} from {company}, re {first_name} and {Budget}";

    assert_eq!(scanner.keys(template), vec!["first_name", "company", "Budget"]);
    assert_eq!(scanner.unresolved(template, &c), vec!["company", "Budget"]);
}

#[test]
fn test_catalog_dedupes_case_insensitively_and_backfills_samples() {
    let mut first = contact(1, "+1", None, Some("Acme"));
    first.custom_fields.insert("Industry".to_string(), String::new());
    first.custom_fields.insert("budget".to_string(), "5k".to_string());
    let mut second = contact(2, "+2", Some("Bob"), None);
    second.custom_fields.insert("industry".to_string(), "Retail".to_string());

    let catalog = catalog_placeholders(&[first, second]);
    let keys: Vec<&str> = catalog.placeholders.iter().map(|p| p.key.as_str()).collect();
    assert_eq!(keys, vec!["budget", "Industry"]);
    assert_eq!(catalog.placeholders[1].sample_value, "Retail");

    assert_eq!(catalog.normalized_samples.get("phone").map(String::as_str), Some("+1"));
    assert_eq!(catalog.normalized_samples.get("first_name").map(String::as_str), Some("Bob"));
    assert_eq!(catalog.normalized_samples.get("company").map(String::as_str), Some("Acme"));
}

#[test]
fn test_source_headers_of_standard_columns_resolve() {
    let rows = vec![vec![
        ("Phone".to_string(), "+1555".to_string()),
        ("First Name".to_string(), "John".to_string()),
        ("Company Name".to_string(), "Acme".to_string()),
    ]];
    let report = ingest_csv_rows(rows, BatchStamp::new("batch_1", "leads.csv"));
    let mut john = contact(1, "+1555", Some("John"), Some("Acme"));
    john.custom_fields.clone_from(&report.contacts[0].custom_fields);

    assert_eq!(
        resolve_placeholders("Hi {First Name} at {Company Name} ({first_name})", &john),
        "Hi John at Acme (John)"
    );

    let catalog = catalog_placeholders(&[john]);
    let keys: Vec<&str> = catalog.placeholders.iter().map(|p| p.key.as_str()).collect();
    assert_eq!(keys, vec!["Company Name", "First Name", "Phone"]);
}
