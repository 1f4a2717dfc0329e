//! CSV contact ingestion.
//!
//! Turns raw CSV rows into contact records in three steps:
//!
//! - header normalization: trimmed headers are matched case-insensitively
//!   against alias tables for the phone and the standard fields, everything
//!   else with a value becomes a custom field;
//! - row validation: blank rows and rows without a phone are skipped with a
//!   reason instead of failing the upload;
//! - batch stamping: every surviving row gets the upload's batch id, file name
//!   and a dense 1-based row number.
//!
//! The pipeline is a pure fold over the rows; row numbers come from the
//! accumulator, never from shared counters.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::io::Read;

use chrono::Utc;
use csv::ReaderBuilder;
use rand::Rng;
use serde::{Serialize, Serializer};

use crate::error::Result;
use crate::models::{CustomFields, NewContact};

/// Header spellings accepted for the phone column, in priority order.
pub const PHONE_ALIASES: &[&str] = &[
    "phone",
    "phone number",
    "phone_number",
    "phone #",
    "mobile",
    "mobile phone",
    "mobile_phone",
    "mobile phone (global)",
    "mobile phone (us)",
    "mobile phone (direct)",
    "mobile phone (personal)",
    "mobile phone number",
];

/// Canonical contact fields other than the phone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardField {
    /// `first_name`
    FirstName,
    /// `company`
    Company,
    /// `city`
    City,
    /// `use_ai`
    UseAi,
    /// `use_ai_text`
    UseAiText,
}

/// Header spellings accepted for each standard field, in priority order.
pub const STANDARD_FIELD_ALIASES: &[(StandardField, &[&str])] = &[
    (StandardField::FirstName, &["first_name", "first name", "firstname"]),
    (StandardField::Company, &["company", "company name", "employer"]),
    (StandardField::City, &["city", "location city", "town"]),
    (StandardField::UseAi, &["use_ai", "use ai", "ai", "enable_ai"]),
    (StandardField::UseAiText, &["use_ai_text", "use ai text"]),
];

/// Values of the `use_ai` column read as true (compared lower-cased).
const TRUTHY_VALUES: &[&str] = &["true", "1", "yes", "y", "on"];

/// Number of skipped rows reported back to the uploader by default.
pub const MAX_SKIPPED_DETAILS: usize = 10;

const BATCH_SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// One CSV row as `(header, raw value)` pairs in column order.
pub type RawRow = Vec<(String, String)>;

/// A CSV row with trimmed headers and values and a case-insensitive lookup.
#[derive(Debug, Clone, Default)]
pub struct NormalizedRow {
    cells: BTreeMap<String, String>,
    lookup: HashMap<String, (String, String)>,
}

impl NormalizedRow {
    /// Trim every header and value, dropping headers that end up empty.
    ///
    /// When two headers collide case-insensitively the first one wins the
    /// lookup.
    #[must_use]
    pub fn from_raw(raw: RawRow) -> Self {
        let mut row = Self::default();
        for (raw_key, raw_value) in raw {
            let key = raw_key.trim();
            if key.is_empty() {
                continue;
            }
            let value = raw_value.trim().to_string();
            row.lookup
                .entry(key.to_lowercase())
                .or_insert_with(|| (key.to_string(), value.clone()));
            row.cells.insert(key.to_string(), value);
        }
        row
    }

    /// True if every value is empty after trimming.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.cells.values().all(String::is_empty)
    }

    /// First alias present in the row, as `(original header, value)`.
    #[must_use]
    pub fn find(&self, aliases: &[&str]) -> Option<(&str, &str)> {
        aliases.iter().find_map(|alias| {
            self.lookup
                .get(&alias.to_lowercase())
                .map(|(key, value)| (key.as_str(), value.as_str()))
        })
    }

    /// Trimmed cells keyed by trimmed header.
    #[must_use]
    pub const fn cells(&self) -> &BTreeMap<String, String> {
        &self.cells
    }
}

/// Contact fields extracted from one row before batch stamping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactDraft {
    /// Phone value; may be empty until validated
    pub phone: String,
    /// First name
    pub first_name: Option<String>,
    /// Company
    pub company: Option<String>,
    /// City
    pub city: Option<String>,
    /// Raw text of the `use_ai` column
    pub use_ai_raw: String,
    /// `use_ai_text` column, falling back to the raw `use_ai` text
    pub use_ai_text: Option<String>,
    /// Custom columns
    pub custom_fields: CustomFields,
    /// Original header names consumed by the phone and standard fields
    pub used_headers: BTreeSet<String>,
}

impl ContactDraft {
    /// Parsed `use_ai` flag.
    #[must_use]
    pub fn use_ai(&self) -> bool {
        TRUTHY_VALUES.contains(&self.use_ai_raw.to_lowercase().as_str())
    }

    fn into_new_contact(self, batch: &BatchStamp, batch_row_number: u32) -> NewContact {
        let use_ai = self.use_ai();
        NewContact {
            phone: self.phone,
            first_name: self.first_name,
            company: self.company,
            city: self.city,
            use_ai,
            use_ai_text: self.use_ai_text,
            custom_fields: self.custom_fields,
            upload_batch_id: batch.batch_id.clone(),
            upload_file_name: batch.file_name.clone(),
            batch_row_number,
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Map a normalized row onto the canonical contact schema.
#[must_use]
pub fn normalize_fields(row: &NormalizedRow) -> ContactDraft {
    let mut draft = ContactDraft::default();

    let phone_header = row.find(PHONE_ALIASES).map(|(key, value)| {
        draft.phone = value.to_string();
        key.to_string()
    });
    if let Some(header) = &phone_header {
        draft.used_headers.insert(header.clone());
    }

    let mut standard = HashMap::new();
    for (field, aliases) in STANDARD_FIELD_ALIASES {
        if let Some((key, value)) = row.find(aliases) {
            draft.used_headers.insert(key.to_string());
            standard.insert(*field, (key, value));
        }
    }
    let field = |f: StandardField| standard.get(&f).map(|(_, value)| *value).unwrap_or_default();

    draft.first_name = non_empty(field(StandardField::FirstName));
    draft.company = non_empty(field(StandardField::Company));
    draft.city = non_empty(field(StandardField::City));
    draft.use_ai_raw = field(StandardField::UseAi).to_string();
    draft.use_ai_text = non_empty(field(StandardField::UseAiText)).or_else(|| non_empty(&draft.use_ai_raw));

    for (key, value) in row.cells() {
        if value.is_empty() || draft.used_headers.contains(key) {
            continue;
        }
        draft.custom_fields.insert(key.clone(), value.clone());
    }
    // The phone column stays visible under its source header as well.
    if let Some(header) = phone_header.filter(|_| !draft.phone.is_empty()) {
        draft.custom_fields.insert(header, draft.phone.clone());
    }
    // Standard columns too, so `{First Name}` resolves like `{first_name}`.
    for (key, value) in standard.into_values() {
        if !value.is_empty() {
            draft.custom_fields.insert(key.to_string(), value.to_string());
        }
    }

    draft
}

/// Why a row did not become a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Every cell was empty
    Blank,
    /// No phone alias matched, or its value was empty
    MissingPhone,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blank => f.write_str("Row was blank"),
            Self::MissingPhone => f.write_str("Missing phone number"),
        }
    }
}

impl Serialize for SkipReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A row that was skipped during ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    /// 1-based position of the row in the file (header excluded)
    pub row: usize,
    /// Why it was skipped
    pub reason: SkipReason,
    /// The trimmed row, kept for rows missing a phone
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, String>>,
}

/// Validate one row and extract its contact fields.
pub fn classify_row(row: &NormalizedRow) -> std::result::Result<ContactDraft, SkipReason> {
    if row.is_blank() {
        return Err(SkipReason::Blank);
    }
    let draft = normalize_fields(row);
    if draft.phone.is_empty() {
        return Err(SkipReason::MissingPhone);
    }
    Ok(draft)
}

/// Batch identity shared by every contact of one upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchStamp {
    /// Globally unique batch identifier
    pub batch_id: String,
    /// Source file name
    pub file_name: String,
}

impl BatchStamp {
    /// Use an explicit batch id (tests, re-imports).
    pub fn new(batch_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            batch_id: batch_id.into(),
            file_name: file_name.into(),
        }
    }

    /// Fresh batch id for an upload of `file_name`, or `default_name` when the
    /// upload carries no usable name.
    #[must_use]
    pub fn generate(file_name: Option<&str>, default_name: &str) -> Self {
        let file_name = file_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(default_name);
        Self::new(generate_batch_id(), file_name)
    }
}

/// `batch_<unix millis>_<6 random base36 chars>`
#[must_use]
pub fn generate_batch_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| char::from(BATCH_SUFFIX_ALPHABET[rng.gen_range(0..BATCH_SUFFIX_ALPHABET.len())]))
        .collect();
    format!("batch_{}_{suffix}", Utc::now().timestamp_millis())
}

/// Outcome of ingesting one file.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// Batch the surviving rows were stamped with
    pub batch: BatchStamp,
    /// Surviving rows, in file order
    pub contacts: Vec<NewContact>,
    /// Every skipped row, in file order
    pub skipped: Vec<SkippedRow>,
    /// Number of data rows read
    pub total_rows: usize,
}

impl IngestReport {
    fn empty(batch: BatchStamp) -> Self {
        Self {
            batch,
            contacts: Vec::new(),
            skipped: Vec::new(),
            total_rows: 0,
        }
    }

    /// Total number of skipped rows.
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// The first `limit` skipped rows.
    #[must_use]
    pub fn skipped_details(&self, limit: usize) -> &[SkippedRow] {
        &self.skipped[..self.skipped.len().min(limit)]
    }

    fn push(mut self, row_index: usize, raw: RawRow) -> Self {
        self.total_rows += 1;
        let row = NormalizedRow::from_raw(raw);
        match classify_row(&row) {
            Ok(draft) => {
                let row_number = u32::try_from(self.contacts.len() + 1).unwrap_or(u32::MAX);
                self.contacts.push(draft.into_new_contact(&self.batch, row_number));
            }
            Err(reason) => {
                let data = (reason == SkipReason::MissingPhone).then(|| row.cells().clone());
                self.skipped.push(SkippedRow {
                    row: row_index,
                    reason,
                    data,
                });
            }
        }
        self
    }
}

/// Normalize, validate and stamp a sequence of CSV rows.
///
/// Row numbers are dense over the surviving rows: skipped rows do not consume
/// a number.
pub fn ingest_csv_rows<I>(rows: I, batch: BatchStamp) -> IngestReport
where
    I: IntoIterator<Item = RawRow>,
{
    rows.into_iter()
        .enumerate()
        .fold(IngestReport::empty(batch), |report, (index, raw)| report.push(index + 1, raw))
}

/// Read a headed CSV document into raw rows.
///
/// Short rows only carry the cells they have; cells beyond the header row are
/// ignored.
pub fn read_csv_rows<R: Read>(reader: R) -> Result<Vec<RawRow>> {
    let mut reader = ReaderBuilder::new().flexible(true).has_headers(true).from_reader(reader);
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row = headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| (header.to_string(), value.to_string()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_id_shape() {
        let id = generate_batch_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "batch");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2].bytes().all(|b| BATCH_SUFFIX_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_batch_ids_are_unique() {
        assert_ne!(generate_batch_id(), generate_batch_id());
    }

    #[test]
    fn test_generate_stamp_falls_back_to_default_name() {
        assert_eq!(BatchStamp::generate(None, "Manual Upload").file_name, "Manual Upload");
        assert_eq!(BatchStamp::generate(Some("  "), "Manual Upload").file_name, "Manual Upload");
        assert_eq!(BatchStamp::generate(Some("leads.csv"), "Manual Upload").file_name, "leads.csv");
    }

    #[test]
    fn test_case_insensitive_lookup_keeps_first_header() {
        let row = NormalizedRow::from_raw(vec![
            ("Phone".to_string(), "111".to_string()),
            ("PHONE".to_string(), "222".to_string()),
        ]);
        assert_eq!(row.find(&["phone"]), Some(("Phone", "111")));
    }
}
