//! Data models for contacts, campaigns and campaign messages
//!
//! This module contains the data structures shared by the ingestion pipeline,
//! the campaign message generator, the query planner and the database layer.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{CampaignError, Result};

/// Unrecognized CSV columns kept per contact, keyed by original header text
pub type CustomFields = BTreeMap<String, String>;

/// A stored contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Database primary key
    pub id: i64,
    /// Phone number, the identity key; never empty
    pub phone: String,
    /// First name (optional)
    pub first_name: Option<String>,
    /// Company name (optional)
    pub company: Option<String>,
    /// City (optional)
    pub city: Option<String>,
    /// Whether the AI flag column was truthy
    pub use_ai: bool,
    /// Free-text override for the `{use_ai}` placeholder
    pub use_ai_text: Option<String>,
    /// Columns that did not map onto a standard field
    pub custom_fields: CustomFields,
    /// Upload batch this contact came from; `None` for legacy data
    pub upload_batch_id: Option<String>,
    /// Name of the uploaded file
    pub upload_file_name: Option<String>,
    /// 1-based position among the surviving rows of the batch
    pub batch_row_number: Option<u32>,
    /// True once the contact has answered (or was removed)
    pub responded: bool,
    /// When the contact was removed from all campaigns
    pub removed_at: Option<NaiveDateTime>,
    /// Insertion timestamp
    pub created_at: NaiveDateTime,
}

/// Data for inserting a contact produced by CSV ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContact {
    /// Phone number (non-empty)
    pub phone: String,
    /// First name
    pub first_name: Option<String>,
    /// Company name
    pub company: Option<String>,
    /// City
    pub city: Option<String>,
    /// Parsed AI flag
    pub use_ai: bool,
    /// AI text override
    pub use_ai_text: Option<String>,
    /// Custom columns
    pub custom_fields: CustomFields,
    /// Batch identifier shared by every row of one upload
    pub upload_batch_id: String,
    /// Source file name
    pub upload_file_name: String,
    /// Dense 1-based row number within the batch
    pub batch_row_number: u32,
}

/// Inclusive window over a batch's row numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRange {
    start: u32,
    end: u32,
}

impl RowRange {
    /// Build a range, rejecting non-positive bounds and `start > end`.
    pub fn new(start: i64, end: i64) -> Result<Self> {
        if start <= 0 || end <= 0 || start > end {
            return Err(CampaignError::validation("Invalid row range specified."));
        }
        let start = u32::try_from(start).map_err(|_| CampaignError::validation("Row range start is too large."))?;
        let end = u32::try_from(end).map_err(|_| CampaignError::validation("Row range end is too large."))?;
        Ok(Self { start, end })
    }

    /// First row (inclusive)
    #[must_use]
    pub const fn start(&self) -> u32 {
        self.start
    }

    /// Last row (inclusive)
    #[must_use]
    pub const fn end(&self) -> u32 {
        self.end
    }

    /// True if `row` falls inside the window
    #[must_use]
    pub const fn contains(&self, row: u32) -> bool {
        row >= self.start && row <= self.end
    }

    /// Number of row numbers covered by the window
    #[must_use]
    pub const fn span(&self) -> u32 {
        self.end - self.start + 1
    }
}

/// Lifecycle of a campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    /// Editable, nothing sent yet
    Draft,
    /// Initial messages generated and dispatched; follow-ups still editable
    Active,
}

impl CampaignStatus {
    /// Storage representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
        }
    }
}

impl FromStr for CampaignStatus {
    type Err = CampaignError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            other => Err(CampaignError::validation(format!("Unknown campaign status: {other}"))),
        }
    }
}

/// Batch + row range a campaign is restricted to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Targeting {
    /// Upload batch identifier
    pub batch_id: String,
    /// Inclusive row window inside the batch
    pub range: RowRange,
}

/// A stored campaign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    /// Database primary key
    pub id: i64,
    /// Campaign name
    pub name: String,
    /// Template of the initial message
    pub message: String,
    /// Follow-up templates; `followup_messages.len() == followup_count`
    pub followup_messages: Vec<String>,
    /// Number of follow-ups generated per contact
    pub followup_count: u32,
    /// Current status
    pub status: CampaignStatus,
    /// Optional batch/range restriction
    pub targeting: Option<Targeting>,
    /// Insertion timestamp
    pub created_at: NaiveDateTime,
}

impl Campaign {
    /// Template for follow-up `number` (1-based).
    ///
    /// A blank or missing slot falls back to the main message template.
    #[must_use]
    pub fn followup_template(&self, number: u32) -> &str {
        number
            .checked_sub(1)
            .and_then(|index| self.followup_messages.get(index as usize))
            .filter(|template| !template.trim().is_empty())
            .map_or(self.message.as_str(), String::as_str)
    }
}

/// Raw request to create a campaign
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCampaign {
    /// Campaign name (required)
    pub name: String,
    /// Initial message template (required)
    pub message: String,
    /// Follow-up templates
    #[serde(default)]
    pub followup_messages: Vec<String>,
    /// Number of follow-ups; defaults to the number of templates
    pub followup_count: Option<u32>,
    /// Batch to target
    pub contact_batch_id: Option<String>,
    /// First row of the targeted range
    pub range_start: Option<i64>,
    /// Last row of the targeted range
    pub range_end: Option<i64>,
}

/// Raw request to edit a campaign
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignUpdate {
    /// New name (draft only)
    pub name: Option<String>,
    /// New initial template (draft only)
    pub message: Option<String>,
    /// New follow-up templates (required for active campaigns)
    pub followup_messages: Option<Vec<String>>,
    /// New follow-up count
    pub followup_count: Option<u32>,
}

/// Kind of a campaign message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageType {
    /// The first message of a campaign
    Initial,
    /// Follow-up number `n`, `n >= 1`
    Followup(u32),
}

impl MessageType {
    /// Follow-up number, if this is a follow-up
    #[must_use]
    pub const fn followup_number(&self) -> Option<u32> {
        match self {
            Self::Initial => None,
            Self::Followup(n) => Some(*n),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => f.write_str("initial"),
            Self::Followup(n) => write!(f, "followup_{n}"),
        }
    }
}

impl FromStr for MessageType {
    type Err = CampaignError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "initial" {
            return Ok(Self::Initial);
        }
        s.strip_prefix("followup_")
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|n| *n >= 1)
            .map(Self::Followup)
            .ok_or_else(|| CampaignError::validation(format!("Unknown message type: {s}")))
    }
}

impl Serialize for MessageType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Delivery state of a campaign message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Generated and waiting to be sent
    Stored,
    /// Delivered; text is frozen
    Sent,
    /// Delivery failed
    Failed,
}

impl MessageStatus {
    /// Storage representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stored => "stored",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for MessageStatus {
    type Err = CampaignError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stored" => Ok(Self::Stored),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            other => Err(CampaignError::validation(format!("Unknown message status: {other}"))),
        }
    }
}

/// A stored campaign message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignMessage {
    /// Database primary key
    pub id: i64,
    /// Owning campaign
    pub campaign_id: i64,
    /// Recipient
    pub contact_id: i64,
    /// `initial` or `followup_<n>`
    pub message_type: MessageType,
    /// Delivery state
    pub status: MessageStatus,
    /// Fully resolved text
    pub message_text: String,
    /// When the message was scheduled
    pub scheduled_time: Option<NaiveDateTime>,
    /// When the message was delivered
    pub sent_time: Option<NaiveDateTime>,
}

/// A campaign message joined with the recipient's display fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignMessageView {
    /// The message itself
    #[serde(flatten)]
    pub message: CampaignMessage,
    /// Recipient phone
    pub phone: String,
    /// Recipient first name
    pub first_name: Option<String>,
    /// Recipient company
    pub company: Option<String>,
}

/// Derived summary of one upload batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Batch identifier; `None` for the legacy default batch
    pub batch_id: Option<String>,
    /// Display label, `"<file> (<n> contacts)"`
    pub label: String,
    /// Source file name
    pub file_name: String,
    /// Number of contacts in the batch
    pub total_contacts: usize,
    /// Smallest row number (0 when empty)
    pub min_row: u32,
    /// Largest row number (0 when empty)
    pub max_row: u32,
    /// False if any row number had to be assigned dynamically
    pub has_row_numbers: bool,
    /// Earliest insertion time of the batch
    pub created_at: Option<NaiveDateTime>,
}

/// Bounded preview of a batch row range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangePreview {
    /// Previewed batch; `None` for the legacy set
    pub batch_id: Option<String>,
    /// First row requested
    pub start: u32,
    /// Last row requested
    pub end: u32,
    /// Number of selectable contacts in the range
    pub total_in_range: usize,
    /// Lowest-numbered rows, ascending
    pub first_samples: Vec<Contact>,
    /// Highest-numbered rows, ascending
    pub last_samples: Vec<Contact>,
}

/// Per follow-up delivery tallies for one campaign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowupStatus {
    /// `followup_<n>`
    pub message_type: MessageType,
    /// All messages of this type
    pub total: usize,
    /// Still waiting to be sent
    pub stored: usize,
    /// Delivered
    pub sent: usize,
    /// Failed to deliver
    pub failed: usize,
}

/// A contact that opted out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovedContact {
    /// Phone number as stored
    pub phone: String,
    /// Removal time
    pub removed_at: NaiveDateTime,
}

/// Output format for exported campaign messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Comma-separated values format
    Csv,
    /// Plain text format
    Txt,
    /// JSON format
    Json,
}

impl OutputFormat {
    /// Get the file extension for this format
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Txt => "txt",
            Self::Json => "json",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = CampaignError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "txt" => Ok(Self::Txt),
            "json" => Ok(Self::Json),
            other => Err(CampaignError::validation(format!("Unknown output format: {other}"))),
        }
    }
}

/// Query builder for constructing contact queries
#[derive(Debug, Default)]
pub struct QueryBuilder {
    /// List of filters to apply
    pub filters: Vec<Filter>,
    /// Ordering clause, e.g. `batch_row_number ASC`
    pub order_by: Option<String>,
    /// Maximum number of results to return
    pub limit: Option<usize>,
}

/// A filter condition for database queries
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Column name to filter on
    pub field: String,
    /// Comparison operator
    pub operator: Operator,
    /// Value to compare against
    pub value: FilterType,
}

/// Comparison operators for filters
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Operator {
    /// Equality (=), or `IS NULL` against [`FilterType::Null`]
    Equal,
    /// Greater than or equal (>=)
    GreaterThanOrEqual,
    /// Less than or equal (<=)
    LessThanOrEqual,
}

/// Value types for filter conditions
#[derive(Debug, Clone, PartialEq)]
pub enum FilterType {
    /// Text value
    Text(String),
    /// Integer value
    Integer(i64),
    /// Boolean value
    Boolean(bool),
    /// NULL value
    Null,
}

impl QueryBuilder {
    /// Create a new empty query builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter condition to the query
    pub fn add_filter(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    /// Set the ordering clause
    pub fn set_order_by(&mut self, order_by: String) {
        self.order_by = Some(order_by);
    }

    /// Set the maximum number of results to return
    pub const fn set_limit(&mut self, limit: usize) {
        self.limit = Some(limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign(message: &str, followups: &[&str]) -> Campaign {
        Campaign {
            id: 1,
            name: "Spring".to_string(),
            message: message.to_string(),
            followup_messages: followups.iter().map(ToString::to_string).collect(),
            followup_count: u32::try_from(followups.len()).unwrap_or_default(),
            status: CampaignStatus::Draft,
            targeting: None,
            created_at: NaiveDateTime::default(),
        }
    }

    #[test]
    fn test_message_type_round_trips_through_text() {
        assert_eq!("initial".parse::<MessageType>().unwrap(), MessageType::Initial);
        assert_eq!("followup_3".parse::<MessageType>().unwrap(), MessageType::Followup(3));
        assert_eq!(MessageType::Followup(12).to_string(), "followup_12");
        assert!("followup_0".parse::<MessageType>().is_err());
        assert!("followup_x".parse::<MessageType>().is_err());
    }

    #[test]
    fn test_row_range_rejects_inverted_and_non_positive_bounds() {
        assert!(RowRange::new(0, 5).is_err());
        assert!(RowRange::new(3, -1).is_err());
        assert!(RowRange::new(7, 3).is_err());
        let range = RowRange::new(3, 7).unwrap();
        assert_eq!(range.span(), 5);
        assert!(range.contains(3) && range.contains(7) && !range.contains(8));
    }

    #[test]
    fn test_followup_template_falls_back_to_main_message() {
        let c = campaign("Hi {first_name}", &["Second try", "  "]);
        assert_eq!(c.followup_template(1), "Second try");
        assert_eq!(c.followup_template(2), "Hi {first_name}");
        assert_eq!(c.followup_template(3), "Hi {first_name}");
        assert_eq!(c.followup_template(0), "Hi {first_name}");
    }
}
