//! Database schema definitions
//!
//! This module provides constants for table and column names used with rusqlite.
//! The tables themselves are created by the SQL files under `migrations/`.

/// Contacts table schema
pub mod contacts {
    /// Table name
    pub const TABLE: &str = "contacts";
    /// Primary key column
    pub const ID: &str = "id";
    /// Phone number column
    pub const PHONE: &str = "phone";
    /// First name column
    pub const FIRST_NAME: &str = "first_name";
    /// Company column
    pub const COMPANY: &str = "company";
    /// City column
    pub const CITY: &str = "city";
    /// AI flag column
    pub const USE_AI: &str = "use_ai";
    /// AI text override column
    pub const USE_AI_TEXT: &str = "use_ai_text";
    /// Custom fields, JSON object text
    pub const CUSTOM_FIELDS: &str = "custom_fields";
    /// Upload batch identifier column
    pub const UPLOAD_BATCH_ID: &str = "upload_batch_id";
    /// Uploaded file name column
    pub const UPLOAD_FILE_NAME: &str = "upload_file_name";
    /// Row number within the batch
    pub const BATCH_ROW_NUMBER: &str = "batch_row_number";
    /// Responded flag column
    pub const RESPONDED: &str = "responded";
    /// Removal timestamp column
    pub const REMOVED_AT: &str = "removed_at";
    /// Insertion timestamp column
    pub const CREATED_AT: &str = "created_at";
}

/// Campaigns table schema
pub mod campaigns {
    /// Table name
    pub const TABLE: &str = "campaigns";
    /// Primary key column
    pub const ID: &str = "id";
    /// Campaign name column
    pub const NAME: &str = "name";
    /// Initial message template column
    pub const MESSAGE: &str = "message";
    /// Follow-up templates, JSON array text
    pub const FOLLOWUP_MESSAGES: &str = "followup_messages";
    /// Follow-up count column
    pub const FOLLOWUP_COUNT: &str = "followup_count";
    /// Status column (`draft` / `active`)
    pub const STATUS: &str = "status";
    /// Targeted batch column
    pub const CONTACT_BATCH_ID: &str = "contact_batch_id";
    /// First targeted row
    pub const RANGE_START: &str = "range_start";
    /// Last targeted row
    pub const RANGE_END: &str = "range_end";
    /// Insertion timestamp column
    pub const CREATED_AT: &str = "created_at";
}

/// Campaign messages table schema
pub mod campaign_messages {
    /// Table name
    pub const TABLE: &str = "campaign_messages";
    /// Primary key column
    pub const ID: &str = "id";
    /// Foreign key to campaigns
    pub const CAMPAIGN_ID: &str = "campaign_id";
    /// Foreign key to contacts
    pub const CONTACT_ID: &str = "contact_id";
    /// `initial` / `followup_<n>`
    pub const MESSAGE_TYPE: &str = "message_type";
    /// Status column (`stored` / `sent` / `failed`)
    pub const STATUS: &str = "status";
    /// Resolved message text column
    pub const MESSAGE_TEXT: &str = "message_text";
    /// Scheduling timestamp column
    pub const SCHEDULED_TIME: &str = "scheduled_time";
    /// Delivery timestamp column
    pub const SENT_TIME: &str = "sent_time";
}
