use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use serde::Serialize;

const CONTACTS_INGESTED: &str = "txt_campaign_contacts_ingested_total";
const ROWS_SKIPPED: &str = "txt_campaign_rows_skipped_total";
const MESSAGES_GENERATED: &str = "txt_campaign_messages_generated_total";
const MESSAGES_SENT: &str = "txt_campaign_messages_sent_total";
const MESSAGES_FAILED: &str = "txt_campaign_messages_failed_total";
const FOLLOWUPS_REGENERATED: &str = "txt_campaign_followups_regenerated_total";
const ERRORS: &str = "txt_campaign_errors_total";
const OPERATION_DURATION: &str = "txt_campaign_operation_duration_seconds";
const LAST_BATCH_SIZE: &str = "txt_campaign_last_batch_size";

/// Metrics collection and management
///
/// Every event goes to the global `metrics` recorder (a no-op unless the
/// binary installs one) and to in-process tallies that a run summary or a
/// test can read back.
#[derive(Debug, Default)]
pub struct CampaignMetrics {
    contacts_ingested: AtomicU64,
    rows_skipped: AtomicU64,
    messages_generated: AtomicU64,
    messages_sent: AtomicU64,
    messages_failed: AtomicU64,
    followups_regenerated: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of the tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Contacts imported from CSV
    pub contacts_ingested: u64,
    /// CSV rows skipped
    pub rows_skipped: u64,
    /// Campaign messages generated
    pub messages_generated: u64,
    /// Messages delivered
    pub messages_sent: u64,
    /// Messages that failed to deliver
    pub messages_failed: u64,
    /// Stored follow-ups re-resolved after an edit
    pub followups_regenerated: u64,
    /// Operations that returned an error
    pub errors: u64,
}

fn as_u64(count: usize) -> u64 {
    u64::try_from(count).unwrap_or(u64::MAX)
}

impl CampaignMetrics {
    /// Create a collector with all tallies at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the result of one CSV upload
    pub fn record_ingest(&self, batch_id: &str, ingested: usize, skipped: usize, duration: Duration) {
        self.contacts_ingested.fetch_add(as_u64(ingested), Ordering::Relaxed);
        self.rows_skipped.fetch_add(as_u64(skipped), Ordering::Relaxed);

        counter!(CONTACTS_INGESTED).increment(as_u64(ingested));
        counter!(ROWS_SKIPPED).increment(as_u64(skipped));
        histogram!(OPERATION_DURATION, "operation" => "ingest").record(duration.as_secs_f64());
        #[allow(clippy::cast_precision_loss)]
        gauge!(LAST_BATCH_SIZE, "batch_id" => batch_id.to_string()).set(ingested as f64);
    }

    /// Record messages produced by the generator
    pub fn record_generated(&self, campaign_id: i64, count: usize) {
        self.messages_generated.fetch_add(as_u64(count), Ordering::Relaxed);
        counter!(MESSAGES_GENERATED, "campaign_id" => campaign_id.to_string()).increment(as_u64(count));
    }

    /// Record the outcome of one dispatch run
    pub fn record_dispatch(&self, message_type: &str, sent: usize, failed: usize, duration: Duration) {
        self.messages_sent.fetch_add(as_u64(sent), Ordering::Relaxed);
        self.messages_failed.fetch_add(as_u64(failed), Ordering::Relaxed);

        counter!(MESSAGES_SENT, "message_type" => message_type.to_string()).increment(as_u64(sent));
        counter!(MESSAGES_FAILED, "message_type" => message_type.to_string()).increment(as_u64(failed));
        histogram!(OPERATION_DURATION, "operation" => "dispatch").record(duration.as_secs_f64());
    }

    /// Record stored follow-ups rewritten after a template edit
    pub fn record_regenerated(&self, count: usize) {
        self.followups_regenerated.fetch_add(as_u64(count), Ordering::Relaxed);
        counter!(FOLLOWUPS_REGENERATED).increment(as_u64(count));
    }

    /// Record error metrics
    pub fn record_error(&self, error_type: &str, operation: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        counter!(ERRORS, "type" => error_type.to_string(), "operation" => operation.to_string()).increment(1);
    }

    /// Current tallies
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            contacts_ingested: self.contacts_ingested.load(Ordering::Relaxed),
            rows_skipped: self.rows_skipped.load(Ordering::Relaxed),
            messages_generated: self.messages_generated.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_failed: self.messages_failed.load(Ordering::Relaxed),
            followups_regenerated: self.followups_regenerated.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}
