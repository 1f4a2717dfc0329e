//! Unit tests for metrics.rs module

use std::time::Duration;
use txt_campaign::metrics::{CampaignMetrics, MetricsSnapshot};

#[test]
fn test_metrics_start_at_zero() {
    let metrics = CampaignMetrics::default();
    assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
}

#[test]
fn test_record_ingest_and_generation() {
    let metrics = CampaignMetrics::new();
    metrics.record_ingest("batch_1", 8, 2, Duration::from_millis(15));
    metrics.record_ingest("batch_2", 4, 0, Duration::from_millis(5));
    metrics.record_generated(1, 36);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.contacts_ingested, 12);
    assert_eq!(snapshot.rows_skipped, 2);
    assert_eq!(snapshot.messages_generated, 36);
}

#[test]
fn test_record_dispatch_and_errors() {
    let metrics = CampaignMetrics::new();
    metrics.record_dispatch("initial", 5, 1, Duration::from_secs(2));
    metrics.record_dispatch("followup_1", 3, 0, Duration::from_secs(1));
    metrics.record_regenerated(4);
    metrics.record_error("validation", "create_campaign");

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.messages_sent, 8);
    assert_eq!(snapshot.messages_failed, 1);
    assert_eq!(snapshot.followups_regenerated, 4);
    assert_eq!(snapshot.errors, 1);
}
