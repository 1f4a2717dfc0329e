//! Campaign workflows on top of the store and the delivery seam.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::campaign::{
    apply_campaign_update, generate_campaign_messages, reconcile_messages, regenerate_followups, validate_new_campaign,
};
use crate::config::AppConfig;
use crate::db::{ClearSummary, Database};
use crate::delivery::{dispatch_sequential, AppleScriptSender, DispatchSummary, DryRunSender, MessageSender, Outgoing};
use crate::error::{CampaignError, Result};
use crate::file_writer::write_messages_to_file;
use crate::ingest::{ingest_csv_rows, read_csv_rows, BatchStamp, SkippedRow};
use crate::logging::OperationTimer;
use crate::metrics::CampaignMetrics;
use crate::models::{
    BatchSummary, Campaign, CampaignMessageView, CampaignStatus, CampaignUpdate, Contact, FollowupStatus,
    MessageStatus, MessageType, NewCampaign, OutputFormat, RangePreview, RemovedContact, RowRange,
};
use crate::placeholder::{catalog_placeholders, PlaceholderCatalog, PlaceholderScanner, STANDARD_PLACEHOLDERS};
use crate::planner::{assemble_preview, plan_preview, summarize_batches, ContactSelection};
use crate::validation::InputValidator;

/// Result of one CSV upload
#[derive(Debug, Clone, Serialize)]
pub struct UploadSummary {
    /// Identifier stamped on every imported contact
    pub batch_id: String,
    /// Name recorded for the batch
    pub file_name: String,
    /// Contacts imported
    pub count: usize,
    /// Data rows read from the file
    pub total_rows: usize,
    /// Rows skipped as blank or missing a phone
    pub skipped: usize,
    /// First skipped rows, capped by `ingest.max_skipped_details`
    pub skipped_details: Vec<SkippedRow>,
}

/// A newly created campaign and the size of its target range
#[derive(Debug, Clone, Serialize)]
pub struct CreatedCampaign {
    /// The stored draft
    pub campaign: Campaign,
    /// Contacts in the targeted range; `None` when untargeted
    pub target_count: Option<usize>,
}

/// Result of editing a campaign
#[derive(Debug, Clone, Serialize)]
pub struct UpdatedCampaign {
    /// Campaign as saved
    pub campaign: Campaign,
    /// Stored follow-ups whose text was re-resolved
    pub regenerated_followups: usize,
}

/// Result of activating a campaign
#[derive(Debug, Clone, Serialize)]
pub struct SendReport {
    /// Campaign that was activated
    pub campaign_id: i64,
    /// Initial messages generated
    pub initial_count: usize,
    /// Follow-up messages stored for later
    pub followup_count: usize,
    /// Targeted batch, if any
    pub contact_batch_id: Option<String>,
    /// First targeted row
    pub range_start: Option<u32>,
    /// Last targeted row
    pub range_end: Option<u32>,
    /// Outcome of delivering the initial messages
    pub delivery: DispatchSummary,
}

/// Result of a manual follow-up send
#[derive(Debug, Clone, Serialize)]
pub struct FollowupReport {
    /// Campaign the follow-up belongs to
    pub campaign_id: i64,
    /// Which follow-up was sent
    pub message_type: MessageType,
    /// Messages attempted
    pub total: usize,
    /// Delivery outcome
    pub delivery: DispatchSummary,
}

/// Campaign workflows over the store and a message sender.
pub struct CampaignService {
    db: Database,
    sender: Arc<dyn MessageSender>,
    config: AppConfig,
    metrics: Arc<CampaignMetrics>,
    scanner: PlaceholderScanner,
}

impl CampaignService {
    /// Build a service around an open database and a sender.
    pub fn new(db: Database, sender: Arc<dyn MessageSender>, config: AppConfig) -> Result<Self> {
        Ok(Self {
            db,
            sender,
            config,
            metrics: Arc::new(CampaignMetrics::new()),
            scanner: PlaceholderScanner::new()?,
        })
    }

    /// Open the configured database and pick the configured sender.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let database_url = config.get_database_url();
        InputValidator::validate_database_url(&database_url)?;
        let db = Database::new(&database_url, config.database.max_connections, config.connection_timeout())?;

        let sender: Arc<dyn MessageSender> = if config.is_dry_run() {
            Arc::new(DryRunSender)
        } else {
            Arc::new(AppleScriptSender::new(
                config.delivery.osascript_path.clone(),
                config.delivery.service.clone(),
                config.delivery_timeout(),
            ))
        };
        Self::new(db, sender, config)
    }

    /// Tallies collected by this service.
    pub fn metrics(&self) -> &CampaignMetrics {
        &self.metrics
    }

    /// The underlying store.
    pub const fn database(&self) -> &Database {
        &self.db
    }

    fn track<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.metrics.record_error(e.kind(), operation);
        }
        result
    }

    fn require_campaign(&self, campaign_id: i64) -> Result<Campaign> {
        InputValidator::validate_campaign_id(campaign_id)?;
        self.db
            .get_campaign(campaign_id)?
            .ok_or_else(|| CampaignError::not_found(format!("Campaign {campaign_id} not found")))
    }

    fn delay(&self, delay_seconds: Option<u64>) -> Result<Duration> {
        InputValidator::validate_delay_seconds(delay_seconds.unwrap_or(self.config.campaign.default_delay_seconds))
    }

    // ----- contacts and batches -----

    /// Ingest a CSV document as a new batch.
    pub fn upload_csv<R: Read>(&self, reader: R, file_name: Option<&str>) -> Result<UploadSummary> {
        let result = self.upload_csv_inner(reader, file_name);
        self.track("upload", result)
    }

    fn upload_csv_inner<R: Read>(&self, reader: R, file_name: Option<&str>) -> Result<UploadSummary> {
        let timer = OperationTimer::new("upload_csv");
        let started = Instant::now();

        let rows = read_csv_rows(reader)?;
        let stamp = BatchStamp::generate(file_name, &self.config.ingest.default_file_name);
        let report = ingest_csv_rows(rows, stamp);
        let skipped_details = report.skipped_details(self.config.ingest.max_skipped_details).to_vec();

        if report.contacts.is_empty() {
            return Err(CampaignError::validation(format!(
                "No valid contacts found in CSV ({} row(s) skipped)",
                report.skipped_count()
            )));
        }

        let count = self.db.insert_contacts(&report.contacts)?;
        self.metrics
            .record_ingest(&report.batch.batch_id, count, report.skipped_count(), started.elapsed());
        info!(
            batch_id = %report.batch.batch_id,
            file_name = %report.batch.file_name,
            count,
            skipped = report.skipped_count(),
            "Uploaded contacts"
        );
        timer.finish();

        Ok(UploadSummary {
            batch_id: report.batch.batch_id.clone(),
            file_name: report.batch.file_name.clone(),
            count,
            total_rows: report.total_rows,
            skipped: report.skipped_count(),
            skipped_details,
        })
    }

    /// Ingest the CSV file at `path`, named after the file.
    pub fn upload_csv_file(&self, path: &Path) -> Result<UploadSummary> {
        InputValidator::validate_file_path(path)?;
        let file = File::open(path)?;
        let file_name = path.file_name().map(|name| name.to_string_lossy().into_owned());
        self.upload_csv(file, file_name.as_deref())
    }

    /// All contacts, newest first.
    pub fn list_contacts(&self) -> Result<Vec<Contact>> {
        self.db.list_contacts()
    }

    /// Upload batches, newest first.
    pub fn list_batches(&self) -> Result<Vec<BatchSummary>> {
        Ok(summarize_batches(&self.db.batch_rows()?))
    }

    /// First and last rows of a batch range plus its size.
    pub fn preview_range(&self, batch_id: &str, start: i64, end: i64) -> Result<RangePreview> {
        let batch_id = InputValidator::validate_preview_batch_id(batch_id)?;
        let range = RowRange::new(start, end)?;

        let selection = ContactSelection::batch_range(batch_id, range);
        let plan = plan_preview(&selection, self.config.campaign.preview_sample_size);
        let first = self.db.select_contacts(&plan.first)?;
        let last = self.db.select_contacts(&plan.last)?;
        let total = self.db.count_contacts(&plan.count)?;

        Ok(assemble_preview(batch_id, range, total, first, last))
    }

    /// Placeholders offered by the contacts of a batch.
    pub fn batch_placeholders(&self, batch_id: &str) -> Result<PlaceholderCatalog> {
        let batch_id = InputValidator::validate_placeholder_batch_id(batch_id)?;
        let query = ContactSelection::whole_batch(batch_id)
            .limited_query(self.config.ingest.placeholder_scan_limit, false);
        Ok(catalog_placeholders(&self.db.select_contacts(&query)?))
    }

    /// Delete a batch that no campaign targets.
    pub fn delete_batch(&self, batch_id: &str) -> Result<usize> {
        let result = InputValidator::validate_deletable_batch_id(batch_id).and_then(|id| self.db.delete_batch(id));
        if let Ok(deleted) = &result {
            info!(batch_id = %batch_id, deleted, "Deleted batch");
        }
        self.track("delete_batch", result)
    }

    // ----- campaigns -----

    /// Validate and store a new draft campaign.
    pub fn create_campaign(&self, request: NewCampaign) -> Result<CreatedCampaign> {
        let result = self.create_campaign_inner(request);
        self.track("create_campaign", result)
    }

    fn create_campaign_inner(&self, mut request: NewCampaign) -> Result<CreatedCampaign> {
        request.name = InputValidator::sanitize_text(&request.name);
        request.message = InputValidator::sanitize_text(&request.message);
        let draft = validate_new_campaign(request)?;

        let target_count = match &draft.targeting {
            Some(targeting) => {
                let selection = ContactSelection::batch_range(Some(&targeting.batch_id), targeting.range);
                let count = self.db.count_contacts(&selection.filters())?;
                if count == 0 {
                    return Err(CampaignError::validation(
                        "No contacts found for the selected batch and row range.",
                    ));
                }
                self.warn_unknown_placeholders(&draft.message, &targeting.batch_id)?;
                Some(count)
            }
            None => None,
        };

        let campaign = self.db.insert_campaign(&draft)?;
        info!(campaign_id = campaign.id, name = %campaign.name, ?target_count, "Created campaign");
        Ok(CreatedCampaign { campaign, target_count })
    }

    fn warn_unknown_placeholders(&self, template: &str, batch_id: &str) -> Result<()> {
        let query = ContactSelection::whole_batch(Some(batch_id))
            .limited_query(self.config.ingest.placeholder_scan_limit, false);
        let catalog = catalog_placeholders(&self.db.select_contacts(&query)?);
        for key in self.scanner.keys(template) {
            let known = STANDARD_PLACEHOLDERS.contains(&key) || catalog.placeholders.iter().any(|p| p.key == key);
            if !known {
                warn!(batch_id = %batch_id, placeholder = %key, "Template uses a placeholder no contact provides");
            }
        }
        Ok(())
    }

    /// Campaigns, newest first.
    pub fn list_campaigns(&self) -> Result<Vec<Campaign>> {
        self.db.list_campaigns()
    }

    /// Campaign by id.
    pub fn get_campaign(&self, campaign_id: i64) -> Result<Campaign> {
        self.require_campaign(campaign_id)
    }

    /// Edit a campaign; for active campaigns stored follow-ups are re-resolved.
    pub fn update_campaign(&self, campaign_id: i64, update: CampaignUpdate) -> Result<UpdatedCampaign> {
        let result = self.update_campaign_inner(campaign_id, update);
        self.track("update_campaign", result)
    }

    fn update_campaign_inner(&self, campaign_id: i64, update: CampaignUpdate) -> Result<UpdatedCampaign> {
        let campaign = self.require_campaign(campaign_id)?;
        let updated = apply_campaign_update(&campaign, update)?;
        self.db.update_campaign(&updated)?;

        let mut regenerated = 0;
        if updated.status == CampaignStatus::Active {
            let stored = self.db.stored_followups_with_contacts(campaign_id)?;
            let rewrites = regenerate_followups(&updated, &stored);
            regenerated = self.db.update_message_texts(&rewrites)?;
            self.metrics.record_regenerated(regenerated);
            info!(campaign_id, regenerated, "Re-resolved stored follow-ups");
        }

        Ok(UpdatedCampaign {
            campaign: updated,
            regenerated_followups: regenerated,
        })
    }

    /// Delete a campaign and its messages.
    pub fn delete_campaign(&self, campaign_id: i64) -> Result<()> {
        InputValidator::validate_campaign_id(campaign_id)?;
        if !self.db.delete_campaign(campaign_id)? {
            return Err(CampaignError::not_found(format!("Campaign {campaign_id} not found")));
        }
        info!(campaign_id, "Deleted campaign");
        Ok(())
    }

    /// Activate a draft: generate and store its messages, then deliver the
    /// initial ones one by one.
    pub async fn send_campaign(&self, campaign_id: i64, delay_seconds: Option<u64>) -> Result<SendReport> {
        let result = self.send_campaign_inner(campaign_id, delay_seconds).await;
        self.track("send_campaign", result)
    }

    async fn send_campaign_inner(&self, campaign_id: i64, delay_seconds: Option<u64>) -> Result<SendReport> {
        let timer = OperationTimer::new("send_campaign");
        let campaign = self.require_campaign(campaign_id)?;
        if campaign.status == CampaignStatus::Active {
            return Err(CampaignError::validation(format!("Campaign {campaign_id} is already active")));
        }
        let delay = self.delay(delay_seconds)?;

        let selection = ContactSelection::for_campaign(campaign.targeting.as_ref());
        let contacts = self.db.select_contacts(&selection.select_query())?;
        let generated = generate_campaign_messages(&campaign, &contacts);
        self.metrics.record_generated(campaign_id, generated.len());

        let existing = self.db.campaign_messages(campaign_id)?;
        let initial_writes = reconcile_messages(&existing, generated.initial);
        let followup_writes = reconcile_messages(&existing, generated.followups);
        if !self
            .db
            .activate_campaign(campaign_id, &initial_writes, &followup_writes, Utc::now().naive_utc())?
        {
            return Err(CampaignError::validation(format!("Campaign {campaign_id} is already active")));
        }
        info!(
            campaign_id,
            contacts = contacts.len(),
            followups = followup_writes.len(),
            "Campaign activated"
        );

        let outgoing = self.db.outgoing_messages(campaign_id, MessageType::Initial, true)?;
        let started = Instant::now();
        let delivery = self.dispatch(&outgoing, delay).await?;
        self.metrics
            .record_dispatch("initial", delivery.sent, delivery.failed, started.elapsed());
        timer.finish();

        let targeting = campaign.targeting.as_ref();
        Ok(SendReport {
            campaign_id,
            initial_count: initial_writes.len(),
            followup_count: followup_writes.len(),
            contact_batch_id: targeting.map(|t| t.batch_id.clone()),
            range_start: targeting.map(|t| t.range.start()),
            range_end: targeting.map(|t| t.range.end()),
            delivery,
        })
    }

    /// Deliver stored follow-up `number` to every contact that has not responded.
    pub async fn send_followup(&self, campaign_id: i64, number: i64, delay_seconds: Option<u64>) -> Result<FollowupReport> {
        let result = self.send_followup_inner(campaign_id, number, delay_seconds).await;
        self.track("send_followup", result)
    }

    async fn send_followup_inner(&self, campaign_id: i64, number: i64, delay_seconds: Option<u64>) -> Result<FollowupReport> {
        self.require_campaign(campaign_id)?;
        let message_type = MessageType::Followup(InputValidator::validate_followup_number(number)?);
        let delay = self.delay(delay_seconds)?;

        let outgoing = self.db.outgoing_messages(campaign_id, message_type, true)?;
        if outgoing.is_empty() {
            info!(campaign_id, %message_type, "No follow-up messages to send");
        }

        let started = Instant::now();
        let delivery = self.dispatch(&outgoing, delay).await?;
        self.metrics
            .record_dispatch(&message_type.to_string(), delivery.sent, delivery.failed, started.elapsed());

        Ok(FollowupReport {
            campaign_id,
            message_type,
            total: outgoing.len(),
            delivery,
        })
    }

    async fn dispatch(&self, outgoing: &[Outgoing], delay: Duration) -> Result<DispatchSummary> {
        dispatch_sequential(self.sender.as_ref(), outgoing, delay, |message, outcome| match outcome {
            Ok(()) => self
                .db
                .record_delivery(message.message_id, MessageStatus::Sent, Some(Utc::now().naive_utc())),
            Err(_) => self.db.record_delivery(message.message_id, MessageStatus::Failed, None),
        })
        .await
    }

    // ----- messages and responses -----

    /// Messages of a campaign with recipient details.
    pub fn campaign_messages(&self, campaign_id: i64) -> Result<Vec<CampaignMessageView>> {
        self.require_campaign(campaign_id)?;
        self.db.message_views(campaign_id)
    }

    /// Write a campaign's messages to `path`; returns how many were written.
    pub fn export_messages(&self, campaign_id: i64, format: OutputFormat, path: &Path) -> Result<usize> {
        InputValidator::validate_file_path(path)?;
        let views = self.campaign_messages(campaign_id)?;
        write_messages_to_file(&views, format, path)?;
        info!(campaign_id, path = %path.display(), count = views.len(), "Exported messages");
        Ok(views.len())
    }

    /// Delivery tallies per follow-up number.
    pub fn followup_status(&self, campaign_id: i64) -> Result<Vec<FollowupStatus>> {
        self.require_campaign(campaign_id)?;
        self.db.followup_status(campaign_id)
    }

    /// Mark a contact as responded so no further follow-ups reach it.
    pub fn mark_responded(&self, contact_id: i64) -> Result<()> {
        self.db.mark_responded(contact_id)
    }

    /// Remove a contact from all campaigns by phone number.
    pub fn remove_contact(&self, phone: &str) -> Result<usize> {
        let forms = InputValidator::removal_phone_forms(phone)?;
        let forms: Vec<&str> = forms.iter().map(String::as_str).collect();
        let removed = self.db.remove_by_phone(&forms, Utc::now().naive_utc())?;
        if removed == 0 {
            return Err(CampaignError::not_found("Contact not found"));
        }
        info!(removed, "Removed contact from all campaigns");
        Ok(removed)
    }

    /// Most recently removed contacts.
    pub fn removed_contacts(&self) -> Result<Vec<RemovedContact>> {
        self.db.removed_contacts(self.config.campaign.removed_list_limit)
    }

    /// Delete every message, campaign and contact.
    pub fn clear_all_data(&self) -> Result<ClearSummary> {
        let summary = self.db.clear_all_data()?;
        warn!(?summary, "Cleared all data");
        Ok(summary)
    }
}
