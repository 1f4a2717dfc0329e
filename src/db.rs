use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, Null, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::campaign::{CampaignDraft, MessageWrite};
use crate::delivery::Outgoing;
use crate::error::{CampaignError, Result};
use crate::models::{
    Campaign, CampaignMessage, CampaignMessageView, CampaignStatus, Contact, FilterType, FollowupStatus,
    MessageStatus, MessageType, NewContact, Operator, QueryBuilder, RemovedContact, RowRange, Targeting,
};
use crate::planner::BatchRow;
use crate::schema::{campaign_messages, campaigns, contacts};

// Type alias for the database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Number of rows removed by [`Database::clear_all_data`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClearSummary {
    /// Campaign messages deleted
    pub messages: usize,
    /// Campaigns deleted
    pub campaigns: usize,
    /// Contacts deleted
    pub contacts: usize,
}

/// Database manager for handling connections and operations
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (creating if needed) the database at `database_url` and run migrations.
    ///
    /// Accepts plain paths as well as `sqlite:` / `sqlite://` URLs. `:memory:`
    /// gets a single-connection pool so every caller sees the same database.
    pub fn new(database_url: &str, max_connections: u32, connection_timeout: Duration) -> Result<Self> {
        let path = strip_sqlite_scheme(database_url);

        let manager = if path == ":memory:" {
            SqliteConnectionManager::memory()
        } else {
            // Create parent directory if it doesn't exist
            if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            SqliteConnectionManager::file(path)
        };
        let manager = manager.with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));

        let max_size = if path == ":memory:" { 1 } else { max_connections.max(1) };
        let pool = Pool::builder()
            .max_size(max_size)
            .connection_timeout(connection_timeout)
            .build(manager)?;

        let conn = pool.get()?;
        Self::run_migrations(&conn)?;
        info!(database = %path, pool_size = max_size, "Database ready");

        Ok(Self { pool })
    }

    /// Run database migrations
    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(include_str!("../migrations/2026-09-01-000000_create_contacts/up.sql"))?;
        conn.execute_batch(include_str!("../migrations/2026-09-01-000001_create_campaigns/up.sql"))?;
        conn.execute_batch(include_str!("../migrations/2026-09-01-000002_add_indexes/up.sql"))?;
        Ok(())
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    // ----- contacts -----

    /// Insert a batch of contacts in one transaction.
    pub fn insert_contacts(&self, new_contacts: &[NewContact]) -> Result<usize> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                contacts::TABLE,
                contacts::PHONE,
                contacts::FIRST_NAME,
                contacts::COMPANY,
                contacts::CITY,
                contacts::USE_AI,
                contacts::USE_AI_TEXT,
                contacts::CUSTOM_FIELDS,
                contacts::UPLOAD_BATCH_ID,
                contacts::UPLOAD_FILE_NAME,
                contacts::BATCH_ROW_NUMBER,
                contacts::CREATED_AT,
            ))?;
            for contact in new_contacts {
                stmt.execute(params![
                    contact.phone,
                    contact.first_name,
                    contact.company,
                    contact.city,
                    contact.use_ai,
                    contact.use_ai_text,
                    serde_json::to_string(&contact.custom_fields)?,
                    contact.upload_batch_id,
                    contact.upload_file_name,
                    contact.batch_row_number,
                    Utc::now().naive_utc(),
                ])?;
            }
        }
        tx.commit()?;
        debug!(count = new_contacts.len(), "Inserted contacts");
        Ok(new_contacts.len())
    }

    /// All contacts, newest first.
    pub fn list_contacts(&self) -> Result<Vec<Contact>> {
        let mut query = QueryBuilder::new();
        query.set_order_by(format!("{} DESC, {} DESC", contacts::CREATED_AT, contacts::ID));
        self.select_contacts(&query)
    }

    /// Contacts matching `query`.
    pub fn select_contacts(&self, query: &QueryBuilder) -> Result<Vec<Contact>> {
        let conn = self.get_connection()?;
        let (sql, params) = render_query(&format!("SELECT * FROM {}", contacts::TABLE), query);

        let mut stmt = conn.prepare(&sql)?;
        let contact_iter = stmt.query_map(params_from_iter(params.iter()), Self::map_db_contact)?;

        let mut results = Vec::new();
        for contact in contact_iter {
            results.push(contact?);
        }
        Ok(results)
    }

    /// Number of contacts matching the filters of `query`.
    pub fn count_contacts(&self, query: &QueryBuilder) -> Result<usize> {
        let conn = self.get_connection()?;
        let (sql, params) = render_query(&format!("SELECT COUNT(*) FROM {}", contacts::TABLE), query);
        let count: i64 = conn.query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Contact by id.
    pub fn get_contact(&self, contact_id: i64) -> Result<Option<Contact>> {
        let conn = self.get_connection()?;
        let contact = conn
            .query_row(
                &format!("SELECT * FROM {} WHERE {} = ?", contacts::TABLE, contacts::ID),
                params![contact_id],
                Self::map_db_contact,
            )
            .optional()?;
        Ok(contact)
    }

    fn contacts_by_id(conn: &Connection, ids: &[i64]) -> Result<HashMap<i64, Contact>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM {} WHERE {} IN ({placeholders})",
            contacts::TABLE,
            contacts::ID
        ))?;
        let contact_iter = stmt.query_map(params_from_iter(ids.iter()), Self::map_db_contact)?;

        let mut results = HashMap::new();
        for contact in contact_iter {
            let contact = contact?;
            results.insert(contact.id, contact);
        }
        Ok(results)
    }

    /// Map a database row to a Contact
    fn map_db_contact(row: &Row<'_>) -> rusqlite::Result<Contact> {
        let JsonText(custom_fields) = row.get(contacts::CUSTOM_FIELDS)?;
        Ok(Contact {
            id: row.get(contacts::ID)?,
            phone: row.get(contacts::PHONE)?,
            first_name: row.get(contacts::FIRST_NAME)?,
            company: row.get(contacts::COMPANY)?,
            city: row.get(contacts::CITY)?,
            use_ai: row.get(contacts::USE_AI)?,
            use_ai_text: row.get(contacts::USE_AI_TEXT)?,
            custom_fields,
            upload_batch_id: row.get(contacts::UPLOAD_BATCH_ID)?,
            upload_file_name: row.get(contacts::UPLOAD_FILE_NAME)?,
            batch_row_number: row.get(contacts::BATCH_ROW_NUMBER)?,
            responded: row.get(contacts::RESPONDED)?,
            removed_at: row.get(contacts::REMOVED_AT)?,
            created_at: row.get(contacts::CREATED_AT)?,
        })
    }

    /// Mark a contact as responded.
    pub fn mark_responded(&self, contact_id: i64) -> Result<()> {
        let conn = self.get_connection()?;
        let updated = conn.execute(
            &format!("UPDATE {} SET {} = 1 WHERE {} = ?", contacts::TABLE, contacts::RESPONDED, contacts::ID),
            params![contact_id],
        )?;
        if updated == 0 {
            return Err(CampaignError::not_found(format!("Contact {contact_id} not found")));
        }
        Ok(())
    }

    /// Flag every contact whose phone equals one of `phones` as responded and removed.
    pub fn remove_by_phone(&self, phones: &[&str], removed_at: NaiveDateTime) -> Result<usize> {
        if phones.is_empty() {
            return Ok(0);
        }
        let conn = self.get_connection()?;
        let placeholders = vec!["?"; phones.len()].join(", ");
        let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(removed_at)];
        params.extend(phones.iter().map(|p| Box::new(p.to_string()) as Box<dyn ToSql>));

        let updated = conn.execute(
            &format!(
                "UPDATE {} SET {} = 1, {} = ? WHERE {} IN ({placeholders})",
                contacts::TABLE,
                contacts::RESPONDED,
                contacts::REMOVED_AT,
                contacts::PHONE
            ),
            params_from_iter(params.iter()),
        )?;
        Ok(updated)
    }

    /// Most recently removed contacts.
    pub fn removed_contacts(&self, limit: usize) -> Result<Vec<RemovedContact>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {phone}, {removed_at} FROM {table} WHERE {responded} = 1 AND {removed_at} IS NOT NULL \
             ORDER BY {removed_at} DESC LIMIT ?",
            phone = contacts::PHONE,
            removed_at = contacts::REMOVED_AT,
            table = contacts::TABLE,
            responded = contacts::RESPONDED,
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let removed_iter = stmt.query_map(params![limit], |row| {
            Ok(RemovedContact {
                phone: row.get(0)?,
                removed_at: row.get(1)?,
            })
        })?;

        let mut results = Vec::new();
        for removed in removed_iter {
            results.push(removed?);
        }
        Ok(results)
    }

    // ----- batches -----

    /// Batch columns of every contact in insertion order.
    pub fn batch_rows(&self) -> Result<Vec<BatchRow>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, {}, {}, {} FROM {} ORDER BY {} ASC, {} ASC",
            contacts::UPLOAD_BATCH_ID,
            contacts::UPLOAD_FILE_NAME,
            contacts::BATCH_ROW_NUMBER,
            contacts::CREATED_AT,
            contacts::TABLE,
            contacts::CREATED_AT,
            contacts::ID
        ))?;
        let row_iter = stmt.query_map(params![], |row| {
            Ok(BatchRow {
                batch_id: row.get(0)?,
                file_name: row.get(1)?,
                batch_row_number: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;

        let mut results = Vec::new();
        for row in row_iter {
            results.push(row?);
        }
        Ok(results)
    }

    /// Names of campaigns targeting `batch_id`.
    pub fn campaigns_using_batch(&self, batch_id: &str) -> Result<Vec<String>> {
        let conn = self.get_connection()?;
        Self::campaign_names_for_batch(&conn, batch_id)
    }

    fn campaign_names_for_batch(conn: &Connection, batch_id: &str) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE {} = ? ORDER BY {} ASC",
            campaigns::NAME,
            campaigns::TABLE,
            campaigns::CONTACT_BATCH_ID,
            campaigns::ID
        ))?;
        let name_iter = stmt.query_map(params![batch_id], |row| row.get::<_, String>(0))?;

        let mut names = Vec::new();
        for name in name_iter {
            names.push(name?);
        }
        Ok(names)
    }

    /// Delete every contact of `batch_id`.
    ///
    /// The existence check, the reference check and the delete share one
    /// transaction; a referenced batch is left untouched.
    pub fn delete_batch(&self, batch_id: &str) -> Result<usize> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;

        let count: i64 = tx.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE {} = ?", contacts::TABLE, contacts::UPLOAD_BATCH_ID),
            params![batch_id],
            |row| row.get(0),
        )?;
        if count == 0 {
            return Err(CampaignError::not_found(format!("Batch {batch_id} not found or already deleted")));
        }

        let campaign_names = Self::campaign_names_for_batch(&tx, batch_id)?;
        if !campaign_names.is_empty() {
            return Err(CampaignError::BatchInUse {
                batch_id: batch_id.to_string(),
                campaigns: campaign_names,
            });
        }

        let deleted = tx.execute(
            &format!("DELETE FROM {} WHERE {} = ?", contacts::TABLE, contacts::UPLOAD_BATCH_ID),
            params![batch_id],
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    // ----- campaigns -----

    /// Insert a draft campaign.
    pub fn insert_campaign(&self, draft: &CampaignDraft) -> Result<Campaign> {
        let conn = self.get_connection()?;
        let targeting = draft.targeting.as_ref();
        conn.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                campaigns::TABLE,
                campaigns::NAME,
                campaigns::MESSAGE,
                campaigns::FOLLOWUP_MESSAGES,
                campaigns::FOLLOWUP_COUNT,
                campaigns::STATUS,
                campaigns::CONTACT_BATCH_ID,
                campaigns::RANGE_START,
                campaigns::RANGE_END,
                campaigns::CREATED_AT,
            ),
            params![
                draft.name,
                draft.message,
                serde_json::to_string(&draft.followup_messages)?,
                draft.followup_count,
                CampaignStatus::Draft,
                targeting.map(|t| t.batch_id.as_str()),
                targeting.map(|t| t.range.start()),
                targeting.map(|t| t.range.end()),
                Utc::now().naive_utc(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        Self::load_campaign(&conn, id)?.ok_or_else(|| CampaignError::Other("Failed to retrieve campaign".into()))
    }

    /// Campaign by id.
    pub fn get_campaign(&self, campaign_id: i64) -> Result<Option<Campaign>> {
        let conn = self.get_connection()?;
        Self::load_campaign(&conn, campaign_id)
    }

    fn load_campaign(conn: &Connection, campaign_id: i64) -> Result<Option<Campaign>> {
        let campaign = conn
            .query_row(
                &format!("SELECT * FROM {} WHERE {} = ?", campaigns::TABLE, campaigns::ID),
                params![campaign_id],
                Self::map_db_campaign,
            )
            .optional()?;
        Ok(campaign)
    }

    /// All campaigns, newest first.
    pub fn list_campaigns(&self) -> Result<Vec<Campaign>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM {} ORDER BY {} DESC, {} DESC",
            campaigns::TABLE,
            campaigns::CREATED_AT,
            campaigns::ID
        ))?;
        let campaign_iter = stmt.query_map(params![], Self::map_db_campaign)?;

        let mut results = Vec::new();
        for campaign in campaign_iter {
            results.push(campaign?);
        }
        Ok(results)
    }

    /// Persist the editable fields of `campaign`.
    pub fn update_campaign(&self, campaign: &Campaign) -> Result<()> {
        let conn = self.get_connection()?;
        let updated = conn.execute(
            &format!(
                "UPDATE {} SET {} = ?, {} = ?, {} = ?, {} = ? WHERE {} = ?",
                campaigns::TABLE,
                campaigns::NAME,
                campaigns::MESSAGE,
                campaigns::FOLLOWUP_MESSAGES,
                campaigns::FOLLOWUP_COUNT,
                campaigns::ID
            ),
            params![
                campaign.name,
                campaign.message,
                serde_json::to_string(&campaign.followup_messages)?,
                campaign.followup_count,
                campaign.id,
            ],
        )?;
        if updated == 0 {
            return Err(CampaignError::not_found(format!("Campaign {} not found", campaign.id)));
        }
        Ok(())
    }

    /// Move a campaign from `from` to `to`; false if it was not in `from`.
    pub fn transition_campaign(&self, campaign_id: i64, from: CampaignStatus, to: CampaignStatus) -> Result<bool> {
        let conn = self.get_connection()?;
        let updated = conn.execute(
            &format!(
                "UPDATE {} SET {} = ? WHERE {} = ? AND {} = ?",
                campaigns::TABLE,
                campaigns::STATUS,
                campaigns::ID,
                campaigns::STATUS
            ),
            params![to, campaign_id, from],
        )?;
        Ok(updated > 0)
    }

    /// Delete a campaign; its messages go with it.
    pub fn delete_campaign(&self, campaign_id: i64) -> Result<bool> {
        let conn = self.get_connection()?;
        let deleted = conn.execute(
            &format!("DELETE FROM {} WHERE {} = ?", campaigns::TABLE, campaigns::ID),
            params![campaign_id],
        )?;
        Ok(deleted > 0)
    }

    /// Map a database row to a Campaign
    fn map_db_campaign(row: &Row<'_>) -> rusqlite::Result<Campaign> {
        let JsonText(followup_messages) = row.get(campaigns::FOLLOWUP_MESSAGES)?;
        let batch_id: Option<String> = row.get(campaigns::CONTACT_BATCH_ID)?;
        let range_start: Option<i64> = row.get(campaigns::RANGE_START)?;
        let range_end: Option<i64> = row.get(campaigns::RANGE_END)?;

        let targeting = match (batch_id, range_start, range_end) {
            (Some(batch_id), Some(start), Some(end)) => RowRange::new(start, end)
                .ok()
                .map(|range| Targeting { batch_id, range }),
            _ => None,
        };

        Ok(Campaign {
            id: row.get(campaigns::ID)?,
            name: row.get(campaigns::NAME)?,
            message: row.get(campaigns::MESSAGE)?,
            followup_messages,
            followup_count: row.get(campaigns::FOLLOWUP_COUNT)?,
            status: row.get(campaigns::STATUS)?,
            targeting,
            created_at: row.get(campaigns::CREATED_AT)?,
        })
    }

    // ----- campaign messages -----

    /// Apply reconciliation results for one campaign in a single transaction.
    ///
    /// Inserted messages start as `stored` with `scheduled_time`. Text updates
    /// only touch rows that are still `stored`. Returns the message ids in the
    /// order of `writes`.
    pub fn apply_message_writes(
        &self,
        campaign_id: i64,
        writes: &[MessageWrite],
        scheduled_time: Option<NaiveDateTime>,
    ) -> Result<Vec<i64>> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        let ids = Self::write_messages(&tx, campaign_id, writes, scheduled_time)?;
        tx.commit()?;
        Ok(ids)
    }

    /// Move a draft to `active` and store its generated messages atomically.
    ///
    /// Initial messages get `scheduled_time`, follow-ups none. Returns false,
    /// writing nothing, when the campaign was no longer a draft.
    pub fn activate_campaign(
        &self,
        campaign_id: i64,
        initial: &[MessageWrite],
        followups: &[MessageWrite],
        scheduled_time: NaiveDateTime,
    ) -> Result<bool> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        let updated = tx.execute(
            &format!(
                "UPDATE {} SET {} = ? WHERE {} = ? AND {} = ?",
                campaigns::TABLE,
                campaigns::STATUS,
                campaigns::ID,
                campaigns::STATUS
            ),
            params![CampaignStatus::Active, campaign_id, CampaignStatus::Draft],
        )?;
        if updated == 0 {
            return Ok(false);
        }
        Self::write_messages(&tx, campaign_id, initial, Some(scheduled_time))?;
        Self::write_messages(&tx, campaign_id, followups, None)?;
        tx.commit()?;
        Ok(true)
    }

    fn write_messages(
        tx: &Transaction<'_>,
        campaign_id: i64,
        writes: &[MessageWrite],
        scheduled_time: Option<NaiveDateTime>,
    ) -> Result<Vec<i64>> {
        let mut insert = tx.prepare(&format!(
            "INSERT INTO {} ({}, {}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?, ?)",
            campaign_messages::TABLE,
            campaign_messages::CAMPAIGN_ID,
            campaign_messages::CONTACT_ID,
            campaign_messages::MESSAGE_TYPE,
            campaign_messages::STATUS,
            campaign_messages::MESSAGE_TEXT,
            campaign_messages::SCHEDULED_TIME,
        ))?;
        let mut update = tx.prepare(&format!(
            "UPDATE {} SET {} = ? WHERE {} = ? AND {} = ?",
            campaign_messages::TABLE,
            campaign_messages::MESSAGE_TEXT,
            campaign_messages::ID,
            campaign_messages::STATUS
        ))?;

        let mut ids = Vec::with_capacity(writes.len());
        for write in writes {
            match write {
                MessageWrite::Insert(plan) => {
                    insert.execute(params![
                        campaign_id,
                        plan.contact_id,
                        plan.message_type,
                        MessageStatus::Stored,
                        plan.message_text,
                        scheduled_time,
                    ])?;
                    ids.push(tx.last_insert_rowid());
                }
                MessageWrite::UpdateText { id, message_text } => {
                    update.execute(params![message_text, id, MessageStatus::Stored])?;
                    ids.push(*id);
                }
                MessageWrite::Keep { id } => ids.push(*id),
            }
        }
        Ok(ids)
    }

    /// All messages of a campaign, by id.
    pub fn campaign_messages(&self, campaign_id: i64) -> Result<Vec<CampaignMessage>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM {} WHERE {} = ? ORDER BY {} ASC",
            campaign_messages::TABLE,
            campaign_messages::CAMPAIGN_ID,
            campaign_messages::ID
        ))?;
        let message_iter = stmt.query_map(params![campaign_id], Self::map_db_message)?;

        let mut results = Vec::new();
        for message in message_iter {
            results.push(message?);
        }
        Ok(results)
    }

    /// Rewrite the text of `stored` messages; returns how many changed.
    pub fn update_message_texts(&self, updates: &[(i64, String)]) -> Result<usize> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "UPDATE {} SET {} = ? WHERE {} = ? AND {} = ?",
                campaign_messages::TABLE,
                campaign_messages::MESSAGE_TEXT,
                campaign_messages::ID,
                campaign_messages::STATUS
            ))?;
            for (id, text) in updates {
                changed += stmt.execute(params![text, id, MessageStatus::Stored])?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }

    /// Stored follow-ups of a campaign together with their recipients.
    pub fn stored_followups_with_contacts(&self, campaign_id: i64) -> Result<Vec<(CampaignMessage, Contact)>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM {} WHERE {} = ? AND {} = ? AND {} LIKE 'followup_%' ORDER BY {} ASC",
            campaign_messages::TABLE,
            campaign_messages::CAMPAIGN_ID,
            campaign_messages::STATUS,
            campaign_messages::MESSAGE_TYPE,
            campaign_messages::ID
        ))?;
        let message_iter = stmt.query_map(params![campaign_id, MessageStatus::Stored], Self::map_db_message)?;

        let mut messages = Vec::new();
        for message in message_iter {
            messages.push(message?);
        }

        let ids: Vec<i64> = messages.iter().map(|m| m.contact_id).collect();
        let recipients = Self::contacts_by_id(&conn, &ids)?;
        Ok(messages
            .into_iter()
            .filter_map(|m| recipients.get(&m.contact_id).cloned().map(|c| (m, c)))
            .collect())
    }

    /// `stored` messages of one type ready for dispatch, in generation order.
    ///
    /// With `skip_responded`, messages whose contact has responded are left out.
    pub fn outgoing_messages(
        &self,
        campaign_id: i64,
        message_type: MessageType,
        skip_responded: bool,
    ) -> Result<Vec<Outgoing>> {
        let conn = self.get_connection()?;
        let responded_clause = if skip_responded {
            format!(" AND c.{} = 0", contacts::RESPONDED)
        } else {
            String::new()
        };
        let mut stmt = conn.prepare(&format!(
            "SELECT m.{}, c.{}, m.{} FROM {} m JOIN {} c ON c.{} = m.{} \
             WHERE m.{} = ? AND m.{} = ? AND m.{} = ?{responded_clause} ORDER BY m.{} ASC",
            campaign_messages::ID,
            contacts::PHONE,
            campaign_messages::MESSAGE_TEXT,
            campaign_messages::TABLE,
            contacts::TABLE,
            contacts::ID,
            campaign_messages::CONTACT_ID,
            campaign_messages::CAMPAIGN_ID,
            campaign_messages::MESSAGE_TYPE,
            campaign_messages::STATUS,
            campaign_messages::ID
        ))?;
        let outgoing_iter = stmt.query_map(params![campaign_id, message_type, MessageStatus::Stored], |row| {
            Ok(Outgoing {
                message_id: row.get(0)?,
                phone: row.get(1)?,
                text: row.get(2)?,
            })
        })?;

        let mut results = Vec::new();
        for outgoing in outgoing_iter {
            results.push(outgoing?);
        }
        Ok(results)
    }

    /// Record the outcome of one delivery attempt.
    pub fn record_delivery(&self, message_id: i64, status: MessageStatus, sent_time: Option<NaiveDateTime>) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute(
            &format!(
                "UPDATE {} SET {} = ?, {} = COALESCE(?, {}) WHERE {} = ?",
                campaign_messages::TABLE,
                campaign_messages::STATUS,
                campaign_messages::SENT_TIME,
                campaign_messages::SENT_TIME,
                campaign_messages::ID
            ),
            params![status, sent_time, message_id],
        )?;
        Ok(())
    }

    /// Messages of a campaign with recipient details, unscheduled first.
    pub fn message_views(&self, campaign_id: i64) -> Result<Vec<CampaignMessageView>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT m.*, c.{phone}, c.{first_name}, c.{company} FROM {messages} m \
             JOIN {contacts} c ON c.{contact_pk} = m.{contact_id} \
             WHERE m.{campaign_id} = ? ORDER BY m.{scheduled} ASC, m.{id} ASC",
            phone = contacts::PHONE,
            first_name = contacts::FIRST_NAME,
            company = contacts::COMPANY,
            messages = campaign_messages::TABLE,
            contacts = contacts::TABLE,
            contact_pk = contacts::ID,
            contact_id = campaign_messages::CONTACT_ID,
            campaign_id = campaign_messages::CAMPAIGN_ID,
            scheduled = campaign_messages::SCHEDULED_TIME,
            id = campaign_messages::ID,
        ))?;
        let view_iter = stmt.query_map(params![campaign_id], |row| {
            Ok(CampaignMessageView {
                message: Self::map_db_message(row)?,
                phone: row.get(contacts::PHONE)?,
                first_name: row.get(contacts::FIRST_NAME)?,
                company: row.get(contacts::COMPANY)?,
            })
        })?;

        let mut results = Vec::new();
        for view in view_iter {
            results.push(view?);
        }
        Ok(results)
    }

    /// Per follow-up number delivery tallies, ordered by follow-up number.
    pub fn followup_status(&self, campaign_id: i64) -> Result<Vec<FollowupStatus>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {kind}, {status}, COUNT(*) FROM {table} \
             WHERE {campaign} = ? AND {kind} LIKE 'followup_%' GROUP BY {kind}, {status}",
            kind = campaign_messages::MESSAGE_TYPE,
            status = campaign_messages::STATUS,
            table = campaign_messages::TABLE,
            campaign = campaign_messages::CAMPAIGN_ID,
        ))?;
        let count_iter = stmt.query_map(params![campaign_id], |row| {
            Ok((
                row.get::<_, MessageType>(0)?,
                row.get::<_, MessageStatus>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut by_type: BTreeMap<MessageType, FollowupStatus> = BTreeMap::new();
        for counts in count_iter {
            let (message_type, status, count) = counts?;
            let count = usize::try_from(count).unwrap_or_default();
            let entry = by_type.entry(message_type).or_insert(FollowupStatus {
                message_type,
                total: 0,
                stored: 0,
                sent: 0,
                failed: 0,
            });
            entry.total += count;
            match status {
                MessageStatus::Stored => entry.stored += count,
                MessageStatus::Sent => entry.sent += count,
                MessageStatus::Failed => entry.failed += count,
            }
        }
        Ok(by_type.into_values().collect())
    }

    /// Map a database row to a CampaignMessage
    fn map_db_message(row: &Row<'_>) -> rusqlite::Result<CampaignMessage> {
        Ok(CampaignMessage {
            id: row.get(campaign_messages::ID)?,
            campaign_id: row.get(campaign_messages::CAMPAIGN_ID)?,
            contact_id: row.get(campaign_messages::CONTACT_ID)?,
            message_type: row.get(campaign_messages::MESSAGE_TYPE)?,
            status: row.get(campaign_messages::STATUS)?,
            message_text: row.get(campaign_messages::MESSAGE_TEXT)?,
            scheduled_time: row.get(campaign_messages::SCHEDULED_TIME)?,
            sent_time: row.get(campaign_messages::SENT_TIME)?,
        })
    }

    /// Delete every message, campaign and contact.
    pub fn clear_all_data(&self) -> Result<ClearSummary> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        let summary = ClearSummary {
            messages: tx.execute(&format!("DELETE FROM {}", campaign_messages::TABLE), params![])?,
            campaigns: tx.execute(&format!("DELETE FROM {}", campaigns::TABLE), params![])?,
            contacts: tx.execute(&format!("DELETE FROM {}", contacts::TABLE), params![])?,
        };
        tx.commit()?;
        Ok(summary)
    }
}

/// Strip a `sqlite:` or `sqlite://` scheme from a database URL.
#[must_use]
pub fn strip_sqlite_scheme(database_url: &str) -> &str {
    database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url)
}

fn operator_sql(operator: Operator) -> &'static str {
    match operator {
        Operator::Equal => "=",
        Operator::GreaterThanOrEqual => ">=",
        Operator::LessThanOrEqual => "<=",
    }
}

/// Append the WHERE / ORDER BY / LIMIT clauses of `query` to `base`.
fn render_query(base: &str, query: &QueryBuilder) -> (String, Vec<Box<dyn ToSql>>) {
    let mut sql = String::from(base);
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    for (index, filter) in query.filters.iter().enumerate() {
        sql.push_str(if index == 0 { " WHERE " } else { " AND " });
        match (&filter.operator, &filter.value) {
            (Operator::Equal, FilterType::Null) => sql.push_str(&format!("{} IS NULL", filter.field)),
            (operator, value) => {
                sql.push_str(&format!("{} {} ?", filter.field, operator_sql(*operator)));
                params.push(match value {
                    FilterType::Text(text) => Box::new(text.clone()),
                    FilterType::Integer(number) => Box::new(*number),
                    FilterType::Boolean(flag) => Box::new(*flag),
                    FilterType::Null => Box::new(Null),
                });
            }
        }
    }

    if let Some(order_by) = &query.order_by {
        sql.push_str(&format!(" ORDER BY {order_by}"));
    }
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    (sql, params)
}

/// JSON text column decoded at the storage boundary.
struct JsonText<T>(T);

impl<T: DeserializeOwned> FromSql for JsonText<T> {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        serde_json::from_str(value.as_str()?)
            .map(JsonText)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

fn parse_column<T>(value: ValueRef<'_>) -> FromSqlResult<T>
where
    T: std::str::FromStr<Err = CampaignError>,
{
    value.as_str()?.parse().map_err(|e: CampaignError| FromSqlError::Other(Box::new(e)))
}

impl ToSql for MessageType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for MessageType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_column(value)
    }
}

impl ToSql for MessageStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for MessageStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_column(value)
    }
}

impl ToSql for CampaignStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for CampaignStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_column(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Filter;

    #[test]
    fn test_strip_sqlite_scheme() {
        assert_eq!(strip_sqlite_scheme("sqlite:data/app.db"), "data/app.db");
        assert_eq!(strip_sqlite_scheme("sqlite:///tmp/app.db"), "/tmp/app.db");
        assert_eq!(strip_sqlite_scheme("data/app.db"), "data/app.db");
    }

    #[test]
    fn test_render_query_null_and_range_filters() {
        let mut query = QueryBuilder::new();
        query.add_filter(Filter {
            field: "upload_batch_id".to_string(),
            operator: Operator::Equal,
            value: FilterType::Null,
        });
        query.add_filter(Filter {
            field: "batch_row_number".to_string(),
            operator: Operator::GreaterThanOrEqual,
            value: FilterType::Integer(3),
        });
        query.set_order_by("batch_row_number ASC".to_string());
        query.set_limit(3);

        let (sql, params) = render_query("SELECT * FROM contacts", &query);
        assert_eq!(
            sql,
            "SELECT * FROM contacts WHERE upload_batch_id IS NULL AND batch_row_number >= ? \
             ORDER BY batch_row_number ASC LIMIT 3"
        );
        assert_eq!(params.len(), 1);
    }
}
