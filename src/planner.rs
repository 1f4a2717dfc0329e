//! Batch and row-range contact selection.
//!
//! Selections are turned into [`QueryBuilder`]s for the store; the planner
//! itself never touches the database. Previews are two bounded queries (first
//! and last `k` rows) plus a count, so a large range is never materialized.

use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::models::{
    BatchSummary, Contact, Filter, FilterType, Operator, QueryBuilder, RangePreview, RowRange, Targeting,
};
use crate::schema::contacts;

/// Label used for contacts that predate upload batches.
pub const LEGACY_BATCH_LABEL: &str = "All Contacts";

/// Which contacts a selection draws from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactScope {
    /// One upload batch
    Batch(String),
    /// Contacts without a batch id
    Legacy,
    /// Every contact
    All,
}

/// A filter over the contact store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactSelection {
    /// Source set
    pub scope: ContactScope,
    /// Optional inclusive row window
    pub range: Option<RowRange>,
    /// Skip contacts that already responded
    pub exclude_responded: bool,
}

impl ContactSelection {
    /// Targets of a campaign: its batch and range, or every contact.
    #[must_use]
    pub fn for_campaign(targeting: Option<&Targeting>) -> Self {
        targeting.map_or(
            Self {
                scope: ContactScope::All,
                range: None,
                exclude_responded: true,
            },
            |t| Self {
                scope: ContactScope::Batch(t.batch_id.clone()),
                range: Some(t.range),
                exclude_responded: true,
            },
        )
    }

    /// Unresponded contacts of a batch (or the legacy set) inside `range`.
    #[must_use]
    pub fn batch_range(batch_id: Option<&str>, range: RowRange) -> Self {
        Self {
            scope: Self::scope_for(batch_id),
            range: Some(range),
            exclude_responded: true,
        }
    }

    /// Every contact of a batch (or the legacy set), responded or not.
    #[must_use]
    pub fn whole_batch(batch_id: Option<&str>) -> Self {
        Self {
            scope: Self::scope_for(batch_id),
            range: None,
            exclude_responded: false,
        }
    }

    fn scope_for(batch_id: Option<&str>) -> ContactScope {
        batch_id.map_or(ContactScope::Legacy, |id| ContactScope::Batch(id.to_string()))
    }

    /// True when rows are ordered by their batch row number.
    #[must_use]
    pub const fn orders_by_row(&self) -> bool {
        matches!(self.scope, ContactScope::Batch(_)) || self.range.is_some()
    }

    /// Ordering clause; row number for batches and ranges, else insertion order.
    #[must_use]
    pub fn order_clause(&self, descending: bool) -> String {
        let direction = if descending { "DESC" } else { "ASC" };
        if self.orders_by_row() {
            format!("{} {direction}, {} {direction}", contacts::BATCH_ROW_NUMBER, contacts::ID)
        } else {
            format!("{} {direction}, {} {direction}", contacts::CREATED_AT, contacts::ID)
        }
    }

    /// Filters only, no ordering or limit.
    #[must_use]
    pub fn filters(&self) -> QueryBuilder {
        let mut query = QueryBuilder::new();
        match &self.scope {
            ContactScope::Batch(id) => query.add_filter(Filter {
                field: contacts::UPLOAD_BATCH_ID.to_string(),
                operator: Operator::Equal,
                value: FilterType::Text(id.clone()),
            }),
            ContactScope::Legacy => query.add_filter(Filter {
                field: contacts::UPLOAD_BATCH_ID.to_string(),
                operator: Operator::Equal,
                value: FilterType::Null,
            }),
            ContactScope::All => {}
        }
        if let Some(range) = self.range {
            query.add_filter(Filter {
                field: contacts::BATCH_ROW_NUMBER.to_string(),
                operator: Operator::GreaterThanOrEqual,
                value: FilterType::Integer(i64::from(range.start())),
            });
            query.add_filter(Filter {
                field: contacts::BATCH_ROW_NUMBER.to_string(),
                operator: Operator::LessThanOrEqual,
                value: FilterType::Integer(i64::from(range.end())),
            });
        }
        if self.exclude_responded {
            query.add_filter(Filter {
                field: contacts::RESPONDED.to_string(),
                operator: Operator::Equal,
                value: FilterType::Boolean(false),
            });
        }
        query
    }

    /// Full, ordered select.
    #[must_use]
    pub fn select_query(&self) -> QueryBuilder {
        let mut query = self.filters();
        query.set_order_by(self.order_clause(false));
        query
    }

    /// Select of at most `limit` rows from one end of the selection.
    #[must_use]
    pub fn limited_query(&self, limit: usize, descending: bool) -> QueryBuilder {
        let mut query = self.filters();
        query.set_order_by(self.order_clause(descending));
        query.set_limit(limit);
        query
    }
}

/// The three queries behind a range preview.
#[derive(Debug)]
pub struct PreviewPlan {
    /// Lowest `k` rows, ascending
    pub first: QueryBuilder,
    /// Highest `k` rows, descending
    pub last: QueryBuilder,
    /// Filters for the count
    pub count: QueryBuilder,
}

/// Plan a preview of `range` with `sample_size` rows from each end.
#[must_use]
pub fn plan_preview(selection: &ContactSelection, sample_size: usize) -> PreviewPlan {
    PreviewPlan {
        first: selection.limited_query(sample_size, false),
        last: selection.limited_query(sample_size, true),
        count: selection.filters(),
    }
}

/// Put the preview query results together; `last_desc` comes back highest
/// row first and is flipped to ascending.
#[must_use]
pub fn assemble_preview(
    batch_id: Option<&str>,
    range: RowRange,
    total_in_range: usize,
    first_samples: Vec<Contact>,
    mut last_desc: Vec<Contact>,
) -> RangePreview {
    last_desc.reverse();
    RangePreview {
        batch_id: batch_id.map(ToString::to_string),
        start: range.start(),
        end: range.end(),
        total_in_range,
        first_samples,
        last_samples: last_desc,
    }
}

/// The columns of a contact that batch summaries need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRow {
    /// Batch id, `None` for legacy contacts
    pub batch_id: Option<String>,
    /// Source file name
    pub file_name: Option<String>,
    /// Stored row number
    pub batch_row_number: Option<u32>,
    /// Insertion time
    pub created_at: NaiveDateTime,
}

#[derive(Debug)]
struct BatchAccumulator {
    summary: BatchSummary,
    dynamic_rows: u32,
}

impl BatchAccumulator {
    fn new(row: &BatchRow) -> Self {
        let fallback = if row.batch_id.is_some() { "Upload" } else { LEGACY_BATCH_LABEL };
        Self {
            summary: BatchSummary {
                batch_id: row.batch_id.clone(),
                label: String::new(),
                file_name: row.file_name.clone().unwrap_or_else(|| fallback.to_string()),
                total_contacts: 0,
                min_row: u32::MAX,
                max_row: 0,
                has_row_numbers: true,
                created_at: Some(row.created_at),
            },
            dynamic_rows: 0,
        }
    }

    fn add(&mut self, row: &BatchRow) {
        let number = row.batch_row_number.unwrap_or_else(|| {
            self.dynamic_rows += 1;
            self.summary.has_row_numbers = false;
            self.dynamic_rows
        });
        let summary = &mut self.summary;
        summary.total_contacts += 1;
        summary.min_row = summary.min_row.min(number);
        summary.max_row = summary.max_row.max(number);
        if summary.created_at.is_none_or(|earliest| row.created_at < earliest) {
            summary.created_at = Some(row.created_at);
        }
    }

    fn finish(mut self) -> BatchSummary {
        let summary = &mut self.summary;
        if summary.total_contacts == 0 {
            summary.min_row = 0;
        }
        summary.label = format!("{} ({} contacts)", summary.file_name, summary.total_contacts);
        self.summary
    }
}

/// Derive batch summaries from contact rows given in insertion order.
///
/// Legacy contacts collapse into one batch; rows without a stored number get
/// sequential ones in the order they were inserted. Newest batch first.
#[must_use]
pub fn summarize_batches(rows: &[BatchRow]) -> Vec<BatchSummary> {
    let mut order: Vec<Option<String>> = Vec::new();
    let mut batches: HashMap<Option<String>, BatchAccumulator> = HashMap::new();

    for row in rows {
        let batch = batches.entry(row.batch_id.clone()).or_insert_with(|| {
            order.push(row.batch_id.clone());
            BatchAccumulator::new(row)
        });
        batch.add(row);
    }

    let mut summaries: Vec<BatchSummary> = order
        .into_iter()
        .filter_map(|key| batches.remove(&key))
        .map(BatchAccumulator::finish)
        .collect();
    summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_campaign_without_targeting_selects_everyone_by_insertion() {
        let selection = ContactSelection::for_campaign(None);
        assert_eq!(selection.scope, ContactScope::All);
        assert_eq!(selection.order_clause(false), "created_at ASC, id ASC");
        assert_eq!(selection.filters().filters.len(), 1);
    }

    #[test]
    fn test_batch_range_filters_and_orders_by_row() {
        let range = RowRange::new(3, 7).unwrap();
        let query = ContactSelection::batch_range(Some("batch_1"), range).select_query();
        assert_eq!(query.filters.len(), 4);
        assert_eq!(query.order_by.as_deref(), Some("batch_row_number ASC, id ASC"));
    }

    #[test]
    fn test_legacy_scope_filters_null_batch() {
        let query = ContactSelection::whole_batch(None).filters();
        assert_eq!(query.filters[0].value, FilterType::Null);
    }
}
