//! In-memory catalog of one loaded model with a memoized search projection.

use std::collections::HashMap;

use crate::catalog::stats::{count_levels, LevelCount};
use crate::model::{ColumnRecord, Shape};

// Joins field projections so a term never matches across two fields
const FIELD_SEPARATOR: &str = "\u{1f}";

#[derive(Debug, Clone)]
struct IndexedColumn {
    record: ColumnRecord,
    /// Lowercased name, shape label, level and material.
    haystack: String,
}

impl IndexedColumn {
    fn new(record: ColumnRecord) -> Self {
        let haystack = [
            record.name(),
            record.shape().source_label(),
            record.level(),
            record.material(),
        ]
        .join(FIELD_SEPARATOR)
        .to_lowercase();

        Self { record, haystack }
    }
}

/// Conjunctive filter over the catalog. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnFilter {
    /// Case-insensitive substring over name, shape label, level and material.
    pub term: String,
    /// Exact level; `Some("")` selects records without a level.
    pub level: Option<String>,
    pub shape: Option<Shape>,
}

impl ColumnFilter {
    #[must_use]
    pub fn term(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    #[must_use]
    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = Some(shape);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.term.trim().is_empty() && self.level.is_none() && self.shape.is_none()
    }
}

/// Ordered records of one model plus derived lookups.
///
/// The sequence and its index are replaced together by [`Catalog::load`];
/// there is no record-level mutation.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<IndexedColumn>,
    by_id: HashMap<String, usize>,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_records(records: Vec<ColumnRecord>) -> Self {
        let mut catalog = Self::new();
        catalog.load(records);
        catalog
    }

    /// Replaces the whole catalog and rebuilds its search projection.
    pub fn load(&mut self, records: Vec<ColumnRecord>) {
        self.entries = records.into_iter().map(IndexedColumn::new).collect();
        self.by_id = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.record.id().to_string(), position))
            .collect();
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All records in insertion order.
    pub fn all(&self) -> impl ExactSizeIterator<Item = &ColumnRecord> + '_ {
        self.entries.iter().map(|entry| &entry.record)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ColumnRecord> {
        self.by_id.get(id).map(|&position| &self.entries[position].record)
    }

    /// Records whose name, shape label, level or material contains `term`,
    /// ignoring case. An empty term returns the full catalog.
    #[must_use]
    pub fn search(&self, term: &str) -> Vec<&ColumnRecord> {
        self.filter(&ColumnFilter::term(term))
    }

    #[must_use]
    pub fn filter(&self, filter: &ColumnFilter) -> Vec<&ColumnRecord> {
        let needle = filter.term.trim().to_lowercase();

        self.entries
            .iter()
            .filter(|entry| needle.is_empty() || entry.haystack.contains(&needle))
            .filter(|entry| {
                filter
                    .level
                    .as_deref()
                    .is_none_or(|level| entry.record.level() == level)
            })
            .filter(|entry| filter.shape.is_none_or(|shape| entry.record.shape() == shape))
            .map(|entry| &entry.record)
            .collect()
    }

    /// Distinct levels in first-seen order with their record counts.
    #[must_use]
    pub fn levels(&self) -> Vec<LevelCount> {
        count_levels(self.all())
    }
}
