//! Query façade: the API the presentation layer talks to.
//!
//! A loaded model lives in an immutable [`CatalogSnapshot`] behind an
//! `RwLock<Arc<_>>`. Loads build a complete snapshot off to the side and swap
//! the handle in one step, so readers see either the previous catalog or the
//! new one in full.
//!
//! Every load takes a [`LoadTicket`] when it is submitted. Tokens increase
//! monotonically and only the most recently issued ticket may commit; a load
//! that finishes after a newer one was submitted is discarded with
//! [`IngestionError::Superseded`].

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use crate::catalog::{summarize, Catalog, ColumnFilter, LevelCount, Stats};
use crate::error::{IngestionError, MalformedRecordError};
use crate::model::ColumnRecord;
use crate::parser::{self, Format};

/// Which records [`ColumnCatalog::stats`] summarizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    /// Records matching the current filter.
    Filtered,
}

/// Submission order of a load. Only the latest ticket may commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LoadTicket {
    token: u64,
}

impl LoadTicket {
    #[must_use]
    pub fn token(self) -> u64 {
        self.token
    }
}

/// Outcome of a committed load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSummary {
    pub record_count: usize,
    pub warnings: Vec<MalformedRecordError>,
    /// Token of the load that produced the current catalog.
    pub generation: u64,
}

/// One fully built catalog. Never mutated after publication.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    catalog: Catalog,
    generation: u64,
}

impl CatalogSnapshot {
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Token of the load that built this snapshot, 0 for the initial empty one.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Column catalog of the currently loaded model.
///
/// `Send + Sync`; share it behind an `Arc` when loads run on worker threads.
#[derive(Debug, Default)]
pub struct ColumnCatalog {
    current: RwLock<Arc<CatalogSnapshot>>,
    issued: AtomicU64,
    filter: RwLock<ColumnFilter>,
}

impl ColumnCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a payload and replaces the catalog.
    ///
    /// `declared_format` is a format name, file extension or content type.
    /// On error the previous catalog is left untouched.
    ///
    /// # Example
    ///
    /// ```
    /// use column_catalog::engine::{ColumnCatalog, Scope};
    ///
    /// let catalog = ColumnCatalog::new();
    /// let payload = r#"[{"name":"C1","type":"Круглая","height":3000}]"#.as_bytes();
    /// let summary = catalog.load_model(payload, "json")?;
    /// assert_eq!(summary.record_count, 1);
    /// assert_eq!(catalog.stats(Scope::All).total, 1);
    /// # Ok::<(), column_catalog::error::IngestionError>(())
    /// ```
    pub fn load_model(
        &self,
        payload: &[u8],
        declared_format: &str,
    ) -> Result<LoadSummary, IngestionError> {
        let format: Format = declared_format.parse()?;
        self.finish_load(self.begin_load(), payload, format)
    }

    /// Reads a file and loads it, detecting the format from its extension
    /// unless `format` is given.
    pub fn load_path<P: AsRef<Path>>(
        &self,
        path: P,
        format: Option<Format>,
    ) -> Result<LoadSummary, IngestionError> {
        let path = path.as_ref();
        let format = match format {
            Some(format) => format,
            None => Format::from_path(path)?,
        };
        let payload = std::fs::read(path).map_err(|source| IngestionError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        self.finish_load(self.begin_load(), &payload, format)
    }

    /// Registers a new load. Any load holding an older ticket can no longer
    /// commit.
    pub fn begin_load(&self) -> LoadTicket {
        LoadTicket {
            token: self.issued.fetch_add(1, Ordering::SeqCst) + 1,
        }
    }

    /// Parses `payload` and commits it if `ticket` is still the latest.
    pub fn finish_load(
        &self,
        ticket: LoadTicket,
        payload: &[u8],
        format: Format,
    ) -> Result<LoadSummary, IngestionError> {
        self.ensure_latest(ticket)?;

        let outcome = parser::parse(payload, format)?;
        let record_count = outcome.records.len();
        let snapshot = Arc::new(CatalogSnapshot {
            catalog: Catalog::from_records(outcome.records),
            generation: ticket.token,
        });

        {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            // Re-check under the lock: a newer load may have been submitted
            // while this one was parsing.
            self.ensure_latest(ticket)?;
            *current = snapshot;
        }

        tracing::info!(
            token = ticket.token,
            %format,
            records = record_count,
            warnings = outcome.warnings.len(),
            "catalog loaded"
        );

        Ok(LoadSummary {
            record_count,
            warnings: outcome.warnings,
            generation: ticket.token,
        })
    }

    /// Runs a load on a background thread. The ticket is taken before the
    /// thread starts, so submission order decides which load wins.
    pub fn spawn_load(
        self: &Arc<Self>,
        payload: Vec<u8>,
        format: Format,
    ) -> JoinHandle<Result<LoadSummary, IngestionError>> {
        let ticket = self.begin_load();
        let engine = Arc::clone(self);
        thread::spawn(move || engine.finish_load(ticket, &payload, format))
    }

    fn ensure_latest(&self, ticket: LoadTicket) -> Result<(), IngestionError> {
        let latest = self.issued.load(Ordering::SeqCst);
        if ticket.token == latest {
            Ok(())
        } else {
            tracing::warn!(token = ticket.token, latest, "discarding superseded load");
            Err(IngestionError::Superseded {
                token: ticket.token,
                latest,
            })
        }
    }

    /// The catalog as currently published. Holding it pins that version.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Sets the current filter to `term` alone and returns the matches.
    pub fn search(&self, term: &str) -> Vec<ColumnRecord> {
        self.set_filter(ColumnFilter::term(term))
    }

    /// Replaces the current filter and returns the matches.
    pub fn set_filter(&self, filter: ColumnFilter) -> Vec<ColumnRecord> {
        let snapshot = self.snapshot();
        let matches = snapshot
            .catalog
            .filter(&filter)
            .into_iter()
            .cloned()
            .collect();
        *self.filter.write().unwrap_or_else(PoisonError::into_inner) = filter;
        matches
    }

    #[must_use]
    pub fn filter(&self) -> ColumnFilter {
        self.filter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn stats(&self, scope: Scope) -> Stats {
        let snapshot = self.snapshot();
        match scope {
            Scope::All => summarize(snapshot.catalog.all()),
            Scope::Filtered => summarize(snapshot.catalog.filter(&self.filter())),
        }
    }

    #[must_use]
    pub fn all(&self) -> Vec<ColumnRecord> {
        self.snapshot().catalog.all().cloned().collect()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.snapshot().catalog.count()
    }

    #[must_use]
    pub fn levels(&self) -> Vec<LevelCount> {
        self.snapshot().catalog.levels()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Shape;
    use pretty_assertions::assert_eq;

    const TWO: &[u8] = r#"[
        {"name":"A","type":"Прямоугольная","level":"L1","height":3500},
        {"name":"B","type":"Круглая","level":"L2","height":3200}
    ]"#.as_bytes();
    const THREE: &[u8] = br#"[
        {"name":"X","height":3000},
        {"name":"Y","height":3000},
        {"name":"Z","height":3000}
    ]"#;

    #[test]
    fn starts_empty() {
        let engine = ColumnCatalog::new();
        assert_eq!(engine.count(), 0);
        assert_eq!(engine.generation(), 0);
        assert!(engine.search("").is_empty());
        let stats = engine.stats(Scope::All);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.average_height, 0.0);
    }

    #[test]
    fn failed_load_keeps_previous_catalog() {
        let engine = ColumnCatalog::new();
        engine.load_model(TWO, "json").unwrap();

        assert!(matches!(
            engine.load_model(b"[{", "json"),
            Err(IngestionError::Parse { .. })
        ));
        assert!(matches!(
            engine.load_model(TWO, "csv"),
            Err(IngestionError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            engine.load_model(br#"[{"name":"bad","height":-10}]"#, "json"),
            Err(IngestionError::EmptyResult { .. })
        ));

        assert_eq!(engine.count(), 2);
        assert_eq!(engine.all()[1].name(), "B");
    }

    #[test]
    fn newer_load_replaces_catalog_wholesale() {
        let engine = ColumnCatalog::new();
        engine.load_model(TWO, "json").unwrap();
        let summary = engine.load_model(THREE, "application/json").unwrap();

        assert_eq!(summary.record_count, 3);
        assert_eq!(engine.count(), 3);
        assert!(engine.search("круглая").is_empty());
        assert_eq!(engine.generation(), summary.generation);
    }

    #[test]
    fn stale_load_finishing_last_is_discarded() {
        let engine = ColumnCatalog::new();
        let slow = engine.begin_load();
        let fast = engine.begin_load();

        let summary = engine.finish_load(fast, TWO, Format::Json).unwrap();
        assert_eq!(summary.generation, fast.token());

        let err = engine.finish_load(slow, THREE, Format::Json).unwrap_err();
        match err {
            IngestionError::Superseded { token, latest } => {
                assert_eq!(token, slow.token());
                assert_eq!(latest, fast.token());
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(engine.count(), 2);
        assert_eq!(engine.generation(), fast.token());
    }

    #[test]
    fn stale_load_finishing_first_is_discarded() {
        let engine = ColumnCatalog::new();
        let older = engine.begin_load();
        let newer = engine.begin_load();

        assert!(matches!(
            engine.finish_load(older, THREE, Format::Json),
            Err(IngestionError::Superseded { .. })
        ));
        assert_eq!(engine.count(), 0);

        engine.finish_load(newer, TWO, Format::Json).unwrap();
        assert_eq!(engine.count(), 2);
    }

    #[test]
    fn filtered_stats_follow_current_search() {
        let engine = ColumnCatalog::new();
        engine.load_model(TWO, "json").unwrap();

        let matches = engine.search("круглая");
        assert_eq!(matches.len(), 1);

        let filtered = engine.stats(Scope::Filtered);
        assert_eq!(filtered.total, 1);
        assert_eq!(filtered.count(Shape::Circular), 1);
        assert_eq!(filtered.average_height, 3200.0);
        assert_eq!(engine.stats(Scope::All).total, engine.count());

        engine.set_filter(ColumnFilter::default().with_level("L1"));
        assert_eq!(engine.stats(Scope::Filtered).count(Shape::Rectangular), 1);
    }

    #[test]
    fn readers_never_observe_partial_catalog() {
        let engine = Arc::new(ColumnCatalog::new());
        engine.load_model(TWO, "json").unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let snapshot = engine.snapshot();
                        let count = snapshot.catalog().count();
                        assert!(count == 2 || count == 3, "observed {count} records");
                        let stats = summarize(snapshot.catalog().all());
                        assert_eq!(stats.total, count);
                    }
                })
            })
            .collect();

        for i in 0..50 {
            let payload = if i % 2 == 0 { THREE } else { TWO };
            engine.load_model(payload, "json").unwrap();
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[test]
    fn background_loads_end_with_last_submitted() {
        let engine = Arc::new(ColumnCatalog::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let payload = if i == 7 { TWO } else { THREE };
                engine.spawn_load(payload.to_vec(), Format::Json)
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let last = results.last().unwrap().as_ref().unwrap();
        assert_eq!(last.generation, 8);
        for result in &results {
            assert!(matches!(
                result,
                Ok(_) | Err(IngestionError::Superseded { .. })
            ));
        }
        assert_eq!(engine.generation(), 8);
        assert_eq!(engine.count(), 2);
    }
}
