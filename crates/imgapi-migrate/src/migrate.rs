//! The `tags` → `tag` migration.
//!
//! Every image record is visited once, in listing order. Records without a
//! legacy `tags` field are left alone; the rest get their tags normalized
//! into `key=value` strings and committed through the active store. The first
//! failure stops the run, and records migrated before it stay migrated.

use imgapi_store::{
    CommitOutcome, DirectoryStore, ImageRecord, ImageStore, LocalStore, NormalizedTagSet,
    StoreError, normalize_tags,
};
use tracing::{debug, info};

use crate::config::Backend;
use crate::error::MigrateError;

// =============================================================================
// Record Transformer
// =============================================================================

/// What happened to one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// No legacy `tags` field; the record was not touched.
    Skipped,
    /// `tag` was committed (or already represented) and `tags` cleared.
    Transformed {
        tag: NormalizedTagSet,
        commit: CommitOutcome,
    },
    /// Dry-run: the record would have been transformed.
    Planned { tag: NormalizedTagSet },
}

/// Migrate one record through `store`.
pub async fn transform_record<S>(
    store: &mut S,
    record: &ImageRecord,
    dry_run: bool,
) -> Result<MigrationOutcome, StoreError>
where
    S: ImageStore + ?Sized,
{
    let Some(legacy) = record.legacy_tags() else {
        return Ok(MigrationOutcome::Skipped);
    };
    info!(id = %record.id, "migrate \"{}\"", record.id);

    let tag = normalize_tags(legacy)?;
    if dry_run {
        return Ok(MigrationOutcome::Planned { tag });
    }

    let commit = store.commit(record, &tag).await?;
    debug!(id = %record.id, ?commit, count = tag.len(), "committed tag");
    Ok(MigrationOutcome::Transformed { tag, commit })
}

// =============================================================================
// Migration Driver
// =============================================================================

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Listing,
    Processing,
    Done,
    Failed,
}

/// Summary of a finished run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Number of records returned by the store listing.
    pub records_listed: usize,
    /// Number of records transformed (or planned, in a dry run).
    pub records_updated: usize,
    /// Number of records without a legacy field.
    pub records_skipped: usize,
    /// Human-readable description of each change.
    pub changes: Vec<String>,
}

/// Runs the migration over one store.
pub struct Migrator<S> {
    store: S,
    dry_run: bool,
    phase: Phase,
}

/// Open the store selected by `backend`, connecting to UFDS if needed.
pub async fn open_store(backend: &Backend) -> Result<Box<dyn ImageStore>, MigrateError> {
    match backend {
        Backend::Ufds(ufds) => {
            let store = DirectoryStore::connect(&ufds.url, &ufds.bind_dn, &ufds.bind_password)
                .await
                .map_err(|source| MigrateError::Connect {
                    url: ufds.url.clone(),
                    source,
                })?;
            info!(url = %ufds.url, "connected to UFDS");
            Ok(Box::new(store))
        }
        Backend::Local { dir } => {
            info!(dir = %dir.display(), "using local database");
            Ok(Box::new(LocalStore::new(dir.clone())))
        }
    }
}

impl<S: ImageStore> Migrator<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            dry_run: false,
            phase: Phase::Idle,
        }
    }

    /// Preview changes without committing them.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    #[cfg(test)]
    pub fn into_store(self) -> S {
        self.store
    }

    /// List every record and migrate them one at a time, stopping at the
    /// first failure.
    pub async fn run(&mut self) -> Result<MigrationReport, MigrateError> {
        let result = self.run_phases().await;
        match &result {
            Ok(report) => {
                self.phase = Phase::Done;
                info!(
                    listed = report.records_listed,
                    updated = report.records_updated,
                    skipped = report.records_skipped,
                    dry_run = self.dry_run,
                    "migration complete"
                );
            }
            Err(_) => self.phase = Phase::Failed,
        }
        result
    }

    async fn run_phases(&mut self) -> Result<MigrationReport, MigrateError> {
        self.phase = Phase::Listing;
        let backend = self.store.kind();
        let records = self
            .store
            .list()
            .await
            .map_err(|source| MigrateError::List { backend, source })?;
        info!(backend, count = records.len(), "listed images");

        self.phase = Phase::Processing;
        let mut report = MigrationReport {
            records_listed: records.len(),
            ..Default::default()
        };

        for record in &records {
            let outcome = transform_record(&mut self.store, record, self.dry_run)
                .await
                .map_err(|source| MigrateError::Transform {
                    id: record.id.to_string(),
                    source,
                })?;

            match outcome {
                MigrationOutcome::Skipped => report.records_skipped += 1,
                MigrationOutcome::Transformed { tag, .. } | MigrationOutcome::Planned { tag } => {
                    report.records_updated += 1;
                    report
                        .changes
                        .push(format!("{}: tags -> tag [{}]", record.id, tag.join(", ")));
                }
            }
        }

        Ok(report)
    }
}
