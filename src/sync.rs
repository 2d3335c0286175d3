//! Export and import workflows.
//!
//! Export walks the account's contacts and writes them verbatim. Import loads
//! records from a file, sanitizes them and writes them to the destination
//! account in batches, keeping failed batches on disk for a later retry.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::fetch;
use crate::record::{ContactGroup, ContactRecord};
use crate::remote::Remote;
use crate::sanitize::{sanitize, SanitizeOptions};
use crate::store;
use crate::writer::{BatchWriter, FixedDelay, NoProgress, ProgressBarSink, RateLimit, SyncOutcome};

/// Prefix of group resource names; such labels are used without lookup
const GROUP_RESOURCE_PREFIX: &str = "contactGroups/";

/// Where import records come from
#[derive(Debug, Clone)]
pub enum ImportSource {
    File(PathBuf),
    Account(String),
}

/// Read the records of an import source
pub fn load_source(source: &ImportSource) -> Result<Vec<ContactRecord>> {
    match source {
        ImportSource::File(path) => store::read_records(path),
        ImportSource::Account(account) => Err(Error::Unimplemented(format!(
            "importing directly from account {account}"
        ))),
    }
}

/// Parameters of one import run
#[derive(Debug, Clone, Default)]
pub struct ImportPlan {
    /// Only import the first N records
    pub limit: Option<usize>,
    /// Group names or resource names added to every record
    pub groups: Vec<String>,
    pub failed_output: PathBuf,
    /// Where to write the records as stored by the remote
    pub output: Option<PathBuf>,
}

#[derive(Debug)]
pub struct ExportResult {
    pub exported: usize,
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct ImportResult {
    /// Records handed to the writer
    pub submitted: usize,
    pub outcome: SyncOutcome,
    /// Failure artifact, written only when some batch failed
    pub failed_path: Option<PathBuf>,
    /// Failure artifact of an earlier run, removed because this run had no failures
    pub stale_removed: Option<PathBuf>,
    /// Output files that could not be written. The remote writes already
    /// happened, so these never discard the outcome.
    pub persist_errors: Vec<Error>,
}

impl ImportResult {
    pub fn print_summary(&self) {
        println!();
        println!("Import completed:");
        println!("  Submitted: {} contact(s) in {} batch(es)", self.submitted, self.outcome.batches);
        println!("  Created:   {} contact(s)", self.outcome.succeeded.len());

        if !self.outcome.failed.is_empty() {
            println!("  Failed:    {} contact(s)", self.outcome.failed_count());
            for batch in &self.outcome.failed {
                eprintln!("    - {}", batch);
            }
            if let Some(path) = &self.failed_path {
                println!("  Failed contacts written to {}", path.display());
            }
        }

        if let Some(path) = &self.stale_removed {
            println!("  Removed failure file of an earlier run: {}", path.display());
        }

        for err in &self.persist_errors {
            eprintln!("  Could not save results: {}", err);
        }
    }
}

/// Sync engine bound to one account's remote
pub struct SyncEngine<'a, R: Remote, L: RateLimit = FixedDelay> {
    remote: &'a R,
    writer: BatchWriter<L>,
    show_progress: bool,
}

impl<'a, R: Remote, L: RateLimit> SyncEngine<'a, R, L> {
    pub fn new(remote: &'a R, writer: BatchWriter<L>) -> Self {
        Self {
            remote,
            writer,
            show_progress: false,
        }
    }

    /// Draw a progress bar while writing
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Write every contact of the account, unmodified, to `output`
    pub async fn export(&self, output: &Path) -> Result<ExportResult> {
        info!("fetching contacts");
        let contacts = fetch::fetch_contacts(self.remote).await?;

        store::write_records(output, &contacts)?;
        info!(count = contacts.len(), path = %output.display(), "export written");

        Ok(ExportResult {
            exported: contacts.len(),
            path: output.to_path_buf(),
        })
    }

    pub async fn list_groups(&self) -> Result<Vec<ContactGroup>> {
        fetch::fetch_groups(self.remote).await
    }

    /// Sanitize `records` and write them to the account
    pub async fn import(&self, records: Vec<ContactRecord>, plan: &ImportPlan) -> Result<ImportResult> {
        let groups = self.resolve_groups(&plan.groups).await?;
        let prepared = prepare(records, plan.limit, &groups);
        info!(
            count = prepared.len(),
            batch_size = self.writer.batch_size(),
            groups = ?groups,
            "prepared contacts for import"
        );

        let outcome = if self.show_progress {
            let progress = ProgressBarSink::new(prepared.len(), "Uploading");
            let outcome = self.writer.write(self.remote, &prepared, &progress).await;
            progress.finish("Upload complete");
            outcome
        } else {
            self.writer.write(self.remote, &prepared, &NoProgress).await
        };

        let mut persist_errors = Vec::new();

        if let Some(output) = &plan.output {
            if let Err(err) = store::write_records(output, &outcome.succeeded) {
                warn!(path = %output.display(), error = %err, "could not write created contacts");
                persist_errors.push(err);
            }
        }

        let mut failed_path = None;
        let mut stale_removed = None;
        if !outcome.failed.is_empty() {
            match store::write_records(&plan.failed_output, &outcome.failed_records()) {
                Ok(()) => failed_path = Some(plan.failed_output.clone()),
                Err(err) => {
                    warn!(
                        path = %plan.failed_output.display(),
                        error = %err,
                        "could not write failed contacts"
                    );
                    persist_errors.push(err);
                }
            }
        } else if plan.failed_output.is_file() {
            match store::remove_file(&plan.failed_output) {
                Ok(()) => stale_removed = Some(plan.failed_output.clone()),
                Err(err) => persist_errors.push(err),
            }
        }

        Ok(ImportResult {
            submitted: prepared.len(),
            outcome,
            failed_path,
            stale_removed,
            persist_errors,
        })
    }

    /// Map group labels to resource names. Labels that already are resource
    /// names pass through; the rest are looked up among the account's groups.
    async fn resolve_groups(&self, labels: &[String]) -> Result<Vec<String>> {
        let labels: Vec<&str> = labels
            .iter()
            .map(|label| label.trim())
            .filter(|label| !label.is_empty())
            .collect();

        if labels.iter().all(|label| label.starts_with(GROUP_RESOURCE_PREFIX)) {
            return Ok(labels.into_iter().map(str::to_string).collect());
        }

        let known = fetch::fetch_groups(self.remote).await?;
        labels
            .into_iter()
            .map(|label| {
                if label.starts_with(GROUP_RESOURCE_PREFIX) {
                    return Ok(label.to_string());
                }
                known
                    .iter()
                    .find(|group| group.matches(label))
                    .map(|group| group.resource_name.clone())
                    .ok_or_else(|| Error::validation(format!("unknown contact group `{label}`")))
            })
            .collect()
    }
}

/// Truncate to `limit` and sanitize with the given memberships
pub fn prepare(records: Vec<ContactRecord>, limit: Option<usize>, groups: &[String]) -> Vec<ContactRecord> {
    let options = SanitizeOptions::with_groups(groups.to_vec());
    let take = limit.unwrap_or(records.len());
    records
        .iter()
        .take(take)
        .map(|record| sanitize(record, &options))
        .collect()
}
