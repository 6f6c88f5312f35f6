//! High-level orchestration of the metadata resolution pipeline.
//!
//! Candidate DOIs are tried in first-seen order. A not-found answer for one
//! candidate is swallowed and the loop advances, since the DOI shape matches
//! non-canonical substrings in running text. Every other failure aborts the
//! loop immediately: retrying a different candidate will not resolve a
//! systemic outage. Relaxing that policy is a one-arm change in the match
//! below.

use std::path::Path;
use std::sync::Arc;

use crate::crossref::CrossrefClient;
use crate::errors::MetaError;
use crate::models::PaperRecord;
use crate::normalize::normalize_metadata;
use crate::pdf::{extract_doi_candidates, LopdfSource, PageSource, DEFAULT_SCAN_PAGES};
use crate::store::RecordStore;

/// Per-file outcome of a batch run.
pub struct BatchOutcome {
    pub file_name: String,
    pub result: Result<PaperRecord, MetaError>,
}

pub struct MetadataPipeline {
    store: Arc<RecordStore>,
    client: CrossrefClient,
    scan_pages: usize,
}

impl MetadataPipeline {
    pub fn new(store: Arc<RecordStore>, client: CrossrefClient) -> Self {
        Self {
            store,
            client,
            scan_pages: DEFAULT_SCAN_PAGES,
        }
    }

    /// Override how many leading pages are scanned for DOIs.
    pub fn with_scan_pages(mut self, scan_pages: usize) -> Self {
        self.scan_pages = scan_pages;
        self
    }

    /// Resolve one PDF from disk and persist the record. `display_name`
    /// overrides the stored file name (callers pass the sanitized upload
    /// name); it defaults to the file's own name.
    pub async fn resolve(
        &self,
        pdf_path: &Path,
        display_name: Option<&str>,
    ) -> Result<PaperRecord, MetaError> {
        let file_name = match display_name {
            Some(name) => name.to_string(),
            None => pdf_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload.pdf".to_string()),
        };
        let source = LopdfSource::open(pdf_path)?;
        self.resolve_source(&source, &file_name).await
    }

    /// Resolve an already-open document. Split out so tests can drive the
    /// pipeline with a stubbed [`PageSource`].
    pub async fn resolve_source(
        &self,
        source: &dyn PageSource,
        file_name: &str,
    ) -> Result<PaperRecord, MetaError> {
        let candidates = extract_doi_candidates(source, self.scan_pages);
        if candidates.is_empty() {
            return Err(MetaError::DoiNotFound(format!(
                "DOI not found in {file_name}"
            )));
        }

        let mut last_error: Option<MetaError> = None;
        let mut resolved: Option<PaperRecord> = None;
        for doi in &candidates {
            match self.client.fetch_metadata(doi).await {
                Ok(work) => {
                    resolved = Some(normalize_metadata(&work, file_name, Some(doi), Some(source)));
                    break;
                }
                Err(err @ MetaError::CrossrefNotFound(_)) => {
                    tracing::info!("candidate DOI {doi} failed: {err}");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        let mut record = match resolved {
            Some(record) => record,
            None => {
                return Err(last_error.unwrap_or_else(|| {
                    MetaError::DoiNotFound(format!("DOI not found in {file_name}"))
                }))
            }
        };

        // Re-resolving the same publication from a different file overwrites
        // rather than duplicates.
        if let Some(existing) = self.store.find_by_doi(&record.doi) {
            record.id = existing.id;
        }
        let stored = self.store.upsert(record)?;
        tracing::info!("persisted record {}", stored.id);
        Ok(stored)
    }

    /// Resolve every `*.pdf` in a directory, sorted by name. Per-file
    /// failures are logged and reported in the outcome list; they do not stop
    /// the batch.
    pub async fn process_dir(&self, dir: &Path) -> Result<Vec<BatchOutcome>, MetaError> {
        let mut pdfs: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
            })
            .collect();
        pdfs.sort();

        let mut outcomes = Vec::with_capacity(pdfs.len());
        for pdf in pdfs {
            let file_name = pdf
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            tracing::info!("processing {file_name}");
            let result = self.resolve(&pdf, Some(&file_name)).await;
            if let Err(err) = &result {
                tracing::error!("failed to process {file_name}: {err}");
            }
            outcomes.push(BatchOutcome { file_name, result });
        }
        Ok(outcomes)
    }
}
