//! Query, filter by processing level, then download each match in turn.
use crate::auth::{Credentials, TokenSource};
use crate::catalog::{filter_by_level, CatalogClient, ProductDescriptor};
use crate::download::{DownloadOutcome, ProductDownloader};
use crate::error::BatchError;
use crate::query::{AreaOfInterest, CatalogQuery, DateRange};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Querying,
    Filtering,
    Downloading { index: usize, total: usize },
    Completed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Querying => f.write_str("querying"),
            Self::Filtering => f.write_str("filtering"),
            Self::Downloading { index, total } => write!(f, "downloading {index}/{total}"),
            Self::Completed => f.write_str("completed"),
        }
    }
}

/// Inputs of one run, fixed for its whole duration.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub aoi: AreaOfInterest,
    pub dates: DateRange,
    pub collection: String,
    pub level: String,
    pub target_dir: PathBuf,
}

#[derive(Debug)]
pub struct ItemReport {
    pub product: ProductDescriptor,
    pub outcome: DownloadOutcome,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// Number of catalog records before the level filter.
    pub found: usize,
    pub items: Vec<ItemReport>,
}

#[derive(Serialize)]
struct ReportRecord<'a> {
    id: &'a str,
    name: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a Path>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

#[derive(Serialize)]
struct ReportFile<'a> {
    found: usize,
    succeeded: usize,
    failed: usize,
    skipped: usize,
    items: Vec<ReportRecord<'a>>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.count(DownloadOutcome::is_success)
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DownloadOutcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, DownloadOutcome::Skipped { .. }))
    }

    fn count(&self, predicate: impl Fn(&DownloadOutcome) -> bool) -> usize {
        self.items.iter().filter(|i| predicate(&i.outcome)).count()
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), BatchError> {
        let path = path.as_ref();
        let items = self
            .items
            .iter()
            .map(|item| {
                let (status, bytes, file, detail) = match &item.outcome {
                    DownloadOutcome::Succeeded { path: saved, bytes } => {
                        ("succeeded", Some(*bytes), Some(saved.as_path()), None)
                    }
                    DownloadOutcome::Skipped { reason } => {
                        ("skipped", None, None, Some(reason.clone()))
                    }
                    DownloadOutcome::Failed(e) => ("failed", None, None, Some(e.to_string())),
                };
                ReportRecord {
                    id: &item.product.id,
                    name: &item.product.name,
                    status,
                    bytes,
                    path: file,
                    detail,
                }
            })
            .collect();
        let report = ReportFile {
            found: self.found,
            succeeded: self.succeeded(),
            failed: self.failed(),
            skipped: self.skipped(),
            items,
        };
        let report_error = |reason: String| BatchError::Report {
            path: path.to_path_buf(),
            reason,
        };
        let content =
            serde_json::to_string_pretty(&report).map_err(|e| report_error(e.to_string()))?;
        fs::write(path, content).map_err(|e| report_error(e.to_string()))?;
        Ok(())
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed, {} skipped ({} matching of {} found)",
            self.succeeded(),
            self.failed(),
            self.skipped(),
            self.items.len(),
            self.found
        )
    }
}

pub struct BatchOrchestrator<T> {
    catalog: CatalogClient,
    downloader: ProductDownloader<T>,
    dry_run: bool,
}

impl<T: TokenSource> BatchOrchestrator<T> {
    pub fn new(catalog: CatalogClient, downloader: ProductDownloader<T>) -> Self {
        Self {
            catalog,
            downloader,
            dry_run: false,
        }
    }

    /// Record every match as skipped instead of downloading it.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Errors before the level filter end the run. Errors for a single
    /// product are recorded in the report and the run moves on.
    pub async fn run(
        &self,
        request: &BatchRequest,
        credentials: &Credentials,
    ) -> Result<BatchReport, BatchError> {
        if !self.dry_run {
            fs::create_dir_all(&request.target_dir).map_err(|source| {
                BatchError::TargetDirectory {
                    path: request.target_dir.clone(),
                    source,
                }
            })?;
        }

        info!(phase = %Phase::Querying, collection = %request.collection, dates = %request.dates);
        if request.dates.is_empty() {
            warn!("Date range {} is empty; the catalog will match nothing", request.dates);
        }
        let query = CatalogQuery::build(&request.aoi, &request.dates, &request.collection)
            .with_top(self.catalog.page_size());
        let products = self.catalog.search(&query).await?;

        info!(phase = %Phase::Filtering, found = products.len(), level = %request.level);
        let found = products.len();
        let selected = filter_by_level(products, &request.level);
        info!("{} of {} products match level {}", selected.len(), found, request.level);

        let total = selected.len();
        let mut report = BatchReport {
            found,
            items: Vec::with_capacity(total),
        };
        for (i, product) in selected.into_iter().enumerate() {
            let phase = Phase::Downloading {
                index: i + 1,
                total,
            };
            info!(phase = %phase, id = %product.id, "{}", product.name);
            let outcome = if self.dry_run {
                DownloadOutcome::Skipped {
                    reason: "dry run".to_string(),
                }
            } else {
                self.downloader
                    .download(&product, credentials, &request.target_dir)
                    .await
            };
            match &outcome {
                DownloadOutcome::Succeeded { path, bytes } => {
                    info!("Saved {} ({} bytes)", path.display(), bytes)
                }
                DownloadOutcome::Skipped { reason } => {
                    warn!("Skipped {}: {}", product.name, reason)
                }
                DownloadOutcome::Failed(e) => error!("Failed {}: {}", product.name, e),
            }
            report.items.push(ItemReport { product, outcome });
        }

        info!(phase = %Phase::Completed, "{}", report);
        Ok(report)
    }
}
