use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;

use crate::api::CharacterApi;
use crate::config::ResolvedConfig;
use crate::domain::{CharacterTable, asset_path};
use crate::download::{AssetDownloader, DownloadOutcome, Pacer, is_present};
use crate::error::CatalogError;
use crate::fs_util::ensure_dir;
use crate::normalize::RecordNormalizer;
use crate::optimize::{AssetOptimizer, OptimizeReport};
use crate::resolver::{ImageResolver, PortraitLocator, Resolution};
use crate::store::CanonicalStore;
use crate::verify::{AssetVerifier, VerifyReport};
use crate::wiki::WikiClient;

#[derive(Debug, Clone)]
pub struct IngestResult {
    pub store_path: Utf8PathBuf,
    pub records: usize,
    pub columns: Vec<String>,
    pub warnings: Vec<String>,
    pub written: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadAction {
    Present,
    Downloaded,
    NoImage,
    Failed,
    SkippedInvalid,
}

impl fmt::Display for DownloadAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DownloadAction::Present => "present",
            DownloadAction::Downloaded => "downloaded",
            DownloadAction::NoImage => "no-image",
            DownloadAction::Failed => "failed",
            DownloadAction::SkippedInvalid => "skipped-invalid",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone)]
pub struct DownloadItem {
    pub id: String,
    pub name: String,
    pub action: DownloadAction,
    pub path: Option<Utf8PathBuf>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DownloadResult {
    pub items: Vec<DownloadItem>,
}

impl DownloadResult {
    pub fn count(&self, action: DownloadAction) -> usize {
        self.items.iter().filter(|item| item.action == action).count()
    }
}

#[derive(Debug, Clone)]
pub struct InspectResult {
    pub store_path: Utf8PathBuf,
    pub columns: Vec<String>,
    pub records: usize,
    pub categories: BTreeMap<String, usize>,
    pub missing_ids: usize,
    pub duplicate_ids: Vec<String>,
    pub unknown_categories: usize,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            elapsed: None,
        }
    }

    pub fn finished(message: impl Into<String>, started: Instant) -> Self {
        Self {
            message: message.into(),
            elapsed: Some(started.elapsed()),
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<A: CharacterApi, W: WikiClient, L: PortraitLocator> {
    config: ResolvedConfig,
    api: A,
    wiki: W,
    resolver: ImageResolver<L>,
}

impl<A: CharacterApi, W: WikiClient, L: PortraitLocator> App<A, W, L> {
    pub fn new(config: ResolvedConfig, api: A, wiki: W, locator: L) -> Self {
        let resolver = ImageResolver::new(config.wiki_base_url.clone(), locator);
        Self {
            config,
            api,
            wiki,
            resolver,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn wiki(&self) -> &W {
        &self.wiki
    }

    fn store(&self) -> CanonicalStore {
        CanonicalStore::new(self.config.image_dir.clone())
    }

    /// Pulls the character payload and replaces the canonical store with it.
    ///
    /// Any fetch or parse failure returns before the store is touched.
    pub fn ingest(&self, sink: &dyn ProgressSink) -> Result<IngestResult, CatalogError> {
        let started = Instant::now();
        sink.event(ProgressEvent::message("Sending request to API..."));
        let payload = self.api.fetch_payload().inspect_err(|err| {
            tracing::error!(error = %err, "failed to fetch character payload");
        })?;

        let normalized = RecordNormalizer::new(self.config.image_dir.clone())
            .normalize(&payload)
            .inspect_err(|err| tracing::error!(error = %err, "failed to normalize payload"))?;
        for warning in &normalized.warnings {
            sink.event(ProgressEvent::message(format!("Warning: {warning}")));
        }

        let store_path = self.config.store_path.clone();
        let table = normalized.table;
        if table.is_empty() {
            tracing::warn!("no character data fetched; skipping store write");
            sink.event(ProgressEvent::message(
                "Warning: No character data fetched; skipping CSV saving.",
            ));
            return Ok(IngestResult {
                store_path,
                records: 0,
                columns: table.columns,
                warnings: normalized.warnings,
                written: false,
            });
        }

        self.store().write(&table, &store_path).inspect_err(|err| {
            tracing::error!(path = %store_path, error = %err, "failed to save store");
        })?;
        sink.event(ProgressEvent::finished(
            format!("Character data saved to {store_path}"),
            started,
        ));

        Ok(IngestResult {
            store_path,
            records: table.len(),
            columns: table.columns,
            warnings: normalized.warnings,
            written: true,
        })
    }

    /// Resolves and downloads one portrait per valid record, one at a time.
    pub fn download_portraits(
        &self,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadResult, CatalogError> {
        let started = Instant::now();
        let table = self.read_store()?;
        let image_dir = &self.config.image_dir;
        ensure_dir(image_dir)?;

        let downloader = AssetDownloader::new(&self.wiki);
        let mut pacer = Pacer::new(self.config.request_delay);
        let mut seen = HashSet::new();
        let mut result = DownloadResult::default();

        for (row, record) in table.records.iter().enumerate() {
            let id = record.asset_key();
            let name = record.name().trim();
            let item = |action, path, message| DownloadItem {
                id: id.to_string(),
                name: name.to_string(),
                action,
                path,
                message,
            };

            if let Err(err) = record.asset_category() {
                tracing::warn!(row, id, character = name, error = %err, "excluding record");
                result
                    .items
                    .push(item(DownloadAction::SkippedInvalid, None, Some(err.to_string())));
                continue;
            }
            if !seen.insert(id) {
                let err = CatalogError::RecordInvalid {
                    id: id.to_string(),
                    reason: "duplicate id".to_string(),
                };
                tracing::warn!(row, id, character = name, error = %err, "excluding record");
                result
                    .items
                    .push(item(DownloadAction::SkippedInvalid, None, Some(err.to_string())));
                continue;
            }

            let destination = asset_path(image_dir, id);
            if is_present(&destination) {
                tracing::info!(id, character = name, "image already exists, skipping download");
                result
                    .items
                    .push(item(DownloadAction::Present, Some(destination), None));
                continue;
            }

            let url = match pacer.run(|| self.resolver.resolve(&self.wiki, name)) {
                Resolution::Found(url) => url,
                Resolution::NoImage => {
                    sink.event(ProgressEvent::message(format!(
                        "No image URL found for {name}. See log for details."
                    )));
                    result.items.push(item(DownloadAction::NoImage, None, None));
                    continue;
                }
                Resolution::Failed(err) => {
                    sink.event(ProgressEvent::message(format!(
                        "Failed to fetch wiki page for {name}. See log for details."
                    )));
                    result
                        .items
                        .push(item(DownloadAction::Failed, None, Some(err.to_string())));
                    continue;
                }
            };

            match pacer.run(|| downloader.fetch(&url, &destination)) {
                Ok(DownloadOutcome::Downloaded { .. }) => {
                    sink.event(ProgressEvent::message(format!(
                        "Downloaded image for {name} to {destination}"
                    )));
                    result
                        .items
                        .push(item(DownloadAction::Downloaded, Some(destination), None));
                }
                Ok(DownloadOutcome::AlreadyPresent) => {
                    result
                        .items
                        .push(item(DownloadAction::Present, Some(destination), None));
                }
                Err(err) => {
                    tracing::error!(
                        id,
                        character = name,
                        url = %url,
                        error = %err,
                        "download failed"
                    );
                    sink.event(ProgressEvent::message(format!(
                        "Failed to download image for {name}. See log for details."
                    )));
                    result
                        .items
                        .push(item(DownloadAction::Failed, None, Some(err.to_string())));
                }
            }
        }

        sink.event(ProgressEvent::finished(
            "Image downloading process completed. Check the log file for details.",
            started,
        ));
        Ok(result)
    }

    pub fn optimize(&self, sink: &dyn ProgressSink) -> Result<OptimizeReport, CatalogError> {
        let started = Instant::now();
        let report = AssetOptimizer::new(self.config.optimize)
            .optimize_dir(&self.config.image_dir, sink)
            .inspect_err(|err| tracing::error!(error = %err, "optimization pass aborted"))?;
        sink.event(ProgressEvent::finished("Image optimization completed.", started));
        Ok(report)
    }

    pub fn verify(&self, sink: &dyn ProgressSink) -> Result<VerifyReport, CatalogError> {
        let table = self.read_store()?;
        sink.event(ProgressEvent::message(format!(
            "Checking {} records against {}",
            table.len(),
            self.config.image_dir
        )));
        Ok(AssetVerifier::new(self.config.image_dir.clone()).verify(&table))
    }

    pub fn inspect(&self, sink: &dyn ProgressSink) -> Result<InspectResult, CatalogError> {
        let table = self.read_store()?;
        sink.event(ProgressEvent::message(format!(
            "Inspecting {}",
            self.config.store_path
        )));

        let mut categories = BTreeMap::new();
        let mut unknown_categories = 0;
        let mut missing_ids = 0;
        let mut seen = HashSet::new();
        let mut duplicate_ids = Vec::new();
        for record in &table.records {
            match record.category_kind() {
                Some(category) => {
                    *categories.entry(category.label().to_string()).or_insert(0) += 1;
                }
                None => unknown_categories += 1,
            }
            let id = record.asset_key();
            if id.is_empty() {
                missing_ids += 1;
            } else if !seen.insert(id) && !duplicate_ids.iter().any(|dup| dup == id) {
                duplicate_ids.push(id.to_string());
            }
        }

        Ok(InspectResult {
            store_path: self.config.store_path.clone(),
            columns: table.columns.clone(),
            records: table.len(),
            categories,
            missing_ids,
            duplicate_ids,
            unknown_categories,
        })
    }

    fn read_store(&self) -> Result<CharacterTable, CatalogError> {
        self.store()
            .read(&self.config.store_path)
            .inspect_err(|err| tracing::error!(error = %err, "failed to read canonical store"))
    }
}
