use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::bulk::{self, BulkReport, TaskOutcome};
use crate::config::ResolvedConfig;
use crate::domain::{AlbumMetadata, ComicId, DownloadListEntry, DownloadTask, UNKNOWN_TITLE};
use crate::download_list::{AddOutcome, DownloadList};
use crate::error::ShelfError;
use crate::fetcher::{self, AlbumDownload};
use crate::remote::ClientFactory;
use crate::store::{self, LoadOutcome, RecordStore, SkippedEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    MissingRoot,
    Empty,
    NoValidRecords,
    Loaded,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub state: LoadState,
    pub root: String,
    pub total: usize,
    pub matched: usize,
    pub records: Vec<ListEntry>,
    pub skipped: Vec<SkippedEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub id: String,
    pub title: String,
    pub author: String,
    pub tags: Vec<String>,
    pub likes: u64,
    pub comment_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResult {
    pub id: String,
    pub dir: String,
    pub cover_path: String,
    pub has_cover: bool,
    pub metadata: AlbumMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub id: String,
    pub title: String,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkResult {
    pub source_id: String,
    pub report: BulkReport,
    pub records_after: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueResult {
    pub list_path: String,
    pub id: String,
    pub title: String,
    pub outcome: AddOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueListResult {
    pub list_path: String,
    pub entries: Vec<DownloadListEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResult {
    pub id: String,
    pub dir: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    pub id: String,
    pub path: String,
}

#[derive(Debug, Clone, Copy)]
pub enum ProgressSinkKind {
    Fetch,
    Bulk,
    Album,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Every user-facing action, wired to the store, the remote client factory
/// and the active download list.
pub struct App<F: ClientFactory> {
    store: RecordStore,
    factory: F,
    downloads_dir: Utf8PathBuf,
    concurrency: usize,
    list: Mutex<DownloadList>,
}

impl<F: ClientFactory> App<F> {
    pub fn new(store: RecordStore, factory: F, config: &ResolvedConfig) -> Self {
        let list_path = config
            .list_path
            .clone()
            .unwrap_or_else(DownloadList::session_path);
        Self {
            store,
            factory,
            downloads_dir: config.downloads_dir.clone(),
            concurrency: config.concurrency,
            list: Mutex::new(DownloadList::new(list_path)),
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn active_list(&self) -> Utf8PathBuf {
        self.list
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .active_path()
            .to_path_buf()
    }

    pub fn list(
        &self,
        query: Option<&str>,
        sink: &dyn ProgressSink,
    ) -> Result<ListResult, ShelfError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; scanning {}", self.store.root()),
            elapsed: None,
        });

        let outcome = self.store.load()?;
        let state = match &outcome {
            LoadOutcome::MissingRoot => LoadState::MissingRoot,
            LoadOutcome::Empty => LoadState::Empty,
            LoadOutcome::Loaded { records, .. } if records.is_empty() => {
                LoadState::NoValidRecords
            }
            LoadOutcome::Loaded { .. } => LoadState::Loaded,
        };
        let skipped = outcome.skipped().to_vec();
        let records = outcome.records();
        let matched = store::filter(records, query.unwrap_or_default());
        if let Some(query) = query {
            tracing::info!(
                query,
                matched = matched.len(),
                total = records.len(),
                "filtered records"
            );
        }

        Ok(ListResult {
            state,
            root: self.store.root().to_string(),
            total: records.len(),
            matched: matched.len(),
            records: matched
                .into_iter()
                .map(|record| ListEntry {
                    id: record.id.to_string(),
                    title: record.title().to_string(),
                    author: record.metadata.author.clone(),
                    tags: record.metadata.tags.clone(),
                    likes: record.metadata.likes,
                    comment_count: record.metadata.comment_count,
                })
                .collect(),
            skipped,
        })
    }

    pub fn info(&self, id: &ComicId, sink: &dyn ProgressSink) -> Result<InfoResult, ShelfError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; looking up {id}"),
            elapsed: None,
        });
        let record = self.store.find(id)?;
        let cover = record.cover_path();
        Ok(InfoResult {
            id: record.id.to_string(),
            dir: record.dir.to_string(),
            has_cover: cover.as_std_path().is_file(),
            cover_path: cover.to_string(),
            metadata: record.metadata,
        })
    }

    /// Fetches detail and cover for `id`. A remote failure is reported in the
    /// result rather than as an error.
    pub fn fetch(
        &self,
        id: &ComicId,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, ShelfError> {
        let title = self
            .store
            .find(id)
            .map(|record| record.title().to_string())
            .unwrap_or_else(|_| id.to_string());
        Ok(self.fetch_task(DownloadTask::new(id.clone(), title), sink))
    }

    /// Fetches one work listed in the related list of `source_id`.
    pub fn fetch_related(
        &self,
        source_id: &ComicId,
        related_id: &ComicId,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, ShelfError> {
        let task = self
            .related_tasks(source_id)?
            .into_iter()
            .find(|task| &task.id == related_id)
            .ok_or_else(|| ShelfError::RelatedNotFound {
                source_id: source_id.to_string(),
                related_id: related_id.to_string(),
            })?;
        Ok(self.fetch_task(task, sink))
    }

    /// Fetches every related work of `source_id` on a bounded worker pool and
    /// reloads the store afterwards.
    pub fn fetch_all_related(
        &self,
        source_id: &ComicId,
        concurrency: Option<usize>,
        sink: &dyn ProgressSink,
    ) -> Result<BulkResult, ShelfError> {
        let tasks = self.related_tasks(source_id)?;
        let cap = concurrency.unwrap_or(self.concurrency);
        sink.event(ProgressEvent {
            message: format!(
                "phase=Prepare; {} related works, {} workers",
                tasks.len(),
                cap
            ),
            elapsed: None,
        });

        let report = bulk::run_bulk(tasks, cap, &self.factory, &self.store, |progress| {
            let status = match progress.outcome {
                TaskOutcome::Succeeded => format!("done: {} ({})", progress.title, progress.id),
                TaskOutcome::Failed { message } => {
                    format!("failed: {} - {message}", progress.title)
                }
            };
            sink.event(ProgressEvent {
                message: status,
                elapsed: None,
            });
            sink.event(ProgressEvent {
                message: format!(
                    "bulk.progress completed={} total={}",
                    progress.completed, progress.total
                ),
                elapsed: None,
            });
        })?;

        sink.event(ProgressEvent {
            message: format!(
                "phase=Store; bulk finished, succeeded {} failed {}",
                report.succeeded,
                report.failed()
            ),
            elapsed: None,
        });
        let records_after = self.store.load()?.records().len();
        Ok(BulkResult {
            source_id: source_id.to_string(),
            report,
            records_after,
        })
    }

    /// Adds a local record to the download list. `list_override` must name an
    /// existing file and becomes the active list.
    pub fn add_to_list(
        &self,
        id: &ComicId,
        list_override: Option<&Utf8Path>,
        sink: &dyn ProgressSink,
    ) -> Result<QueueResult, ShelfError> {
        let record = self.store.find(id)?;
        let title = record.title().to_string();
        let mut list = self.list.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(path) = list_override {
            list.switch_list(path)?;
        }
        sink.event(ProgressEvent {
            message: format!("phase=Store; adding {id} to {}", list.active_path()),
            elapsed: None,
        });
        let outcome = list.add_entry(id.as_str(), &title, &record.metadata.tags)?;
        Ok(QueueResult {
            list_path: list.active_path().to_string(),
            id: id.to_string(),
            title,
            outcome,
        })
    }

    pub fn show_list(
        &self,
        list_override: Option<&Utf8Path>,
        sink: &dyn ProgressSink,
    ) -> Result<QueueListResult, ShelfError> {
        let mut list = self.list.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(path) = list_override {
            list.switch_list(path)?;
        }
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; reading {}", list.active_path()),
            elapsed: None,
        });
        Ok(QueueListResult {
            list_path: list.active_path().to_string(),
            entries: list.entries()?,
        })
    }

    pub fn delete(
        &self,
        id: &ComicId,
        sink: &dyn ProgressSink,
    ) -> Result<DeleteResult, ShelfError> {
        sink.event(ProgressEvent {
            message: format!("phase=Store; deleting {id}"),
            elapsed: None,
        });
        let dir = self.store.delete(id)?;
        Ok(DeleteResult {
            id: id.to_string(),
            dir: dir.to_string(),
        })
    }

    pub fn export(
        &self,
        id: &ComicId,
        destination: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<ExportResult, ShelfError> {
        sink.event(ProgressEvent {
            message: format!("phase=Store; exporting {id} to {destination}"),
            elapsed: None,
        });
        self.store.export(id, destination)?;
        Ok(ExportResult {
            id: id.to_string(),
            path: destination.to_string(),
        })
    }

    /// Downloads the full image set of a comic into the downloads directory.
    pub fn download_album(
        &self,
        id: &ComicId,
        sink: &dyn ProgressSink,
    ) -> Result<AlbumDownload, ShelfError> {
        let client = self.factory.create()?;
        fetcher::download_album(&client, id, &self.downloads_dir, sink)
    }

    fn fetch_task(&self, task: DownloadTask, sink: &dyn ProgressSink) -> FetchResult {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; {} ({})", task.title, task.id),
            elapsed: None,
        });
        let result = panic::catch_unwind(AssertUnwindSafe(|| -> Result<(), ShelfError> {
            let client = self.factory.create()?;
            fetcher::fetch_detail(&client, &self.store, &task.id, &task.id, sink)
        }))
        .unwrap_or_else(|payload| {
            Err(ShelfError::Worker(bulk::panic_message(payload.as_ref())))
        });
        match result {
            Ok(()) => FetchResult {
                id: task.id.to_string(),
                title: task.title,
                success: true,
                error: None,
            },
            Err(err) => {
                tracing::error!(id = %task.id, error = %err, "detail fetch failed");
                sink.event(ProgressEvent {
                    message: format!("failed: {} - {err}", task.title),
                    elapsed: None,
                });
                FetchResult {
                    id: task.id.to_string(),
                    title: task.title,
                    success: false,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    fn related_tasks(&self, source_id: &ComicId) -> Result<Vec<DownloadTask>, ShelfError> {
        let record = self.store.find(source_id)?;
        let tasks: Vec<DownloadTask> = record
            .metadata
            .related_list
            .iter()
            .filter_map(|work| {
                let raw = work.id.trim();
                if raw.is_empty() {
                    return None;
                }
                match raw.parse::<ComicId>() {
                    Ok(id) => {
                        let title = if work.name.trim().is_empty() {
                            UNKNOWN_TITLE.to_string()
                        } else {
                            work.name.clone()
                        };
                        Some(DownloadTask::new(id, title))
                    }
                    Err(err) => {
                        tracing::warn!(source = %source_id, error = %err, "skipping related work");
                        None
                    }
                }
            })
            .collect();
        if tasks.is_empty() {
            return Err(ShelfError::NoRelatedWorks(source_id.to_string()));
        }
        Ok(tasks)
    }
}
