use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::time::Instant;

use rayon::ThreadPoolBuilder;
use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{ComicId, DownloadTask};
use crate::error::ShelfError;
use crate::fetcher::fetch_detail;
use crate::remote::ClientFactory;
use crate::store::RecordStore;

pub const DEFAULT_CONCURRENCY: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded,
    Failed { message: String },
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkFailure {
    pub id: String,
    pub title: String,
    pub message: String,
}

/// Aggregate of one bulk run. `failures` is in the order failures were
/// observed, not submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub total: usize,
    pub succeeded: usize,
    pub failures: Vec<BulkFailure>,
}

impl BulkReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Handed to the progress callback after every single task completes.
#[derive(Debug)]
pub struct BulkProgress<'a> {
    pub id: &'a ComicId,
    pub title: &'a str,
    pub outcome: &'a TaskOutcome,
    pub completed: usize,
    pub total: usize,
}

struct BulkEvent {
    task: DownloadTask,
    outcome: TaskOutcome,
}

struct SilentSink;

impl ProgressSink for SilentSink {
    fn event(&self, _event: ProgressEvent) {}
}

/// Runs a detail fetch for every task with at most `cap` running at once.
///
/// Tasks are admitted in submission order on a dedicated pool of
/// `min(cap, tasks.len())` threads. Each task gets its own client from
/// `factory`, and any error or panic inside a task is recorded as that task's
/// failure. Every task has finished before this returns.
pub fn run_bulk<F, P>(
    tasks: Vec<DownloadTask>,
    cap: usize,
    factory: &F,
    store: &RecordStore,
    mut on_progress: P,
) -> Result<BulkReport, ShelfError>
where
    F: ClientFactory,
    P: FnMut(&BulkProgress<'_>),
{
    if cap == 0 {
        return Err(ShelfError::InvalidConcurrency(cap));
    }
    let total = tasks.len();
    if total == 0 {
        return Ok(BulkReport::default());
    }

    let workers = cap.min(total);
    tracing::info!(total, workers, "starting bulk download");
    let start = Instant::now();

    let pool = ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|index| format!("comic-shelf-bulk-{index}"))
        .build()
        .map_err(|err| ShelfError::Worker(format!("failed to start download pool: {err}")))?;

    let (tx, rx) = mpsc::channel::<BulkEvent>();
    let mut report = BulkReport {
        total,
        ..BulkReport::default()
    };

    // The scope body runs on the calling thread and drains results while the
    // pool works through the tasks in submission order.
    pool.in_place_scope_fifo(|scope| {
        for task in tasks {
            let tx = tx.clone();
            scope.spawn_fifo(move |_| {
                let outcome = run_task(factory, store, &task);
                let _ = tx.send(BulkEvent { task, outcome });
            });
        }
        drop(tx);

        let mut completed = 0usize;
        for event in rx {
            completed += 1;
            match &event.outcome {
                TaskOutcome::Succeeded => report.succeeded += 1,
                TaskOutcome::Failed { message } => {
                    tracing::warn!(id = %event.task.id, error = %message, "bulk task failed");
                    report.failures.push(BulkFailure {
                        id: event.task.id.to_string(),
                        title: event.task.title.clone(),
                        message: message.clone(),
                    });
                }
            }
            on_progress(&BulkProgress {
                id: &event.task.id,
                title: &event.task.title,
                outcome: &event.outcome,
                completed,
                total,
            });
        }
    });

    tracing::info!(
        total,
        succeeded = report.succeeded,
        failed = report.failed(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "bulk download finished"
    );
    Ok(report)
}

fn run_task<F: ClientFactory>(
    factory: &F,
    store: &RecordStore,
    task: &DownloadTask,
) -> TaskOutcome {
    let result = panic::catch_unwind(AssertUnwindSafe(|| -> Result<(), ShelfError> {
        let client = factory.create()?;
        fetch_detail(&client, store, &task.id, &task.id, &SilentSink)
    }));
    match result {
        Ok(Ok(())) => TaskOutcome::Succeeded,
        Ok(Err(err)) => TaskOutcome::Failed {
            message: err.to_string(),
        },
        Err(payload) => TaskOutcome::Failed {
            message: panic_message(payload.as_ref()),
        },
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("task panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("task panicked: {message}")
    } else {
        "task panicked".to_string()
    }
}
