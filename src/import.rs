//! Import orchestration: schema creation followed by batched row insertion.
//!
//! One orchestrator runs at most one job at a time. A job moves through
//! `Pending → CreatingSchema → Inserting → Done`, or to `Failed` from
//! either middle state on an unrecoverable error. Schema or connection
//! failure aborts before any rows are attempted; row-level failures (shape
//! mismatches, store rejections) are absorbed into the job's failure list
//! and the run completes with progress reaching 1.0.
//!
//! Batches go out strictly sequentially so every row has a deterministic
//! batch assignment for failure reporting. Import volume is bounded by
//! interactive use, so sequential submission is a correctness choice we can
//! afford. Cancellation is honoured between batches, never mid-batch;
//! committed batches stay committed (the store's own guarantees are the only
//! transaction scope).

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use log::{debug, info, warn};

use crate::{
    error::{FailureReason, ImportError, RowFailure},
    gateway::{Credentials, StoreGateway, StoreSession},
    mapping::ColumnMapping,
    parser::Row,
    statement,
};

pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pending,
    CreatingSchema,
    Inserting,
    Done,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }
}

/// State for one end-to-end run. Owned by the orchestrator while the run is
/// live, handed back when it ends, and never reused.
#[derive(Debug, Clone)]
pub struct ImportJob {
    pub mapping: Vec<ColumnMapping>,
    pub target_table: String,
    pub total_rows: usize,
    pub rows_processed: usize,
    pub failures: Vec<RowFailure>,
    pub phase: Phase,
    /// Set when the job ended in `Failed`, with the fatal reason.
    pub error: Option<String>,
}

/// Receives progress and completion callbacks while a job runs. Progress
/// fractions are monotonically non-decreasing and reach exactly 1.0 only
/// once the job is `Done`; `on_complete` fires only for jobs that finish,
/// with or without row-level failures, never for aborted ones.
pub trait ImportObserver {
    fn on_progress(&mut self, _fraction: f64) {}
    fn on_complete(&mut self, _failures: &[RowFailure]) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl ImportObserver for NoopObserver {}

/// Shared flag for requesting cancellation between batches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Rows per parameterized batch submission.
    pub batch_size: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

pub struct ImportOrchestrator<G: StoreGateway> {
    gateway: G,
    options: ImportOptions,
    phase: Mutex<Option<Phase>>,
    cancel: CancelToken,
}

impl<G: StoreGateway> ImportOrchestrator<G> {
    pub fn new(gateway: G, options: ImportOptions) -> Self {
        Self {
            gateway,
            options,
            phase: Mutex::new(None),
            cancel: CancelToken::default(),
        }
    }

    /// Phase of the current (or most recent) job, if any run was started.
    pub fn phase(&self) -> Option<Phase> {
        *lock_ignoring_poison(&self.phase)
    }

    /// Token for cancelling the active job between batches. Reset each time
    /// a new job starts.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Runs one import job to completion. Fails with
    /// [`ImportError::JobInProgress`] while a previous job on this instance
    /// is still in a non-terminal phase. All other outcomes are reported on
    /// the returned job: `Done` (possibly with row-level failures) or
    /// `Failed` with the fatal reason in `job.error`.
    pub fn start(
        &self,
        mapping: &[ColumnMapping],
        data_rows: &[Row],
        target_table: &str,
        credentials: &Credentials,
        observer: &mut dyn ImportObserver,
    ) -> Result<ImportJob, ImportError> {
        {
            let mut phase = lock_ignoring_poison(&self.phase);
            if matches!(*phase, Some(p) if !p.is_terminal()) {
                return Err(ImportError::JobInProgress);
            }
            *phase = Some(Phase::Pending);
        }
        self.cancel.reset();

        let mut job = ImportJob {
            mapping: mapping.to_vec(),
            target_table: target_table.to_string(),
            total_rows: data_rows.len(),
            rows_processed: 0,
            failures: Vec::new(),
            phase: Phase::Pending,
            error: None,
        };
        info!(
            "Starting import of {} row(s) into '{}' (batch size {})",
            job.total_rows, job.target_table, self.options.batch_size
        );

        match self.run(&mut job, data_rows, credentials, observer) {
            Ok(()) => {
                info!(
                    "Import into '{}' done: {} row(s) processed, {} failure(s)",
                    job.target_table,
                    job.rows_processed,
                    job.failures.len()
                );
            }
            Err(err) => {
                warn!("Import into '{}' failed: {err}", job.target_table);
                job.error = Some(err.to_string());
                self.transition(&mut job, Phase::Failed);
            }
        }
        Ok(job)
    }

    fn run(
        &self,
        job: &mut ImportJob,
        data_rows: &[Row],
        credentials: &Credentials,
        observer: &mut dyn ImportObserver,
    ) -> Result<(), ImportError> {
        self.transition(job, Phase::CreatingSchema);
        let create = statement::build_create_table(&job.target_table, &job.mapping)?;
        let insert = statement::build_insert_template(&job.target_table, &job.mapping)?;

        // One session per job; dropped (and thereby released) on every exit
        // path out of this function.
        let mut session = self.gateway.open(credentials)?;
        session.execute(&create)?;
        debug!("Schema statement submitted for '{}'", job.target_table);

        self.transition(job, Phase::Inserting);
        if data_rows.is_empty() {
            self.transition(job, Phase::Done);
            observer.on_progress(1.0);
            observer.on_complete(&job.failures);
            return Ok(());
        }

        let batch_size = self.options.batch_size.max(1);
        let mut next_index = 0usize;
        for chunk in data_rows.chunks(batch_size) {
            if self.cancel.is_cancelled() {
                return Err(ImportError::Cancelled);
            }

            let mut batch_indices = Vec::with_capacity(chunk.len());
            let mut batch_rows = Vec::with_capacity(chunk.len());
            for (offset, row) in chunk.iter().enumerate() {
                let row_index = next_index + offset;
                match pack_row(&job.mapping, row) {
                    Some(packed) => {
                        batch_indices.push(row_index);
                        batch_rows.push(packed);
                    }
                    None => {
                        debug!(
                            "Row {row_index} has {} cell(s), expected {}; skipping",
                            row.len(),
                            job.mapping.len()
                        );
                        job.failures
                            .push(RowFailure::new(row_index, FailureReason::ShapeMismatch));
                    }
                }
            }

            if !batch_rows.is_empty() {
                self.submit_batch(session.as_mut(), &insert, &batch_indices, &batch_rows, job);
            }

            next_index += chunk.len();
            job.rows_processed = next_index;
            if job.rows_processed == job.total_rows {
                self.transition(job, Phase::Done);
            }
            observer.on_progress(job.rows_processed as f64 / job.total_rows as f64);
        }

        observer.on_complete(&job.failures);
        Ok(())
    }

    /// Submits one batch. Per-row errors from the store are recorded
    /// directly; a wholesale batch failure is retried once row-by-row to
    /// isolate the offending rows. Nothing here is fatal to the job.
    fn submit_batch(
        &self,
        session: &mut dyn StoreSession,
        insert: &str,
        batch_indices: &[usize],
        batch_rows: &[Row],
        job: &mut ImportJob,
    ) {
        match session.execute_batch(insert, batch_rows) {
            Ok(row_errors) => {
                for row_error in row_errors {
                    if let Some(&row_index) = batch_indices.get(row_error.offset) {
                        job.failures.push(RowFailure::new(
                            row_index,
                            FailureReason::BatchFailed(row_error.message),
                        ));
                    }
                }
            }
            Err(err) => {
                warn!(
                    "Batch of {} row(s) failed ({err}); retrying row-by-row",
                    batch_rows.len()
                );
                for (&row_index, row) in batch_indices.iter().zip(batch_rows) {
                    match session.execute_batch(insert, std::slice::from_ref(row)) {
                        Ok(row_errors) => {
                            if let Some(row_error) = row_errors.into_iter().next() {
                                job.failures.push(RowFailure::new(
                                    row_index,
                                    FailureReason::BatchFailed(row_error.message),
                                ));
                            }
                        }
                        Err(retry_err) => {
                            job.failures.push(RowFailure::new(
                                row_index,
                                FailureReason::BatchFailed(retry_err.to_string()),
                            ));
                        }
                    }
                }
            }
        }
    }

    fn transition(&self, job: &mut ImportJob, phase: Phase) {
        job.phase = phase;
        *lock_ignoring_poison(&self.phase) = Some(phase);
    }
}

/// Packs a row into mapping order, one cell per mapped column. Returns
/// `None` on a shape mismatch.
fn pack_row(mapping: &[ColumnMapping], row: &Row) -> Option<Row> {
    if row.len() != mapping.len() {
        return None;
    }
    Some(
        mapping
            .iter()
            .enumerate()
            .filter_map(|(source_index, _)| row.get(source_index).cloned())
            .collect(),
    )
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
