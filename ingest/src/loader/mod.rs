use crate::lineage::{FileHasher, LineageTagger};
use crate::models::{LoadResult, LoadStatus, RunStatistics, TripFileDescriptor};
use crate::quality::QualityValidator;
use crate::schema::{SchemaDescriptor, SchemaResolver};
use crate::utils::retry::{retry_with_backoff, RetryPolicy};
use crate::warehouse::{ConnectionFactory, ConnectionManager};
use chrono::Utc;
use common::config::{PipelineConfig, Settings};
use common::{Error, Result};
use futures::StreamExt;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Cooperative cancellation, checked at file boundaries only. A file already
/// writing finishes (or fails) before the cancellation takes effect.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Per-file load lifecycle, surfaced in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadPhase {
    Reading,
    Validating,
    Rejected,
    Tagging,
    Writing,
    Committed,
}

/// Reads source files in bounded batches and drives each batch through
/// validation, lineage tagging, and the warehouse write path. One file's
/// failure never takes the run down with it.
pub struct BatchLoader {
    resolver: Arc<SchemaResolver>,
    validator: QualityValidator,
    tagger: LineageTagger,
    factory: Arc<dyn ConnectionFactory>,
    pipeline: PipelineConfig,
    retry_policy: RetryPolicy,
    cancel: CancelToken,
}

impl BatchLoader {
    pub fn new(factory: Arc<dyn ConnectionFactory>, settings: &Settings) -> Self {
        Self {
            resolver: Arc::new(SchemaResolver::new()),
            validator: QualityValidator::new(settings.quality.clone()),
            tagger: LineageTagger::new(),
            factory,
            pipeline: settings.pipeline.clone(),
            retry_policy: RetryPolicy::from_config(&settings.retry),
            cancel: CancelToken::default(),
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Load one source file into `table_name`. Never panics or escalates:
    /// every failure mode lands in the returned result.
    pub async fn load_file(
        &self,
        path: &Path,
        table_name: &str,
        descriptor: &TripFileDescriptor,
    ) -> LoadResult {
        let (result, _) = self.process_file(path, table_name, descriptor).await;
        result
    }

    /// Process all files, distinct files in parallel up to
    /// `max_parallel_files`, batches within a file strictly in source order.
    /// Unsupported trip types are rejected up front as configuration errors;
    /// repeated connection exhaustion aborts the run with partial results.
    pub async fn run(&self, files: Vec<(PathBuf, TripFileDescriptor)>) -> Result<RunStatistics> {
        let run_start = Instant::now();

        // A cancellation only spans the run that triggered it; handles from
        // `cancel_token` apply to the run in progress.
        self.cancel.reset();

        // Configuration gate: every trip type must have a registered schema
        // before any file work starts.
        for (_, descriptor) in &files {
            self.resolver.resolve(descriptor.trip_type)?;
        }

        info!(files = files.len(), "Starting ingestion run");

        let stats = Arc::new(Mutex::new(RunStatistics::default()));
        let consecutive_connection_failures = Arc::new(AtomicUsize::new(0));

        futures::stream::iter(files)
            .map(|(path, descriptor)| {
                let stats = Arc::clone(&stats);
                let failures = Arc::clone(&consecutive_connection_failures);
                async move {
                    let table_name = descriptor.trip_type.raw_table_name();

                    if self.cancel.is_cancelled() {
                        let mut skipped = LoadResult::new(&descriptor.filename, &table_name);
                        skipped.status = LoadStatus::Skipped;
                        skipped
                            .errors
                            .push("Run cancelled before this file started".to_string());
                        stats.lock().await.record(skipped);
                        return;
                    }

                    let (result, connection_exhausted) =
                        self.process_file(&path, &table_name, &descriptor).await;

                    if connection_exhausted {
                        let seen = failures.fetch_add(1, Ordering::SeqCst) + 1;
                        if seen >= self.pipeline.max_consecutive_connection_failures {
                            error!(
                                consecutive_failures = seen,
                                "Warehouse unreachable, aborting run with partial results"
                            );
                            self.cancel.cancel();
                            stats.lock().await.run_aborted = true;
                        }
                    } else if result.status == LoadStatus::Completed {
                        failures.store(0, Ordering::SeqCst);
                    }

                    stats.lock().await.record(result);
                }
            })
            .buffer_unordered(self.pipeline.max_parallel_files.max(1))
            .collect::<Vec<()>>()
            .await;

        let mut final_stats = stats.lock().await.clone();
        final_stats.total_time_seconds = run_start.elapsed().as_secs_f64();

        info!(
            files_processed = final_stats.files_processed,
            files_failed = final_stats.files_failed,
            total_records = final_stats.total_records,
            loaded_records = final_stats.loaded_records,
            elapsed_seconds = final_stats.total_time_seconds,
            run_aborted = final_stats.run_aborted,
            "Ingestion run finished"
        );

        Ok(final_stats)
    }

    /// Returns the finalized result and whether the failure was connection
    /// exhaustion (the one per-file failure the run loop escalates).
    async fn process_file(
        &self,
        path: &Path,
        table_name: &str,
        descriptor: &TripFileDescriptor,
    ) -> (LoadResult, bool) {
        let mut result = LoadResult::new(&descriptor.filename, table_name);
        let mut connection_exhausted = false;

        match self
            .load_file_inner(path, table_name, descriptor, &mut result)
            .await
        {
            Ok(()) => {
                result.status = LoadStatus::Completed;
                info!(
                    file = %descriptor.filename,
                    table = table_name,
                    loaded_records = result.loaded_records,
                    quality_score = result.data_quality_score,
                    "File load completed"
                );
            }
            Err(e) => {
                result.status = LoadStatus::Failed;
                connection_exhausted = matches!(e, Error::Connection(_));
                error!(file = %descriptor.filename, table = table_name, error = %e, "File load failed");
                match e {
                    // keep the validator's findings verbatim for diagnostics
                    Error::Validation(messages) => result.errors.extend(messages),
                    other => result.errors.push(other.to_string()),
                }
            }
        }

        result.failed_records = result.total_records - result.loaded_records;
        (result, connection_exhausted)
    }

    async fn load_file_inner(
        &self,
        path: &Path,
        table_name: &str,
        descriptor: &TripFileDescriptor,
        result: &mut LoadResult,
    ) -> Result<()> {
        let schema = self.resolver.resolve(descriptor.trip_type)?;
        let ddl = self.resolver.build_ddl(table_name, descriptor.trip_type)?;

        debug!(file = %descriptor.filename, phase = ?LoadPhase::Reading, "Opening source file");
        let file = File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

        if builder.metadata().file_metadata().num_rows() == 0 {
            // An empty month is a successful no-op, not an error.
            result.file_hash = FileHasher::new().finalize();
            info!(file = %descriptor.filename, "Source file is empty, nothing to load");
            return Ok(());
        }

        let reader = builder
            .with_batch_size(self.pipeline.batch_size)
            .build()?;

        // One connection spans the whole file; acquisition failures get
        // bounded exponential backoff before the file is given up on.
        let manager = ConnectionManager::new(Arc::clone(&self.factory));
        retry_with_backoff(&self.retry_policy, || manager.acquire()).await?;

        let outcome = self
            .write_batches(reader, &manager, &ddl, table_name, descriptor, &schema, result)
            .await;

        manager.release().await;

        result.file_hash = outcome?;
        Ok(())
    }

    async fn write_batches(
        &self,
        reader: ParquetRecordBatchReader,
        manager: &ConnectionManager,
        ddl: &str,
        table_name: &str,
        descriptor: &TripFileDescriptor,
        schema: &SchemaDescriptor,
        result: &mut LoadResult,
    ) -> Result<String> {
        manager
            .with_connection(|conn| async move { conn.execute_ddl(ddl).await })
            .await?;

        let mut hasher = FileHasher::new();
        let mut batch_index = 0usize;

        for batch in reader {
            let batch = batch?;
            let rows = batch.num_rows() as u64;
            result.total_records += rows;

            debug!(file = %descriptor.filename, batch_index, rows, phase = ?LoadPhase::Validating, "Validating batch");
            let validation = self.validator.validate(&batch, schema)?;
            for warning in &validation.warnings {
                warn!(file = %descriptor.filename, batch_index, warning = %warning, "Quality warning");
            }
            result.data_quality_score = result.data_quality_score.min(validation.quality_score);

            if !validation.is_valid {
                // Quality gate: an invalid batch rejects the whole file.
                debug!(file = %descriptor.filename, batch_index, phase = ?LoadPhase::Rejected, "Batch failed validation");
                return Err(Error::Validation(validation.errors));
            }

            hasher.update_batch(&batch)?;

            debug!(file = %descriptor.filename, batch_index, phase = ?LoadPhase::Tagging, "Tagging batch");
            let (tagged, content_hash) = self.tagger.tag(&batch, descriptor, Utc::now())?;

            debug!(file = %descriptor.filename, batch_index, content_hash = %content_hash, phase = ?LoadPhase::Writing, "Writing batch");
            let tagged_ref = &tagged;
            retry_with_backoff(&self.retry_policy, move || {
                manager.with_connection(move |conn| async move {
                    conn.write_batch(table_name, tagged_ref).await
                })
            })
            .await?;

            result.loaded_records += rows;
            debug!(file = %descriptor.filename, batch_index, phase = ?LoadPhase::Committed, "Batch committed");
            batch_index += 1;
        }

        Ok(hasher.finalize())
    }
}
