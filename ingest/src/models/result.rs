use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    Completed,
    Failed,
    Skipped,
}

/// Outcome of loading one source file. Created when the load attempt starts,
/// filled in as batches commit, immutable once returned.
#[derive(Debug, Clone, Serialize)]
pub struct LoadResult {
    pub status: LoadStatus,
    pub filename: String,
    pub table_name: String,
    pub total_records: u64,
    pub loaded_records: u64,
    pub failed_records: u64,
    pub data_quality_score: f64,
    pub file_hash: String,
    pub load_timestamp: DateTime<Utc>,
    pub errors: Vec<String>,
}

impl LoadResult {
    pub fn new(filename: &str, table_name: &str) -> Self {
        Self {
            status: LoadStatus::Failed,
            filename: filename.to_string(),
            table_name: table_name.to_string(),
            total_records: 0,
            loaded_records: 0,
            failed_records: 0,
            data_quality_score: 100.0,
            file_hash: String::new(),
            load_timestamp: Utc::now(),
            errors: Vec::new(),
        }
    }
}

/// Aggregate statistics over one multi-file run. Mutated only by the batch
/// loader's accumulation step, behind a lock in parallel mode.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStatistics {
    pub files_processed: u64,
    pub files_failed: u64,
    pub total_records: u64,
    pub loaded_records: u64,
    pub total_time_seconds: f64,
    /// True when repeated connection exhaustion stopped the run early;
    /// the per-file results below are then partial.
    pub run_aborted: bool,
    pub results: Vec<LoadResult>,
}

impl RunStatistics {
    pub fn record(&mut self, result: LoadResult) {
        // skipped files were never attempted and do not count as processed
        if result.status != LoadStatus::Skipped {
            self.files_processed += 1;
        }
        if result.status == LoadStatus::Failed {
            self.files_failed += 1;
        }
        self.total_records += result.total_records;
        self.loaded_records += result.loaded_records;
        self.results.push(result);
    }
}
