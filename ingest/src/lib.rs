pub mod lineage;
pub mod loader;
pub mod models;
pub mod quality;
pub mod schema;
pub mod utils;
pub mod warehouse;

use crate::loader::BatchLoader;
use crate::models::{RunStatistics, TripFileDescriptor};
use crate::schema::FileSizeEstimator;
use crate::warehouse::DryRunFactory;
use common::config::Settings;
use common::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Discover monthly trip files under the configured data directory and run
/// them through the loader in dry-run mode. Real warehouse wiring happens in
/// the orchestrator, which supplies its own `ConnectionFactory`.
pub async fn run_ingestion_pipeline(config_path: &str) -> Result<RunStatistics> {
    let settings = Settings::new(config_path)?;
    let estimator = FileSizeEstimator::new(settings.size_estimates.clone());

    let files = discover_files(&settings.pipeline.data_dir, &estimator)?;
    info!(files = files.len(), data_dir = %settings.pipeline.data_dir, "Discovered source files");

    let loader = BatchLoader::new(Arc::new(DryRunFactory), &settings);
    loader.run(files).await
}

fn discover_files(
    data_dir: &str,
    estimator: &FileSizeEstimator,
) -> Result<Vec<(PathBuf, TripFileDescriptor)>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(data_dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(".parquet") {
            continue;
        }

        match TripFileDescriptor::parse_filename(name) {
            Ok((trip_type, year, month)) => {
                let descriptor = TripFileDescriptor::new(
                    trip_type,
                    year,
                    month,
                    estimator.estimate_mb(trip_type),
                )?;
                files.push((path, descriptor));
            }
            Err(e) => {
                warn!(file = name, error = %e, "Skipping unrecognized file");
            }
        }
    }

    files.sort_by(|a, b| a.1.filename.cmp(&b.1.filename));
    Ok(files)
}
