//! Field-extraction module initialization.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use ironwatch_core::config::IronwatchConfig;
use ironwatch_log_pipeline::{ExtractionWorker, PollingWorker};
use ironwatch_storage::Storage;

use super::{EXTRACTION, ModuleHandle};

/// Initialize the extraction backfill loop.
///
/// Returns `None` if extraction is disabled in configuration.
pub fn init(
    config: &IronwatchConfig,
    storage: &Storage,
    cancel: &CancellationToken,
) -> Option<ModuleHandle> {
    if !config.extraction.enabled {
        tracing::info!("extraction disabled in configuration");
        return None;
    }

    let worker = ExtractionWorker::new(storage.clone(), &config.extraction);
    let interval = Duration::from_secs(config.extraction.poll_interval_secs);
    tracing::info!(
        interval_secs = config.extraction.poll_interval_secs,
        batch_size = config.extraction.batch_size,
        "initializing extraction worker"
    );

    let polling = PollingWorker::new(worker, interval, cancel.clone());
    Some(ModuleHandle::new(EXTRACTION, Box::new(polling)))
}
