//! Detection module initialization.
//!
//! Rules are read from the storage rule table on every cycle, so rules
//! imported or toggled while the daemon runs take effect without a restart.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use ironwatch_core::config::IronwatchConfig;
use ironwatch_log_pipeline::{DetectionEngine, PollingWorker};
use ironwatch_storage::Storage;

use super::{DETECTION, ModuleHandle};

/// Initialize the detection polling loop.
///
/// Returns `None` if detection is disabled in configuration.
pub fn init(
    config: &IronwatchConfig,
    storage: &Storage,
    cancel: &CancellationToken,
) -> Option<ModuleHandle> {
    if !config.detection.enabled {
        tracing::info!("detection disabled in configuration");
        return None;
    }

    let engine = DetectionEngine::new(storage.clone(), &config.detection);
    let interval = Duration::from_secs(config.detection.poll_interval_secs);
    tracing::info!(
        interval_secs = config.detection.poll_interval_secs,
        max_per_cycle = config.detection.max_per_cycle,
        "initializing detection engine"
    );

    let polling = PollingWorker::new(engine, interval, cancel.clone());
    Some(ModuleHandle::new(DETECTION, Box::new(polling)))
}
