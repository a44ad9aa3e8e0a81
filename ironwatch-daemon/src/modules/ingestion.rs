//! Ingestion module initialization.
//!
//! Converts the `[listener]` and `[batch]` sections into a `PipelineConfig`,
//! builds the `IngestionPipeline` on the shared storage handle, and wraps it
//! in a `ModuleHandle`.
//!
//! ```text
//! UDP --> IntakeQueue --> ParserRouter --> BatchWriter --> Storage
//!                                              |
//!                                              +--> overflow.ndjson
//! ```

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use ironwatch_core::config::IronwatchConfig;
use ironwatch_log_pipeline::{IngestionPipelineBuilder, PipelineConfig};
use ironwatch_storage::Storage;

use super::{INGESTION, ModuleHandle};

/// Initialize the ingestion module.
///
/// # Returns
///
/// * `Ok(Some(ModuleHandle))` - Pipeline built and ready to start
/// * `Ok(None)` - Listener disabled in configuration
/// * `Err(_)` - Pipeline configuration rejected
pub fn init(
    config: &IronwatchConfig,
    storage: &Storage,
    cancel: &CancellationToken,
) -> Result<Option<ModuleHandle>> {
    if !config.listener.enabled {
        tracing::info!("ingestion disabled in configuration");
        return Ok(None);
    }

    tracing::info!(bind = %config.listener.socket_addr(), "initializing ingestion pipeline");

    let pipeline = IngestionPipelineBuilder::new()
        .config(PipelineConfig::from_core(config))
        .storage(storage.clone())
        .cancel_token(cancel.clone())
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build ingestion pipeline: {}", e))?;

    Ok(Some(ModuleHandle::new(INGESTION, Box::new(pipeline))))
}
