//! Module registry and initialization.
//!
//! Each long-running loop (ingestion, extraction, detection) is wrapped as a
//! [`ModuleHandle`] that exposes uniform lifecycle control via the
//! [`DynPipeline`] trait.
//!
//! The [`ModuleRegistry`] keeps modules in start order. `stop_all` walks the
//! list backwards.

pub mod detection;
pub mod extraction;
pub mod ingestion;

use anyhow::Result;

use ironwatch_core::error::{IronwatchError, PipelineError};
use ironwatch_core::pipeline::{DynPipeline, HealthStatus};
use ironwatch_core::status::ModuleStatus;

use crate::health::ModuleHealth;

/// Module name of the UDP ingestion pipeline.
pub const INGESTION: &str = "ingestion";
/// Module name of the field-extraction backfill loop.
pub const EXTRACTION: &str = "extraction";
/// Module name of the detection polling loop.
pub const DETECTION: &str = "detection";

/// A handle to a registered module.
pub struct ModuleHandle {
    /// Module name for logging, status and operator commands.
    pub name: String,
    /// The module's pipeline implementation (start/stop/health_check/status).
    pub pipeline: Box<dyn DynPipeline>,
}

impl ModuleHandle {
    pub fn new(name: impl Into<String>, pipeline: Box<dyn DynPipeline>) -> Self {
        Self {
            name: name.into(),
            pipeline,
        }
    }

    pub async fn health_check(&self) -> HealthStatus {
        self.pipeline.health_check().await
    }

    /// Health plus counter snapshot.
    pub async fn status(&self) -> ModuleStatus {
        let health = self.pipeline.health_check().await;
        ModuleStatus::new(self.name.clone(), health, self.pipeline.status())
    }
}

/// Registry of the daemon's modules, in start order.
pub struct ModuleRegistry {
    modules: Vec<ModuleHandle>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// Register a module. Registration order is start order.
    ///
    /// # Errors
    ///
    /// Returns an error if a module with the same name is already registered.
    pub fn register(&mut self, handle: ModuleHandle) -> Result<()> {
        if self.get(&handle.name).is_some() {
            return Err(anyhow::anyhow!(
                "module '{}' is already registered",
                handle.name
            ));
        }
        self.modules.push(handle);
        Ok(())
    }

    /// Start all modules in registration order.
    ///
    /// Returns an error on the first module that fails to start.
    /// Already-started modules are NOT rolled back; the caller should
    /// invoke `stop_all` if partial startup is unacceptable.
    pub async fn start_all(&mut self) -> Result<()> {
        for handle in &mut self.modules {
            tracing::info!(module = %handle.name, "starting module");
            handle
                .pipeline
                .start()
                .await
                .map_err(|e| anyhow::anyhow!("failed to start module '{}': {}", handle.name, e))?;
            tracing::info!(module = %handle.name, "module started");
        }
        Ok(())
    }

    /// Stop all modules in reverse registration order.
    ///
    /// Logs errors but continues stopping remaining modules. A module that
    /// was never started (or is already stopped) is skipped.
    pub async fn stop_all(&mut self) -> Result<()> {
        let mut errors = Vec::new();

        for handle in self.modules.iter_mut().rev() {
            tracing::info!(module = %handle.name, "stopping module");
            match handle.pipeline.stop().await {
                Ok(()) => tracing::info!(module = %handle.name, "module stopped"),
                Err(IronwatchError::Pipeline(PipelineError::NotRunning)) => {
                    tracing::debug!(module = %handle.name, "module not running");
                }
                Err(e) => {
                    tracing::error!(
                        module = %handle.name,
                        error = %e,
                        "failed to stop module"
                    );
                    errors.push(format!("{}: {}", handle.name, e));
                }
            }
        }

        if !errors.is_empty() {
            return Err(anyhow::anyhow!(
                "errors stopping modules: {}",
                errors.join("; ")
            ));
        }

        Ok(())
    }

    /// Start a single module by name.
    pub async fn start_module(&mut self, name: &str) -> Result<()> {
        let handle = self.get_mut(name)?;
        handle
            .pipeline
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start module '{}': {}", name, e))?;
        tracing::info!(module = %name, "module started");
        Ok(())
    }

    /// Stop a single module by name.
    pub async fn stop_module(&mut self, name: &str) -> Result<()> {
        let handle = self.get_mut(name)?;
        handle
            .pipeline
            .stop()
            .await
            .map_err(|e| anyhow::anyhow!("failed to stop module '{}': {}", name, e))?;
        tracing::info!(module = %name, "module stopped");
        Ok(())
    }

    /// Health status of every module, in start order.
    pub async fn health_statuses(&self) -> Vec<ModuleHealth> {
        let mut statuses = Vec::with_capacity(self.modules.len());
        for handle in &self.modules {
            statuses.push(ModuleHealth {
                name: handle.name.clone(),
                status: handle.health_check().await,
            });
        }
        statuses
    }

    /// Status snapshot of every module, in start order.
    pub async fn statuses(&self) -> Vec<ModuleStatus> {
        let mut statuses = Vec::with_capacity(self.modules.len());
        for handle in &self.modules {
            statuses.push(handle.status().await);
        }
        statuses
    }

    pub fn get(&self, name: &str) -> Option<&ModuleHandle> {
        self.modules.iter().find(|m| m.name == name)
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut ModuleHandle> {
        self.modules
            .iter_mut()
            .find(|m| m.name == name)
            .ok_or_else(|| anyhow::anyhow!("unknown or disabled module '{}'", name))
    }

    /// Registered module names, in start order.
    pub fn names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name.as_str()).collect()
    }

    /// Number of registered modules.
    pub fn count(&self) -> usize {
        self.modules.len()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
