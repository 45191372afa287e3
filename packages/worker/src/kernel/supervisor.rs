//! Process-wide lifecycle: start the engine and scheduler, handle signals,
//! drain gracefully.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use super::jobs::{default_registry, EngineConfig, JobEngine};
use super::scheduler::start_scheduler;
use super::WorkerKernel;
use crate::config::Config;

/// Runs the worker until a termination signal arrives, then drains:
/// no new claims, in-flight handlers finish, pools close.
pub struct Supervisor {
    kernel: Arc<WorkerKernel>,
    config: Config,
}

impl Supervisor {
    pub fn new(kernel: Arc<WorkerKernel>, config: Config) -> Self {
        Self { kernel, config }
    }

    pub async fn run(self) -> Result<()> {
        let registry = Arc::new(default_registry());
        let engine = Arc::new(JobEngine::new(
            Arc::clone(&self.kernel),
            registry,
            EngineConfig::from(&self.config),
        ));

        let engine_task = Arc::clone(&engine).start();
        let mut scheduler = start_scheduler(Arc::clone(&self.kernel), &self.config).await?;

        wait_for_shutdown_signal().await?;
        info!("shutdown signal received, draining");

        scheduler
            .shutdown()
            .await
            .context("failed to stop scheduler")?;
        engine.stop().await;
        let _ = engine_task.await;

        self.kernel.tenants.close().await;
        self.kernel.db_pool.close().await;

        info!("worker stopped");
        Ok(())
    }
}

/// Resolve on SIGINT or SIGTERM.
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for SIGINT")?;
            }
            _ = sigterm.recv() => {}
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for SIGINT")?;
        Ok(())
    }
}
