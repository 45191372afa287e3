//! Job queue engine: polls the central store, claims due jobs, and drives
//! them through the handler registry.
//!
//! # Architecture
//!
//! ```text
//! JobEngine
//!     │
//!     ├─► tick: available = max_concurrent - in_flight
//!     │        claim_pending(available)
//!     │        spawn one worker unit per claimed job
//!     │
//!     └─► per job: tenant config → quiet-hour gate → handler
//!             ├─ Ok(Sent)        → mark_complete
//!             ├─ Ok(Skipped)     → mark_complete (reason recorded)
//!             └─ Err             → retry / terminal / SMS→email fallback
//! ```
//!
//! Errors inside a single job are contained; claim failures are logged and
//! the loop continues at the next tick.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::handlers::fallback_subject;
use super::job::{Job, JobStatus, JobType, NewJob};
use super::registry::{HandlerContext, HandlerOutcome, HandlerRegistry};
use crate::kernel::WorkerKernel;

/// Configuration for the job engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long to wait between claim polls
    pub poll_interval: Duration,
    /// Upper bound on concurrently executing handlers
    pub max_concurrent_jobs: usize,
    /// Fixed delay before a failed job becomes claimable again
    pub retry_delay: Duration,
    /// Worker ID for this instance
    pub worker_id: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_concurrent_jobs: 5,
            retry_delay: Duration::from_secs(300),
            worker_id: format!("engine-{}", Uuid::new_v4()),
        }
    }
}

impl From<&crate::config::Config> for EngineConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            poll_interval: config.poll_interval,
            max_concurrent_jobs: config.max_concurrent_jobs,
            retry_delay: config.retry_delay,
            ..Default::default()
        }
    }
}

/// Polling engine that drains the communication job queue.
///
/// `start()` launches the loop; `stop()` halts claiming and waits for
/// in-flight handlers to finish.
pub struct JobEngine {
    kernel: Arc<WorkerKernel>,
    registry: Arc<HandlerRegistry>,
    config: EngineConfig,
    in_flight: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

/// Decrements the in-flight counter exactly once, regardless of how the
/// worker unit exits.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl JobEngine {
    pub fn new(
        kernel: Arc<WorkerKernel>,
        registry: Arc<HandlerRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            kernel,
            registry,
            config,
            in_flight: Arc::new(AtomicUsize::new(0)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Number of handlers currently executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Launch the polling loop as a background task.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Run the polling loop until shutdown is requested.
    pub async fn run(&self) {
        info!(
            worker_id = %self.config.worker_id,
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "job engine starting"
        );

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            if let Err(e) = self.tick().await {
                error!(error = %e, "failed to claim jobs");
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!(worker_id = %self.config.worker_id, "job engine stopped");
    }

    /// One poll: claim as many due jobs as capacity allows and spawn a
    /// worker unit for each.
    pub async fn tick(&self) -> Result<usize> {
        let in_flight = self.in_flight.load(Ordering::SeqCst);
        let available = self.config.max_concurrent_jobs.saturating_sub(in_flight);
        if available == 0 {
            return Ok(0);
        }

        let jobs = self.kernel.store.claim_pending(available as i64).await?;
        if jobs.is_empty() {
            return Ok(0);
        }

        debug!(count = jobs.len(), "claimed jobs");

        let count = jobs.len();
        for job in jobs {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            let guard = InFlightGuard(Arc::clone(&self.in_flight));
            let kernel = Arc::clone(&self.kernel);
            let registry = Arc::clone(&self.registry);
            let retry_delay = self.config.retry_delay;

            tokio::spawn(async move {
                let _guard = guard;
                process_job(kernel, registry, retry_delay, job).await;
            });
        }

        Ok(count)
    }

    /// Request shutdown: no new work is claimed, ongoing handlers run to
    /// completion.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        self.drain(Duration::from_secs(30)).await;
    }

    /// Wait until all in-flight handlers have finished, up to `timeout`.
    pub async fn drain(&self, timeout: Duration) {
        let start = tokio::time::Instant::now();
        while self.in_flight() > 0 {
            if start.elapsed() >= timeout {
                warn!(
                    in_flight = self.in_flight(),
                    "drain timed out with handlers still running"
                );
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Drive a single claimed job to its next state.
async fn process_job(
    kernel: Arc<WorkerKernel>,
    registry: Arc<HandlerRegistry>,
    retry_delay: Duration,
    job: Job,
) {
    let job_id = job.id;
    let job_type = job.job_type;

    let tenant = match kernel.tenants.get_tenant_config(&job.tenant_id).await {
        Ok(tenant) => tenant,
        Err(e) => {
            warn!(job_id, tenant_id = %job.tenant_id, error = %e, "tenant config unavailable");
            fail_job(&kernel, &job, retry_delay, &format!("tenant configuration error: {e}"))
                .await;
            return;
        }
    };

    // Quiet-hour gate: defer without consuming a retry. Urgent jobs bypass.
    if !job.urgent() {
        if let Some(window) = tenant.quiet_window() {
            let now = Utc::now();
            if window.is_quiet(now) {
                let resume = window.next_allowed(now);
                info!(job_id, tenant_id = %job.tenant_id, resume = %resume, "deferred for quiet hours");
                if let Err(e) = kernel
                    .store
                    .reschedule(
                        job_id,
                        job.retry_count,
                        resume,
                        "Deferred for quiet hours",
                        JobStatus::Pending,
                    )
                    .await
                {
                    error!(job_id, error = %e, "failed to defer job");
                }
                return;
            }
        }
    }

    let ctx = HandlerContext {
        tenant,
        kernel: Arc::clone(&kernel),
    };

    match registry.execute(&job, ctx).await {
        Ok(HandlerOutcome::Sent { message_id }) => {
            info!(job_id, job_type = %job_type, message_id = message_id.as_deref().unwrap_or(""), "job succeeded");
            if let Err(e) = kernel.store.mark_complete(job_id, None).await {
                error!(job_id, error = %e, "failed to mark job as complete");
            }
        }
        Ok(HandlerOutcome::Skipped { reason }) => {
            info!(job_id, job_type = %job_type, reason = %reason, "job skipped");
            if let Err(e) = kernel.store.mark_complete(job_id, Some(&reason)).await {
                error!(job_id, error = %e, "failed to mark job as complete");
            }
        }
        Err(e) => {
            warn!(job_id, job_type = %job_type, error = %e, "job failed");
            fail_job(&kernel, &job, retry_delay, &e.to_string()).await;
        }
    }
}

/// Failure path: retry while attempts remain, otherwise go terminal
/// (with the SMS→email fallback when applicable).
async fn fail_job(kernel: &Arc<WorkerKernel>, job: &Job, retry_delay: Duration, message: &str) {
    let attempts = job.retry_count + 1;

    if attempts < job.max_retries {
        let resume = Utc::now() + chrono::Duration::milliseconds(retry_delay.as_millis() as i64);
        debug!(job_id = job.id, attempts, resume = %resume, "scheduling retry");
        if let Err(e) = kernel
            .store
            .reschedule(job.id, attempts, resume, message, JobStatus::Pending)
            .await
        {
            error!(job_id = job.id, error = %e, "failed to reschedule job");
        }
        return;
    }

    if job.job_type == JobType::SendSms {
        if let Some(customer_id) = job.customer_id() {
            fallback_to_email(kernel, job, customer_id, message).await;
            return;
        }
    }

    if let Err(e) = kernel
        .store
        .mark_failed(job.id, message, JobStatus::Failed)
        .await
    {
        error!(job_id = job.id, error = %e, "failed to mark job as failed");
    }
}

/// SMS retries exhausted: create a companion email job targeting the
/// customer's address from the tenant DMS.
async fn fallback_to_email(
    kernel: &Arc<WorkerKernel>,
    job: &Job,
    customer_id: i64,
    message: &str,
) {
    let email = match kernel
        .tenants
        .fetch_customer_contact(&job.tenant_id, customer_id)
        .await
    {
        Ok(contact) => contact.and_then(|c| c.email),
        Err(e) => {
            warn!(job_id = job.id, customer_id, error = %e, "fallback contact lookup failed");
            None
        }
    };

    let Some(address) = email else {
        let diagnostic =
            format!("SMS failed: {message}; no fallback email for customer {customer_id}");
        if let Err(e) = kernel
            .store
            .mark_failed(job.id, &diagnostic, JobStatus::Failed)
            .await
        {
            error!(job_id = job.id, error = %e, "failed to mark job as failed");
        }
        return;
    };

    // The reference prevents duplicate fan-out if this path is re-entered.
    let reference = format!("sms_fallback_{}", job.id);
    let payload = json!({
        "to": address,
        "subject": fallback_subject(&job.payload),
        "body": job.payload_str("body").unwrap_or_default(),
        "customer_id": customer_id,
        "source_reference": reference,
        "source_job_id": job.id,
    });

    let fallback = NewJob::builder()
        .tenant_id(job.tenant_id.clone())
        .job_type(JobType::SendEmail)
        .payload(payload)
        .source_reference(reference.clone())
        .max_retries(job.max_retries)
        .build();

    match kernel.store.insert_job(fallback).await {
        Ok(result) => {
            info!(
                job_id = job.id,
                fallback_job_id = result.job_id(),
                created = result.is_created(),
                "created SMS fallback email job"
            );
            let diagnostic =
                format!("SMS failed: {message}; fallback email job created for {address}");
            if let Err(e) = kernel
                .store
                .mark_failed(job.id, &diagnostic, JobStatus::FailedFallbackEmail)
                .await
            {
                error!(job_id = job.id, error = %e, "failed to mark job as failed");
            }
        }
        Err(e) => {
            error!(job_id = job.id, error = %e, "failed to enqueue fallback email job");
            let diagnostic = format!("SMS failed: {message}; fallback enqueue failed: {e}");
            if let Err(e) = kernel
                .store
                .mark_failed(job.id, &diagnostic, JobStatus::Failed)
                .await
            {
                error!(job_id = job.id, error = %e, "failed to mark job as failed");
            }
        }
    }
}
