//! Proactive scheduler: periodic per-tenant sweeps that synthesise jobs.
//!
//! Each sweep lists tenants from the central config table, queries the
//! tenant DMS for candidates, renders message content, and enqueues
//! deduplicated jobs. The dedup check inside `insert_job` is the only
//! idempotency mechanism: sweeps re-compute candidates every run and let
//! the store reject duplicates.
//!
//! ```text
//! Scheduler
//!     ├─► service reminders        (daily)  → send_email jobs
//!     ├─► appointment confirmations (hourly) → send_sms jobs
//!     └─► invoice reminders        (daily)  → send_email jobs
//! ```
//!
//! A task failure is logged and does not affect other tasks; a tenant
//! failure inside a sweep skips that tenant only.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

use crate::config::Config;
use crate::kernel::jobs::{JobType, NewJob};
use crate::kernel::messaging::templates::{
    APPOINTMENT_CONFIRMATION, INVOICE_REMINDER, SERVICE_REMINDER,
};
use crate::kernel::WorkerKernel;

/// Start all sweep tasks.
///
/// Every sweep runs once immediately and then on its schedule.
pub async fn start_scheduler(kernel: Arc<WorkerKernel>, config: &Config) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;
    let max_retries = config.max_retries;

    // Initial sweeps on startup
    let startup_kernel = kernel.clone();
    tokio::spawn(async move {
        if let Err(e) = run_service_reminder_sweep(startup_kernel, max_retries).await {
            tracing::error!("Initial service reminder sweep failed: {}", e);
        }
    });
    let startup_kernel = kernel.clone();
    tokio::spawn(async move {
        if let Err(e) = run_appointment_confirmation_sweep(startup_kernel, max_retries).await {
            tracing::error!("Initial appointment confirmation sweep failed: {}", e);
        }
    });
    let startup_kernel = kernel.clone();
    tokio::spawn(async move {
        if let Err(e) = run_invoice_reminder_sweep(startup_kernel, max_retries).await {
            tracing::error!("Initial invoice reminder sweep failed: {}", e);
        }
    });

    // Service reminders - daily at the configured hour
    let service_kernel = kernel.clone();
    let service_job = Job::new_async(
        format!("0 0 {} * * *", config.service_reminder_hour_utc).as_str(),
        move |_uuid, _lock| {
            let kernel = service_kernel.clone();
            Box::pin(async move {
                if let Err(e) = run_service_reminder_sweep(kernel, max_retries).await {
                    tracing::error!("Service reminder sweep failed: {}", e);
                }
            })
        },
    )?;
    scheduler.add(service_job).await?;

    // Invoice reminders - daily at the configured hour
    let invoice_kernel = kernel.clone();
    let invoice_job = Job::new_async(
        format!("0 0 {} * * *", config.invoice_reminder_hour_utc).as_str(),
        move |_uuid, _lock| {
            let kernel = invoice_kernel.clone();
            Box::pin(async move {
                if let Err(e) = run_invoice_reminder_sweep(kernel, max_retries).await {
                    tracing::error!("Invoice reminder sweep failed: {}", e);
                }
            })
        },
    )?;
    scheduler.add(invoice_job).await?;

    // Appointment confirmations - fixed interval
    let appointment_kernel = kernel.clone();
    let appointment_job = Job::new_repeated_async(
        config.appointment_confirmation_interval,
        move |_uuid, _lock| {
            let kernel = appointment_kernel.clone();
            Box::pin(async move {
                if let Err(e) = run_appointment_confirmation_sweep(kernel, max_retries).await {
                    tracing::error!("Appointment confirmation sweep failed: {}", e);
                }
            })
        },
    )?;
    scheduler.add(appointment_job).await?;

    scheduler.start().await?;

    info!(
        service_reminder_hour_utc = config.service_reminder_hour_utc,
        invoice_reminder_hour_utc = config.invoice_reminder_hour_utc,
        appointment_confirmation_interval_ms =
            config.appointment_confirmation_interval.as_millis() as u64,
        "proactive scheduler started"
    );
    Ok(scheduler)
}

/// Sweep all tenants for sales due their two-year service.
pub async fn run_service_reminder_sweep(kernel: Arc<WorkerKernel>, max_retries: i32) -> Result<()> {
    info!("running service reminder sweep");
    for tenant_id in kernel.tenants.list_tenants().await? {
        if let Err(e) = sweep_tenant_service_reminders(&kernel, &tenant_id, max_retries).await {
            warn!(tenant_id = %tenant_id, error = %e, "service reminder sweep failed for tenant");
        }
    }
    Ok(())
}

async fn sweep_tenant_service_reminders(
    kernel: &Arc<WorkerKernel>,
    tenant_id: &str,
    max_retries: i32,
) -> Result<()> {
    let candidates = kernel.tenants.service_reminder_candidates(tenant_id).await?;
    let mut created = 0;
    let mut duplicates = 0;

    for candidate in candidates {
        let vars = json!({
            "first_name": candidate.first_name.as_deref().unwrap_or("there"),
            "last_name": candidate.last_name,
            "model": candidate.model.as_deref().unwrap_or("equipment"),
            "serial_number": candidate.serial_number,
            "purchase_date": candidate.purchase_date.to_string(),
        });
        let rendered = kernel.renderer.render(SERVICE_REMINDER, tenant_id, &vars).await?;

        let reference = format!("service_reminder_{}_{}", tenant_id, candidate.customer_id);
        let payload = json!({
            "to": candidate.email,
            "subject": rendered.subject,
            "body": rendered.body,
            "html_body": rendered.html_body,
            "customer_id": candidate.customer_id,
            "source_reference": reference,
        });

        let job = NewJob::builder()
            .tenant_id(tenant_id)
            .job_type(JobType::SendEmail)
            .payload(payload)
            .source_reference(reference)
            .max_retries(max_retries)
            .build();

        if kernel.store.insert_job(job).await?.is_created() {
            created += 1;
        } else {
            duplicates += 1;
        }
    }

    info!(tenant_id, created, duplicates, "service reminder sweep complete");
    Ok(())
}

/// Sweep all tenants for appointments starting tomorrow.
pub async fn run_appointment_confirmation_sweep(
    kernel: Arc<WorkerKernel>,
    max_retries: i32,
) -> Result<()> {
    info!("running appointment confirmation sweep");
    for tenant_id in kernel.tenants.list_tenants().await? {
        if let Err(e) = sweep_tenant_appointments(&kernel, &tenant_id, max_retries).await {
            warn!(tenant_id = %tenant_id, error = %e, "appointment sweep failed for tenant");
        }
    }
    Ok(())
}

async fn sweep_tenant_appointments(
    kernel: &Arc<WorkerKernel>,
    tenant_id: &str,
    max_retries: i32,
) -> Result<()> {
    let candidates = kernel
        .tenants
        .appointments_in_confirmation_window(tenant_id)
        .await?;
    let mut created = 0;
    let mut duplicates = 0;

    for candidate in candidates {
        let vars = json!({
            "first_name": candidate.first_name.as_deref().unwrap_or("there"),
            "scheduled_start": candidate.scheduled_start.format("%Y-%m-%d %H:%M UTC").to_string(),
        });
        let rendered = kernel
            .renderer
            .render(APPOINTMENT_CONFIRMATION, tenant_id, &vars)
            .await?;

        let reference = format!("appointment_{}_{}", tenant_id, candidate.appointment_id);
        let payload = json!({
            "to": candidate.phone,
            "body": rendered.body,
            "subject": rendered.subject,
            "customer_id": candidate.customer_id,
            "source_reference": reference,
        });

        let job = NewJob::builder()
            .tenant_id(tenant_id)
            .job_type(JobType::SendSms)
            .payload(payload)
            .source_reference(reference)
            .max_retries(max_retries)
            .build();

        if kernel.store.insert_job(job).await?.is_created() {
            created += 1;
        } else {
            duplicates += 1;
        }
    }

    info!(tenant_id, created, duplicates, "appointment confirmation sweep complete");
    Ok(())
}

/// Sweep all tenants for invoices at least 30 days past due.
pub async fn run_invoice_reminder_sweep(kernel: Arc<WorkerKernel>, max_retries: i32) -> Result<()> {
    info!("running invoice reminder sweep");
    for tenant_id in kernel.tenants.list_tenants().await? {
        if let Err(e) = sweep_tenant_invoices(&kernel, &tenant_id, max_retries).await {
            warn!(tenant_id = %tenant_id, error = %e, "invoice sweep failed for tenant");
        }
    }
    Ok(())
}

async fn sweep_tenant_invoices(
    kernel: &Arc<WorkerKernel>,
    tenant_id: &str,
    max_retries: i32,
) -> Result<()> {
    let invoices = kernel.tenants.past_due_invoices(tenant_id).await?;
    let today = Utc::now().date_naive();
    let mut created = 0;
    let mut duplicates = 0;

    for invoice in invoices {
        let vars = json!({
            "first_name": invoice.first_name.as_deref().unwrap_or("there"),
            "invoice_id": invoice.invoice_id,
            "balance": invoice.balance.to_string(),
            "due_date": invoice.due_date.to_string(),
            "days_past_due": invoice.days_past_due(today),
        });
        let rendered = kernel.renderer.render(INVOICE_REMINDER, tenant_id, &vars).await?;

        let reference = format!("invoice_{}_{}", tenant_id, invoice.invoice_id);
        let payload = json!({
            "to": invoice.email,
            "subject": rendered.subject,
            "body": rendered.body,
            "html_body": rendered.html_body,
            "customer_id": invoice.customer_id,
            "source_reference": reference,
        });

        let job = NewJob::builder()
            .tenant_id(tenant_id)
            .job_type(JobType::SendEmail)
            .payload(payload)
            .source_reference(reference)
            .max_retries(max_retries)
            .build();

        if kernel.store.insert_job(job).await?.is_created() {
            created += 1;
        } else {
            duplicates += 1;
        }
    }

    info!(tenant_id, created, duplicates, "invoice reminder sweep complete");
    Ok(())
}
