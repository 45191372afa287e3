//! Proactive sweep scenarios: candidate discovery, rendering, and dedup.

mod common;

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;

use common::*;
use worker_core::kernel::scheduler::{
    run_appointment_confirmation_sweep, run_invoice_reminder_sweep, run_service_reminder_sweep,
};
use worker_core::kernel::jobs::{JobStatus, JobType};
use worker_core::kernel::tenants::{
    AppointmentCandidate, PastDueInvoice, ServiceReminderCandidate,
};

fn service_candidate(customer_id: i64) -> ServiceReminderCandidate {
    ServiceReminderCandidate {
        customer_id,
        first_name: Some("Sam".to_string()),
        last_name: Some("Taylor".to_string()),
        email: "sam@customer.example".to_string(),
        model: Some("KX-200".to_string()),
        serial_number: Some("SN-0042".to_string()),
        purchase_date: NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
    }
}

#[tokio::test]
async fn consecutive_service_sweeps_enqueue_once() {
    let harness = TestHarness::new(
        StubTenantGateway::new()
            .with_tenant(tenant("t1"))
            .with_service_candidate("t1", service_candidate(42)),
    );

    run_service_reminder_sweep(harness.kernel.clone(), 3)
        .await
        .unwrap();
    run_service_reminder_sweep(harness.kernel.clone(), 3)
        .await
        .unwrap();

    let jobs = harness.store.all();
    assert_eq!(jobs.len(), 1);

    let job = &jobs[0];
    assert_eq!(job.job_type, JobType::SendEmail);
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.source_reference.as_deref(), Some("service_reminder_t1_42"));
    assert_eq!(job.payload["to"], "sam@customer.example");
    assert_eq!(job.max_retries, 3);
}

#[tokio::test]
async fn appointment_sweep_enqueues_sms_with_reference() {
    let harness = TestHarness::new(
        StubTenantGateway::new()
            .with_tenant(tenant("t1"))
            .with_appointment(
                "t1",
                AppointmentCandidate {
                    appointment_id: 9,
                    customer_id: 42,
                    first_name: Some("Sam".to_string()),
                    phone: "+15550001234".to_string(),
                    scheduled_start: Utc::now() + Duration::hours(24),
                },
            ),
    );

    run_appointment_confirmation_sweep(harness.kernel.clone(), 3)
        .await
        .unwrap();

    let jobs = harness.store.all();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job_type, JobType::SendSms);
    assert_eq!(jobs[0].source_reference.as_deref(), Some("appointment_t1_9"));
    assert_eq!(jobs[0].payload["to"], "+15550001234");
}

#[tokio::test]
async fn invoice_sweep_enqueues_email_per_invoice() {
    let harness = TestHarness::new(
        StubTenantGateway::new()
            .with_tenant(tenant("t1"))
            .with_invoice(
                "t1",
                PastDueInvoice {
                    invoice_id: 77,
                    customer_id: 42,
                    first_name: Some("Sam".to_string()),
                    email: "sam@customer.example".to_string(),
                    due_date: (Utc::now() - Duration::days(45)).date_naive(),
                    balance: Decimal::new(12500, 2),
                },
            )
            .with_invoice(
                "t1",
                PastDueInvoice {
                    invoice_id: 78,
                    customer_id: 43,
                    first_name: None,
                    email: "pat@customer.example".to_string(),
                    due_date: (Utc::now() - Duration::days(60)).date_naive(),
                    balance: Decimal::new(9900, 2),
                },
            ),
    );

    run_invoice_reminder_sweep(harness.kernel.clone(), 3)
        .await
        .unwrap();

    let jobs = harness.store.all();
    assert_eq!(jobs.len(), 2);
    let references: Vec<_> = jobs
        .iter()
        .filter_map(|j| j.source_reference.as_deref())
        .collect();
    assert!(references.contains(&"invoice_t1_77"));
    assert!(references.contains(&"invoice_t1_78"));
}

#[tokio::test]
async fn sweep_skips_failing_tenant_and_continues() {
    // t1 has no candidates configured but exists; the sweep over both
    // tenants still enqueues t2's job even though t1 contributes nothing.
    let harness = TestHarness::new(
        StubTenantGateway::new()
            .with_tenant(tenant("t1"))
            .with_tenant(tenant("t2"))
            .with_service_candidate("t2", service_candidate(7)),
    );

    run_service_reminder_sweep(harness.kernel.clone(), 3)
        .await
        .unwrap();

    let jobs = harness.store.all();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].tenant_id, "t2");
}

#[tokio::test]
async fn swept_job_is_deliverable_end_to_end() {
    let harness = TestHarness::new(
        StubTenantGateway::new()
            .with_tenant(tenant("t1"))
            .with_service_candidate("t1", service_candidate(42)),
    );

    run_service_reminder_sweep(harness.kernel.clone(), 3)
        .await
        .unwrap();

    let engine = harness.engine();
    harness.run_tick(&engine).await;

    let jobs = harness.store.all();
    assert_eq!(jobs[0].status, JobStatus::Complete);
    assert_eq!(harness.email.sent_count(), 1);
    assert_eq!(harness.email.sent()[0].subject, "service_reminder subject");
}
