//! End-to-end engine scenarios against the in-memory store and stub ports.

mod common;

use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use common::*;
use worker_core::kernel::jobs::{JobStatus, JobStore, JobType, NewJob};
use worker_core::kernel::messaging::DeliveryOutcome;

async fn seed_job(harness: &TestHarness, job: NewJob) -> i64 {
    harness
        .store
        .insert_job(job)
        .await
        .expect("insert failed")
        .job_id()
}

fn email_job(tenant_id: &str) -> NewJob {
    NewJob::builder()
        .tenant_id(tenant_id)
        .job_type(JobType::SendEmail)
        .payload(json!({"to": "a@b.example", "subject": "Hi", "body": "x"}))
        .build()
}

#[tokio::test]
async fn happy_path_email_completes() {
    let harness = TestHarness::new(StubTenantGateway::new().with_tenant(tenant("t1")));
    let job_id = seed_job(&harness, email_job("t1")).await;

    let engine = harness.engine();
    assert_eq!(harness.run_tick(&engine).await, 1);

    let job = harness.store.get(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    assert!(job.completed_at.is_some());
    assert_eq!(harness.email.sent_count(), 1);
    assert_eq!(harness.email.sent()[0].to, "a@b.example");
    assert_eq!(harness.email.sent()[0].from, "noreply@dealer.example");
}

#[tokio::test]
async fn completed_jobs_are_not_redelivered() {
    let harness = TestHarness::new(StubTenantGateway::new().with_tenant(tenant("t1")));
    seed_job(&harness, email_job("t1")).await;

    let engine = harness.engine();
    assert_eq!(harness.run_tick(&engine).await, 1);
    assert_eq!(harness.run_tick(&engine).await, 0);
    assert_eq!(harness.email.sent_count(), 1);
}

#[tokio::test]
async fn transient_failures_then_success() {
    let harness = TestHarness::new(StubTenantGateway::new().with_tenant(tenant("t1")));
    harness
        .email
        .queue_outcome(DeliveryOutcome::rejected("rate limited"));
    harness
        .email
        .queue_outcome(DeliveryOutcome::rejected("rate limited"));

    let job_id = seed_job(&harness, email_job("t1")).await;
    let engine = harness.engine();

    harness.run_tick(&engine).await;
    let job = harness.store.get(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 1);
    assert!(job.last_error.as_deref().unwrap().contains("rate limited"));

    harness.run_tick(&engine).await;
    let job = harness.store.get(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 2);

    harness.run_tick(&engine).await;
    let job = harness.store.get(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    assert_eq!(harness.email.sent_count(), 3);
}

#[tokio::test]
async fn exhausted_retries_go_terminal() {
    let harness = TestHarness::new(StubTenantGateway::new().with_tenant(tenant("t1")));
    harness.email.fail_always();

    let job_id = seed_job(&harness, email_job("t1")).await;
    let engine = harness.engine();

    for _ in 0..3 {
        harness.run_tick(&engine).await;
    }

    let job = harness.store.get(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 2);
    assert!(job.last_error.is_some());
}

#[tokio::test]
async fn max_retries_zero_fails_on_first_attempt() {
    let harness = TestHarness::new(StubTenantGateway::new().with_tenant(tenant("t1")));
    harness.email.fail_always();

    let job = NewJob::builder()
        .tenant_id("t1")
        .job_type(JobType::SendEmail)
        .payload(json!({"to": "a@b.example", "subject": "Hi", "body": "x"}))
        .max_retries(0)
        .build();
    let job_id = seed_job(&harness, job).await;

    let engine = harness.engine();
    harness.run_tick(&engine).await;

    let job = harness.store.get(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 0);
}

#[tokio::test]
async fn quiet_hours_defer_preserves_retry_count() {
    let (start, end) = quiet_window_containing_now();
    let mut config = tenant("t1");
    config.quiet_hours_start = Some(start);
    config.quiet_hours_end = Some(end);

    let harness = TestHarness::new(StubTenantGateway::new().with_tenant(config));
    let job_id = seed_job(&harness, email_job("t1")).await;

    let engine = harness.engine();
    let before = Utc::now();
    harness.run_tick(&engine).await;

    let job = harness.store.get(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 0);
    assert_eq!(job.last_error.as_deref(), Some("Deferred for quiet hours"));
    assert!(job.process_after > before);
    assert_eq!(harness.email.sent_count(), 0);
}

#[tokio::test]
async fn urgent_jobs_bypass_quiet_hours() {
    let (start, end) = quiet_window_containing_now();
    let mut config = tenant("t1");
    config.quiet_hours_start = Some(start);
    config.quiet_hours_end = Some(end);

    let harness = TestHarness::new(StubTenantGateway::new().with_tenant(config));
    let job = NewJob::builder()
        .tenant_id("t1")
        .job_type(JobType::SendEmail)
        .payload(json!({"to": "a@b.example", "subject": "Hi", "body": "x", "urgent": true}))
        .build();
    let job_id = seed_job(&harness, job).await;

    let engine = harness.engine();
    harness.run_tick(&engine).await;

    let job = harness.store.get(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    assert_eq!(harness.email.sent_count(), 1);
}

#[tokio::test]
async fn sms_fallback_creates_companion_email_job() {
    let harness = TestHarness::new(
        StubTenantGateway::new()
            .with_tenant(tenant("t1"))
            .with_contact("t1", contact(42)),
    );
    harness.sms.fail_always();

    let job = NewJob::builder()
        .tenant_id("t1")
        .job_type(JobType::SendSms)
        .payload(json!({
            "to": "+15550001234",
            "body": "Your appointment is tomorrow",
            "subject": "Appointment Reminder",
            "customer_id": 42,
        }))
        .build();
    let job_id = seed_job(&harness, job).await;

    let engine = harness.engine();
    for _ in 0..3 {
        harness.run_tick(&engine).await;
    }

    let original = harness.store.get(job_id).unwrap();
    assert_eq!(original.status, JobStatus::FailedFallbackEmail);
    assert!(original
        .last_error
        .as_deref()
        .unwrap()
        .contains("sam@customer.example"));

    let fallback = harness
        .store
        .all()
        .into_iter()
        .find(|j| j.job_type == JobType::SendEmail)
        .expect("fallback job missing");
    assert_eq!(
        fallback.source_reference.as_deref(),
        Some(format!("sms_fallback_{job_id}").as_str())
    );
    assert_eq!(fallback.payload["to"], "sam@customer.example");
    assert_eq!(fallback.payload["subject"], "Appointment Reminder");
    assert_eq!(fallback.payload["body"], "Your appointment is tomorrow");
    assert_eq!(fallback.status, JobStatus::Pending);

    // Re-running the failure path cannot fan out twice.
    harness.run_tick(&engine).await;
    let email_jobs: Vec<_> = harness
        .store
        .all()
        .into_iter()
        .filter(|j| j.job_type == JobType::SendEmail)
        .collect();
    assert_eq!(email_jobs.len(), 1);
}

#[tokio::test]
async fn sms_fallback_without_email_goes_failed() {
    let mut customer = contact(42);
    customer.email = None;

    let harness = TestHarness::new(
        StubTenantGateway::new()
            .with_tenant(tenant("t1"))
            .with_contact("t1", customer),
    );
    harness.sms.fail_always();

    let job = NewJob::builder()
        .tenant_id("t1")
        .job_type(JobType::SendSms)
        .payload(json!({"to": "+15550001234", "body": "hello", "customer_id": 42}))
        .build();
    let job_id = seed_job(&harness, job).await;

    let engine = harness.engine();
    for _ in 0..3 {
        harness.run_tick(&engine).await;
    }

    let job = harness.store.get(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job
        .last_error
        .as_deref()
        .unwrap()
        .contains("no fallback email for customer 42"));
    assert_eq!(harness.store.count(), 1);
}

#[tokio::test]
async fn notify_customer_skips_on_do_not_contact() {
    let mut customer = contact(7);
    customer.contact_preference = Some("do_not_contact".to_string());

    let harness = TestHarness::new(
        StubTenantGateway::new()
            .with_tenant(tenant("t1"))
            .with_contact("t1", customer),
    );
    let job = NewJob::builder()
        .tenant_id("t1")
        .job_type(JobType::NotifyCustomer)
        .payload(json!({"customer_id": 7, "body": "service is due"}))
        .build();
    let job_id = seed_job(&harness, job).await;

    let engine = harness.engine();
    harness.run_tick(&engine).await;

    let job = harness.store.get(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    assert!(job.last_error.as_deref().unwrap().contains("do_not_contact"));
    assert_eq!(harness.email.sent_count(), 0);
    assert_eq!(harness.sms.sent_count(), 0);
}

#[tokio::test]
async fn notify_customer_follows_dms_preference() {
    let mut customer = contact(7);
    customer.contact_preference = Some("sms".to_string());

    let harness = TestHarness::new(
        StubTenantGateway::new()
            .with_tenant(tenant("t1"))
            .with_contact("t1", customer),
    );
    let job = NewJob::builder()
        .tenant_id("t1")
        .job_type(JobType::NotifyCustomer)
        .payload(json!({"customer_id": 7, "body": "service is due", "preferred_channel": "email"}))
        .build();
    let job_id = seed_job(&harness, job).await;

    let engine = harness.engine();
    harness.run_tick(&engine).await;

    assert_eq!(harness.store.get(job_id).unwrap().status, JobStatus::Complete);
    assert_eq!(harness.sms.sent_count(), 1);
    assert_eq!(harness.email.sent_count(), 0);
    assert_eq!(harness.sms.sent()[0].to, "+15550001234");
}

#[tokio::test]
async fn notify_customer_derives_channel_from_contact_data() {
    let mut customer = contact(7);
    customer.phone = None;

    let harness = TestHarness::new(
        StubTenantGateway::new()
            .with_tenant(tenant("t1"))
            .with_contact("t1", customer),
    );
    let job = NewJob::builder()
        .tenant_id("t1")
        .job_type(JobType::NotifyCustomer)
        .payload(json!({"customer_id": 7, "body": "service is due"}))
        .build();
    let job_id = seed_job(&harness, job).await;

    let engine = harness.engine();
    harness.run_tick(&engine).await;

    assert_eq!(harness.store.get(job_id).unwrap().status, JobStatus::Complete);
    assert_eq!(harness.email.sent_count(), 1);
    assert_eq!(harness.email.sent()[0].to, "sam@customer.example");
}

#[tokio::test]
async fn notify_customer_missing_datum_exhausts_and_fails() {
    let mut customer = contact(7);
    customer.contact_preference = Some("email".to_string());
    customer.email = None;

    let harness = TestHarness::new(
        StubTenantGateway::new()
            .with_tenant(tenant("t1"))
            .with_contact("t1", customer),
    );
    let job = NewJob::builder()
        .tenant_id("t1")
        .job_type(JobType::NotifyCustomer)
        .payload(json!({"customer_id": 7, "body": "service is due"}))
        .max_retries(1)
        .build();
    let job_id = seed_job(&harness, job).await;

    let engine = harness.engine();
    harness.run_tick(&engine).await;

    let job = harness.store.get(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.last_error.as_deref().unwrap().contains("no email address"));
}

#[tokio::test]
async fn unknown_tenant_consumes_retries() {
    let harness = TestHarness::new(StubTenantGateway::new());

    let job = NewJob::builder()
        .tenant_id("ghost")
        .job_type(JobType::SendEmail)
        .payload(json!({"to": "a@b.example", "subject": "Hi", "body": "x"}))
        .max_retries(1)
        .build();
    let job_id = seed_job(&harness, job).await;

    let engine = harness.engine();
    harness.run_tick(&engine).await;

    let job = harness.store.get(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job
        .last_error
        .as_deref()
        .unwrap()
        .contains("tenant configuration error"));
}

#[tokio::test]
async fn deferred_jobs_are_invisible_until_due() {
    let harness = TestHarness::new(StubTenantGateway::new().with_tenant(tenant("t1")));

    let job = NewJob::builder()
        .tenant_id("t1")
        .job_type(JobType::SendEmail)
        .payload(json!({"to": "a@b.example", "subject": "Hi", "body": "x"}))
        .process_after(Utc::now() + chrono::Duration::hours(1))
        .build();
    seed_job(&harness, job).await;

    let engine = harness.engine();
    assert_eq!(harness.run_tick(&engine).await, 0);
    assert_eq!(harness.email.sent_count(), 0);
}

#[tokio::test]
async fn claim_pending_zero_returns_empty() {
    let harness = TestHarness::new(StubTenantGateway::new().with_tenant(tenant("t1")));
    seed_job(&harness, email_job("t1")).await;

    let claimed = harness.store.claim_pending(0).await.unwrap();
    assert!(claimed.is_empty());
    assert_eq!(
        harness.store.all()[0].status,
        JobStatus::Pending,
        "claim with zero limit must not touch the store"
    );
}

#[tokio::test]
async fn engine_respects_concurrency_bound() {
    let harness = TestHarness::new(StubTenantGateway::new().with_tenant(tenant("t1")));
    for _ in 0..5 {
        seed_job(&harness, email_job("t1")).await;
    }

    let engine = harness.engine_with(Duration::ZERO, 2);
    assert_eq!(harness.run_tick(&engine).await, 2);
    assert_eq!(harness.run_tick(&engine).await, 2);
    assert_eq!(harness.run_tick(&engine).await, 1);
    assert_eq!(harness.email.sent_count(), 5);
}

#[tokio::test]
async fn stop_then_start_resumes_without_redelivery() {
    let harness = TestHarness::new(StubTenantGateway::new().with_tenant(tenant("t1")));
    let first = seed_job(&harness, email_job("t1")).await;

    let engine = harness.engine();
    let handle = engine.clone().start();
    wait_for_status(&harness, first, JobStatus::Complete).await;
    engine.stop().await;
    let _ = handle.await;

    let second = seed_job(&harness, email_job("t1")).await;
    let engine = harness.engine();
    let handle = engine.clone().start();
    wait_for_status(&harness, second, JobStatus::Complete).await;
    engine.stop().await;
    let _ = handle.await;

    // The first job was delivered exactly once.
    assert_eq!(harness.email.sent_count(), 2);
    assert_eq!(
        harness.store.get(first).unwrap().status,
        JobStatus::Complete
    );
}

async fn wait_for_status(harness: &TestHarness, job_id: i64, status: JobStatus) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if harness.store.get(job_id).map(|j| j.status) == Some(status) {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("job {job_id} never reached {status:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
