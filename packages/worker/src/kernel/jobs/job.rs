//! Job model for outbound communication work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use typed_builder::TypedBuilder;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "communication_job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Complete,
    Failed,
    Cancelled,
    /// Terminal state of an SMS job whose retries exhausted and for which a
    /// companion email job was created.
    FailedFallbackEmail,
}

impl JobStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Complete
                | JobStatus::Failed
                | JobStatus::Cancelled
                | JobStatus::FailedFallbackEmail
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "communication_job_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    SendEmail,
    SendSms,
    NotifyCustomer,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::SendEmail => "send_email",
            JobType::SendSms => "send_sms",
            JobType::NotifyCustomer => "notify_customer",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Job Model
// ============================================================================

/// A durable row in `communication_jobs`.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub tenant_id: String,
    pub job_type: JobType,
    pub payload: Value,
    pub status: JobStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub last_error: Option<String>,
    /// The job is invisible to the claim primitive until this instant.
    pub process_after: DateTime<Utc>,
    /// Idempotency key scoped by (tenant_id, job_type).
    pub source_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Urgent jobs bypass the quiet-hour gate.
    pub fn urgent(&self) -> bool {
        self.payload
            .get("urgent")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Customer id carried in the payload, if any. Accepts both numeric and
    /// string encodings since payloads originate from several producers.
    pub fn customer_id(&self) -> Option<i64> {
        match self.payload.get("customer_id") {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
    }

    /// String field from the payload.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// Insertion parameters for a new job.
#[derive(Debug, Clone, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct NewJob {
    pub tenant_id: String,
    pub job_type: JobType,
    pub payload: Value,
    #[builder(default, setter(strip_option))]
    pub process_after: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub source_reference: Option<String>,
    #[builder(default = 3)]
    pub max_retries: i32,
}
