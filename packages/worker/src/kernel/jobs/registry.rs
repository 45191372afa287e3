//! Handler registry: the dispatch table keyed by job type.
//!
//! Handlers are stateless async functions with the contract
//! `(payload, HandlerContext) -> Result<HandlerOutcome, HandlerError>`.
//! The registry deserializes the job's JSON payload into the handler's
//! typed payload struct and invokes it; the engine maps the outcome onto
//! the job row.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use super::job::{Job, JobType};
use crate::kernel::tenants::TenantConfig;
use crate::kernel::WorkerKernel;

/// What a handler produced for a claimed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The message was handed to the provider.
    Sent { message_id: Option<String> },
    /// The job completed without sending; the reason is recorded on the row.
    Skipped { reason: String },
}

/// Failure kinds surfaced by handlers.
///
/// The engine treats every kind uniformly in the failure path (each failure
/// consumes a retry until `max_retries`); the kinds exist for diagnostics.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("tenant configuration error: {0}")]
    Configuration(String),

    #[error("missing contact information: {0}")]
    MissingContact(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("no handler registered for job type {0}")]
    Unregistered(JobType),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type HandlerResult = Result<HandlerOutcome, HandlerError>;

/// Per-job context handed to handlers.
#[derive(Clone)]
pub struct HandlerContext {
    pub tenant: Arc<TenantConfig>,
    pub kernel: Arc<WorkerKernel>,
}

type BoxedHandler = Box<
    dyn Fn(Value, HandlerContext) -> Pin<Box<dyn Future<Output = HandlerResult> + Send>>
        + Send
        + Sync,
>;

/// Registry that maps job types to handlers.
///
/// The job types are a small closed set, so this is a plain dispatch table
/// populated once at startup.
#[derive(Default)]
pub struct HandlerRegistry {
    registrations: HashMap<JobType, BoxedHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            registrations: HashMap::new(),
        }
    }

    /// Register a handler for a job type.
    ///
    /// The handler receives the deserialized payload and the per-job
    /// context.
    pub fn register<P, F, Fut>(&mut self, job_type: JobType, handler: F)
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(P, HandlerContext) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let boxed: BoxedHandler = Box::new(move |value, ctx| {
            let handler = handler.clone();
            Box::pin(async move {
                let payload: P = serde_json::from_value(value)?;
                handler(payload, ctx).await
            })
        });

        self.registrations.insert(job_type, boxed);
    }

    /// Execute the registered handler for a claimed job.
    pub async fn execute(&self, job: &Job, ctx: HandlerContext) -> HandlerResult {
        let registration = self
            .registrations
            .get(&job.job_type)
            .ok_or(HandlerError::Unregistered(job.job_type))?;

        (registration)(job.payload.clone(), ctx).await
    }

    pub fn is_registered(&self, job_type: JobType) -> bool {
        self.registrations.contains_key(&job_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct EchoPayload {
        message: String,
    }

    #[test]
    fn register_and_check() {
        let mut registry = HandlerRegistry::new();
        registry.register::<EchoPayload, _, _>(JobType::SendSms, |payload, _ctx| async move {
            Ok(HandlerOutcome::Skipped {
                reason: payload.message,
            })
        });

        assert!(registry.is_registered(JobType::SendSms));
        assert!(!registry.is_registered(JobType::SendEmail));
    }
}
