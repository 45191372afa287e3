//! Job infrastructure for outbound communication work.
//!
//! This module provides the kernel-level queue machinery:
//! - [`Job`] - durable job row in `communication_jobs`
//! - [`JobStore`] - transactional queue primitives (claim, complete,
//!   reschedule, fail, insert-with-dedup) with the postgres
//!   implementation [`PgJobStore`]
//! - [`JobEngine`] - polling loop that claims and dispatches jobs
//! - [`HandlerRegistry`] - dispatch table keyed by job type
//! - quiet-hour window evaluation
//!
//! # Architecture
//!
//! ```text
//! JobEngine
//!     │
//!     ├─► claim_pending (FOR UPDATE SKIP LOCKED)
//!     ├─► tenant config → quiet-hour gate
//!     ├─► HandlerRegistry.execute (send_email / send_sms / notify_customer)
//!     └─► mark_complete / reschedule / mark_failed / fallback
//! ```
//!
//! Handlers are a small closed set registered at startup; business copy
//! (templates) and provider transports stay behind the kernel's ports.

mod engine;
mod handlers;
mod job;
pub mod quiet_hours;
mod registry;
mod store;

pub use engine::{EngineConfig, JobEngine};
pub use handlers::{
    default_registry, AttachmentRef, Channel, EmailPayload, NotifyPayload, SmsPayload,
};
pub use job::{Job, JobStatus, JobType, NewJob};
pub use quiet_hours::QuietWindow;
pub use registry::{HandlerContext, HandlerError, HandlerOutcome, HandlerRegistry, HandlerResult};
pub use store::{EnqueueResult, JobStore, PgJobStore};
