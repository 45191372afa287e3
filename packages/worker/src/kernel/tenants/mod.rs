//! Multi-tenant data layer: the central-vs-tenant split.
//!
//! [`TenantGateway`] hides the split from the engine and scheduler: tenant
//! configuration comes from the central database (cached in-process), while
//! customers, appointments, and invoices come from each tenant's DMS
//! database through a lazily created, bounded connection pool.

mod candidates;
mod config;
mod gateway;

pub use candidates::{AppointmentCandidate, PastDueInvoice, ServiceReminderCandidate};
pub use config::TenantConfig;
pub use gateway::{ContactPreference, CustomerContact, PgTenantGateway, TenantGateway};
