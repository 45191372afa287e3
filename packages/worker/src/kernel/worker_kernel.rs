// WorkerKernel - core infrastructure with all dependencies
//
// The WorkerKernel holds all worker dependencies (central store, tenant
// gateway, messengers, renderer) and provides access via traits for
// testability.

use std::sync::Arc;

use sqlx::PgPool;

use super::jobs::JobStore;
use super::messaging::{AttachmentFetcher, EmailMessenger, SmsMessenger, TemplateRenderer};
use super::tenants::TenantGateway;

/// WorkerKernel holds all worker dependencies
pub struct WorkerKernel {
    /// Central database pool (communication_jobs, tenant_configs)
    pub db_pool: PgPool,
    /// Durable job queue over the central database
    pub store: Arc<dyn JobStore>,
    /// Tenant config cache + per-tenant DMS access
    pub tenants: Arc<dyn TenantGateway>,
    /// Outbound email channel
    pub email: Arc<dyn EmailMessenger>,
    /// Outbound SMS channel
    pub sms: Arc<dyn SmsMessenger>,
    /// Rendered subject/body per sweep event type
    pub renderer: Arc<dyn TemplateRenderer>,
    /// Attachment bytes resolved before handing mail to the messenger
    pub attachments: Arc<dyn AttachmentFetcher>,
}

impl WorkerKernel {
    /// Creates a new WorkerKernel with the given dependencies
    pub fn new(
        db_pool: PgPool,
        store: Arc<dyn JobStore>,
        tenants: Arc<dyn TenantGateway>,
        email: Arc<dyn EmailMessenger>,
        sms: Arc<dyn SmsMessenger>,
        renderer: Arc<dyn TemplateRenderer>,
        attachments: Arc<dyn AttachmentFetcher>,
    ) -> Self {
        Self {
            db_pool,
            store,
            tenants,
            email,
            sms,
            renderer,
            attachments,
        }
    }
}
