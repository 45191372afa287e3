//! Messenger, renderer, and attachment ports.
//!
//! The engine and scheduler only see these traits; the concrete provider
//! adapters (SendGrid, Twilio, the Handlebars renderer, the HTTP
//! attachment fetcher) live in the submodules and are wired up in main.

mod attachments;
mod sendgrid;
pub mod templates;
mod twilio_sms;

use anyhow::Result;
use async_trait::async_trait;

use super::tenants::TenantConfig;

pub use attachments::HttpAttachmentFetcher;
pub use sendgrid::SendGridMessenger;
pub use templates::DealershipTemplates;
pub use twilio_sms::TwilioMessenger;

/// A fully resolved outbound email.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
    pub html_body: Option<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub reply_to: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// Attachment bytes ready for the provider.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// A fully resolved outbound SMS.
#[derive(Debug, Clone)]
pub struct SmsMessage {
    pub to: String,
    pub from: String,
    pub body: String,
}

/// What a provider reported for one delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn delivered(message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// Outbound email channel. Credentials come from the tenant config.
#[async_trait]
pub trait EmailMessenger: Send + Sync {
    async fn send(&self, message: &EmailMessage, tenant: &TenantConfig) -> Result<DeliveryOutcome>;
}

/// Outbound SMS channel. Credentials come from the tenant config.
#[async_trait]
pub trait SmsMessenger: Send + Sync {
    async fn send(&self, message: &SmsMessage, tenant: &TenantConfig) -> Result<DeliveryOutcome>;
}

/// Rendered subject/body for a sweep event type.
#[derive(Debug, Clone)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
    pub html_body: Option<String>,
}

/// Source of rendered message content keyed by event type.
#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    async fn render(
        &self,
        event_type: &str,
        tenant_id: &str,
        vars: &serde_json::Value,
    ) -> Result<RenderedMessage>;
}

/// Produces attachment bytes before a job is handed to the email messenger.
#[async_trait]
pub trait AttachmentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}
