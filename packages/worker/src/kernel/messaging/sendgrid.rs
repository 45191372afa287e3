//! SendGrid email messenger implementation.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::{DeliveryOutcome, EmailMessage, EmailMessenger};
use crate::kernel::tenants::TenantConfig;

const SENDGRID_API_URL: &str = "https://api.sendgrid.com/v3";

/// SendGrid v3 mail/send adapter. Per-tenant API keys come from the tenant
/// config at send time.
pub struct SendGridMessenger {
    client: Client,
    api_url: String,
}

impl SendGridMessenger {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            api_url: SENDGRID_API_URL.to_string(),
        }
    }

    /// Point the adapter at a different base URL (sandbox testing).
    pub fn with_api_url(api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into(),
        }
    }
}

impl Default for SendGridMessenger {
    fn default() -> Self {
        Self::new()
    }
}

// SendGrid API request structures

#[derive(Debug, Serialize)]
struct SendGridRequest {
    personalizations: Vec<Personalization>,
    from: EmailAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<EmailAddress>,
    subject: String,
    content: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<AttachmentBlock>,
}

#[derive(Debug, Serialize)]
struct Personalization {
    to: Vec<EmailAddress>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cc: Vec<EmailAddress>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    bcc: Vec<EmailAddress>,
}

#[derive(Debug, Serialize)]
struct EmailAddress {
    email: String,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(rename = "type")]
    content_type: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct AttachmentBlock {
    content: String,
    #[serde(rename = "type")]
    content_type: String,
    filename: String,
}

fn address(email: &str) -> EmailAddress {
    EmailAddress {
        email: email.to_string(),
    }
}

#[async_trait]
impl EmailMessenger for SendGridMessenger {
    async fn send(&self, message: &EmailMessage, tenant: &TenantConfig) -> Result<DeliveryOutcome> {
        let api_key = tenant
            .sendgrid_key
            .as_deref()
            .ok_or_else(|| anyhow!("tenant {} has no SendGrid API key", tenant.tenant_id))?;

        let mut content = vec![Content {
            content_type: "text/plain".to_string(),
            value: message.body.clone(),
        }];
        if let Some(html) = &message.html_body {
            content.push(Content {
                content_type: "text/html".to_string(),
                value: html.clone(),
            });
        }

        let attachments = message
            .attachments
            .iter()
            .map(|a| AttachmentBlock {
                content: base64::engine::general_purpose::STANDARD.encode(&a.content),
                content_type: a.content_type.clone(),
                filename: a.filename.clone(),
            })
            .collect();

        let request = SendGridRequest {
            personalizations: vec![Personalization {
                to: vec![address(&message.to)],
                cc: message.cc.iter().map(|a| address(a)).collect(),
                bcc: message.bcc.iter().map(|a| address(a)).collect(),
            }],
            from: address(&message.from),
            reply_to: message.reply_to.as_deref().map(address),
            subject: message.subject.clone(),
            content,
            attachments,
        };

        debug!(
            to = %message.to,
            subject = %message.subject,
            attachment_count = message.attachments.len(),
            "sending email via SendGrid"
        );

        let response = self
            .client
            .post(format!("{}/mail/send", self.api_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let message_id = response
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if status.is_success() {
            Ok(DeliveryOutcome {
                success: true,
                message_id,
                error: None,
            })
        } else {
            let body = response.text().await.unwrap_or_default();
            Ok(DeliveryOutcome::rejected(format!(
                "SendGrid returned {status}: {body}"
            )))
        }
    }
}
