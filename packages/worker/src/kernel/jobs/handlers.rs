//! Built-in handlers for the three communication job types.

use base64::Engine as _;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::job::JobType;
use super::registry::{HandlerContext, HandlerError, HandlerOutcome, HandlerRegistry, HandlerResult};
use crate::kernel::messaging::{Attachment, EmailMessage, SmsMessage};
use crate::kernel::tenants::ContactPreference;

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailPayload {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub html_body: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub cc: Option<Vec<String>>,
    #[serde(default)]
    pub bcc: Option<Vec<String>>,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub attachments: Option<Vec<AttachmentRef>>,
    #[serde(default)]
    pub customer_id: Option<i64>,
    #[serde(default)]
    pub source_reference: Option<String>,
    #[serde(default)]
    pub urgent: bool,
}

/// Attachment reference carried in an email payload. Content is either
/// inlined (base64) or fetched from a URL through the attachment port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub filename: String,
    pub content_type: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsPayload {
    pub to: String,
    pub body: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub customer_id: Option<i64>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub source_reference: Option<String>,
    #[serde(default)]
    pub urgent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyPayload {
    pub customer_id: i64,
    pub body: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub preferred_channel: Option<Channel>,
    #[serde(default)]
    pub fallback_channel: Option<Channel>,
    #[serde(default)]
    pub urgent: bool,
}

/// Concrete delivery channel for `notify_customer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
}

// ============================================================================
// Registry wiring
// ============================================================================

/// Registry with the three built-in handlers.
pub fn default_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register::<EmailPayload, _, _>(JobType::SendEmail, send_email);
    registry.register::<SmsPayload, _, _>(JobType::SendSms, send_sms);
    registry.register::<NotifyPayload, _, _>(JobType::NotifyCustomer, notify_customer);
    registry
}

// ============================================================================
// send_email
// ============================================================================

async fn send_email(payload: EmailPayload, ctx: HandlerContext) -> HandlerResult {
    let from = match payload.from.clone().or_else(|| ctx.tenant.sendgrid_from.clone()) {
        Some(from) => from,
        None => {
            return Err(HandlerError::Configuration(format!(
                "tenant {} has no default email sender",
                ctx.tenant.tenant_id
            )))
        }
    };

    let mut attachments = Vec::new();
    for attachment in payload.attachments.iter().flatten() {
        attachments.push(resolve_attachment(attachment, &ctx).await?);
    }

    let message = EmailMessage {
        to: payload.to,
        from,
        subject: payload.subject,
        body: payload.body,
        html_body: payload.html_body,
        cc: payload.cc.unwrap_or_default(),
        bcc: payload.bcc.unwrap_or_default(),
        reply_to: payload.reply_to,
        attachments,
    };

    let outcome = ctx
        .kernel
        .email
        .send(&message, &ctx.tenant)
        .await
        .map_err(|e| HandlerError::Provider(e.to_string()))?;

    if outcome.success {
        Ok(HandlerOutcome::Sent {
            message_id: outcome.message_id,
        })
    } else {
        Err(HandlerError::Provider(outcome.error.unwrap_or_else(|| {
            "email provider rejected the message".to_string()
        })))
    }
}

async fn resolve_attachment(
    attachment: &AttachmentRef,
    ctx: &HandlerContext,
) -> Result<Attachment, HandlerError> {
    let content = if let Some(encoded) = &attachment.content {
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| {
                HandlerError::Configuration(format!(
                    "attachment {} carries invalid base64 content: {e}",
                    attachment.filename
                ))
            })?
    } else if let Some(url) = &attachment.url {
        ctx.kernel
            .attachments
            .fetch(url)
            .await
            .map_err(|e| HandlerError::Provider(format!("failed to fetch attachment {url}: {e}")))?
    } else {
        return Err(HandlerError::Configuration(format!(
            "attachment {} has neither content nor url",
            attachment.filename
        )));
    };

    Ok(Attachment {
        filename: attachment.filename.clone(),
        content_type: attachment.content_type.clone(),
        content,
    })
}

// ============================================================================
// send_sms
// ============================================================================

async fn send_sms(payload: SmsPayload, ctx: HandlerContext) -> HandlerResult {
    let from = match payload.from.clone().or_else(|| ctx.tenant.twilio_from_number.clone()) {
        Some(from) => from,
        None => {
            return Err(HandlerError::Configuration(format!(
                "tenant {} has no SMS sender number",
                ctx.tenant.tenant_id
            )))
        }
    };

    let message = SmsMessage {
        to: payload.to,
        from,
        body: payload.body,
    };

    let outcome = ctx
        .kernel
        .sms
        .send(&message, &ctx.tenant)
        .await
        .map_err(|e| HandlerError::Provider(e.to_string()))?;

    if outcome.success {
        Ok(HandlerOutcome::Sent {
            message_id: outcome.message_id,
        })
    } else {
        Err(HandlerError::Provider(outcome.error.unwrap_or_else(|| {
            "SMS provider rejected the message".to_string()
        })))
    }
}

// ============================================================================
// notify_customer
// ============================================================================

async fn notify_customer(payload: NotifyPayload, ctx: HandlerContext) -> HandlerResult {
    let tenant_id = ctx.tenant.tenant_id.clone();
    let customer_id = payload.customer_id;

    let contact = ctx
        .kernel
        .tenants
        .fetch_customer_contact(&tenant_id, customer_id)
        .await?
        .ok_or_else(|| {
            HandlerError::MissingContact(format!(
                "customer {customer_id} not found in tenant {tenant_id} DMS"
            ))
        })?;

    // do_not_contact is authoritative regardless of payload hints.
    let preference = contact.preference();
    if preference == Some(ContactPreference::DoNotContact) {
        return Ok(HandlerOutcome::Skipped {
            reason: format!("customer {customer_id} has do_not_contact preference"),
        });
    }

    if let Some(until) = contact.do_not_disturb_until {
        if until > Utc::now() {
            return Ok(HandlerOutcome::Skipped {
                reason: format!("customer {customer_id} asked not to be disturbed until {until}"),
            });
        }
    }

    let channel = resolve_channel(
        preference,
        payload.preferred_channel,
        contact.phone.is_some(),
        contact.email.is_some(),
        payload.fallback_channel,
    )
    .ok_or_else(|| {
        HandlerError::MissingContact(format!(
            "customer {customer_id} has no usable contact channel"
        ))
    })?;

    match channel {
        Channel::Sms => {
            let to = contact.phone.ok_or_else(|| {
                HandlerError::MissingContact(format!("customer {customer_id} has no phone number"))
            })?;
            let sms = SmsPayload {
                to,
                body: payload.body,
                from: None,
                customer_id: Some(customer_id),
                subject: payload.subject,
                source_reference: None,
                urgent: payload.urgent,
            };
            send_sms(sms, ctx).await
        }
        Channel::Email => {
            let to = contact.email.ok_or_else(|| {
                HandlerError::MissingContact(format!("customer {customer_id} has no email address"))
            })?;
            let email = EmailPayload {
                to,
                subject: payload
                    .subject
                    .unwrap_or_else(|| "Customer Notification".to_string()),
                body: payload.body,
                html_body: None,
                from: None,
                cc: None,
                bcc: None,
                reply_to: None,
                attachments: None,
                customer_id: Some(customer_id),
                source_reference: None,
                urgent: payload.urgent,
            };
            send_email(email, ctx).await
        }
    }
}

/// Channel resolution order: DMS preference, payload preference, presence
/// of contact data (phone first), payload fallback.
fn resolve_channel(
    dms_preference: Option<ContactPreference>,
    preferred: Option<Channel>,
    has_phone: bool,
    has_email: bool,
    fallback: Option<Channel>,
) -> Option<Channel> {
    match dms_preference {
        Some(ContactPreference::Email) => return Some(Channel::Email),
        // A phone preference is reachable only over SMS from here.
        Some(ContactPreference::Sms) | Some(ContactPreference::Phone) => {
            return Some(Channel::Sms)
        }
        Some(ContactPreference::DoNotContact) => return None,
        None => {}
    }

    if let Some(channel) = preferred {
        return Some(channel);
    }

    if has_phone {
        return Some(Channel::Sms);
    }
    if has_email {
        return Some(Channel::Email);
    }

    fallback
}

/// Parse a raw payload into the fields the fallback path needs.
pub(super) fn fallback_subject(payload: &Value) -> String {
    payload
        .get("subject")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| "SMS Fallback Notification".to_string())
}
