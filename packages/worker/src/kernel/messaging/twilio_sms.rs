//! Twilio SMS messenger implementation.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::debug;
use twilio::{TwilioError, TwilioOptions, TwilioService};

use super::{DeliveryOutcome, SmsMessage, SmsMessenger};
use crate::kernel::tenants::TenantConfig;

/// Twilio Messages API adapter. The service is built per call because the
/// credentials are per-tenant.
#[derive(Default)]
pub struct TwilioMessenger;

impl TwilioMessenger {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SmsMessenger for TwilioMessenger {
    async fn send(&self, message: &SmsMessage, tenant: &TenantConfig) -> Result<DeliveryOutcome> {
        let account_sid = tenant
            .twilio_sid
            .as_deref()
            .ok_or_else(|| anyhow!("tenant {} has no Twilio account SID", tenant.tenant_id))?;
        let auth_token = tenant
            .twilio_auth_token
            .as_deref()
            .ok_or_else(|| anyhow!("tenant {} has no Twilio auth token", tenant.tenant_id))?;

        let service = TwilioService::new(TwilioOptions {
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
        });

        debug!(to = %message.to, from = %message.from, "sending SMS via Twilio");

        match service
            .send_message(&message.from, &message.to, &message.body)
            .await
        {
            Ok(response) => {
                if let Some(error) = response.error_message {
                    Ok(DeliveryOutcome::rejected(format!(
                        "Twilio error {}: {error}",
                        response.error_code.unwrap_or_default()
                    )))
                } else {
                    Ok(DeliveryOutcome::delivered(response.sid))
                }
            }
            Err(TwilioError::Api { status, body }) => Ok(DeliveryOutcome::rejected(format!(
                "Twilio returned {status}: {body}"
            ))),
            Err(e) => Err(e.into()),
        }
    }
}
