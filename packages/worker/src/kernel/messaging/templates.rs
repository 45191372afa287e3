//! Handlebars-based message templates for the sweep event types.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use handlebars::Handlebars;

use super::{RenderedMessage, TemplateRenderer};

pub const SERVICE_REMINDER: &str = "service_reminder";
pub const APPOINTMENT_CONFIRMATION: &str = "appointment_confirmation";
pub const INVOICE_REMINDER: &str = "invoice_reminder";

const SERVICE_REMINDER_SUBJECT: &str = "Time to schedule service for your {{model}}";
const SERVICE_REMINDER_BODY: &str = "\
Hi {{first_name}},

It has been about two years since you purchased your {{model}} \
(serial {{serial_number}}). Regular service keeps your equipment running \
and protects your warranty coverage.

Call us or reply to this email to schedule a service appointment.

Thank you,
Your dealership service team";

const APPOINTMENT_CONFIRMATION_BODY: &str = "\
Hi {{first_name}}, this is a reminder of your service appointment on \
{{scheduled_start}}. Reply YES to confirm, or call us if you need to \
reschedule.";

const INVOICE_REMINDER_SUBJECT: &str = "Invoice {{invoice_id}} is past due";
const INVOICE_REMINDER_BODY: &str = "\
Hi {{first_name}},

Invoice {{invoice_id}} with a balance of {{balance}} was due on \
{{due_date}} and is now {{days_past_due}} days past due.

Please contact our office to arrange payment.

Thank you,
Your dealership billing team";

/// Built-in renderer for the three proactive sweep event types.
pub struct DealershipTemplates {
    handlebars: Handlebars<'static>,
}

impl DealershipTemplates {
    pub fn new() -> Result<Self> {
        let mut handlebars = Handlebars::new();

        for (name, template) in [
            ("service_reminder_subject", SERVICE_REMINDER_SUBJECT),
            ("service_reminder_body", SERVICE_REMINDER_BODY),
            ("appointment_confirmation_body", APPOINTMENT_CONFIRMATION_BODY),
            ("invoice_reminder_subject", INVOICE_REMINDER_SUBJECT),
            ("invoice_reminder_body", INVOICE_REMINDER_BODY),
        ] {
            handlebars
                .register_template_string(name, template)
                .with_context(|| format!("failed to register template {name}"))?;
        }

        Ok(Self { handlebars })
    }

    fn render_pair(
        &self,
        subject_template: &str,
        body_template: &str,
        vars: &serde_json::Value,
    ) -> Result<RenderedMessage> {
        Ok(RenderedMessage {
            subject: self.handlebars.render(subject_template, vars)?,
            body: self.handlebars.render(body_template, vars)?,
            html_body: None,
        })
    }
}

#[async_trait]
impl TemplateRenderer for DealershipTemplates {
    async fn render(
        &self,
        event_type: &str,
        _tenant_id: &str,
        vars: &serde_json::Value,
    ) -> Result<RenderedMessage> {
        match event_type {
            SERVICE_REMINDER => {
                self.render_pair("service_reminder_subject", "service_reminder_body", vars)
            }
            APPOINTMENT_CONFIRMATION => Ok(RenderedMessage {
                subject: "Appointment Reminder".to_string(),
                body: self.handlebars.render("appointment_confirmation_body", vars)?,
                html_body: None,
            }),
            INVOICE_REMINDER => {
                self.render_pair("invoice_reminder_subject", "invoice_reminder_body", vars)
            }
            other => Err(anyhow!("no template registered for event type {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn service_reminder_renders_model_and_name() {
        let templates = DealershipTemplates::new().unwrap();
        let rendered = templates
            .render(
                SERVICE_REMINDER,
                "t1",
                &json!({"first_name": "Sam", "model": "KX-200", "serial_number": "SN1"}),
            )
            .await
            .unwrap();

        assert!(rendered.subject.contains("KX-200"));
        assert!(rendered.body.contains("Sam"));
        assert!(rendered.body.contains("SN1"));
    }

    #[tokio::test]
    async fn invoice_reminder_includes_days_past_due() {
        let templates = DealershipTemplates::new().unwrap();
        let rendered = templates
            .render(
                INVOICE_REMINDER,
                "t1",
                &json!({
                    "first_name": "Sam",
                    "invoice_id": 77,
                    "balance": "125.00",
                    "due_date": "2025-05-01",
                    "days_past_due": 45,
                }),
            )
            .await
            .unwrap();

        assert!(rendered.subject.contains("77"));
        assert!(rendered.body.contains("45 days past due"));
    }

    #[tokio::test]
    async fn unknown_event_type_errors() {
        let templates = DealershipTemplates::new().unwrap();
        assert!(templates.render("birthday", "t1", &json!({})).await.is_err());
    }
}
