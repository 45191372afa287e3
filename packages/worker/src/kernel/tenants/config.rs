//! Tenant configuration rows from the central database.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::kernel::jobs::quiet_hours::{self, QuietWindow};

/// One row of `tenant_configs`: provider credentials, quiet hours, and the
/// connection descriptor for the tenant's DMS database.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub tenant_id: String,
    pub twilio_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_from_number: Option<String>,
    pub sendgrid_key: Option<String>,
    pub sendgrid_from: Option<String>,
    pub email_provider: Option<String>,
    pub resend_key: Option<String>,
    pub resend_from: Option<String>,
    pub quiet_hours_start: Option<String>,
    pub quiet_hours_end: Option<String>,
    pub dms_connection_string: Option<String>,
}

impl TenantConfig {
    pub async fn find_by_id(tenant_id: &str, db: &PgPool) -> Result<Option<Self>> {
        let config = sqlx::query_as::<_, Self>(
            r#"
            SELECT tenant_id, twilio_sid, twilio_auth_token, twilio_from_number,
                   sendgrid_key, sendgrid_from, email_provider, resend_key, resend_from,
                   quiet_hours_start, quiet_hours_end, dms_connection_string
            FROM tenant_configs
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(db)
        .await?;

        Ok(config)
    }

    pub async fn list_tenant_ids(db: &PgPool) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT tenant_id FROM tenant_configs ORDER BY tenant_id",
        )
        .fetch_all(db)
        .await?;

        Ok(ids)
    }

    /// The tenant's quiet-hour window, if configured and valid.
    pub fn quiet_window(&self) -> Option<QuietWindow> {
        quiet_hours::parse_window(
            self.quiet_hours_start.as_deref(),
            self.quiet_hours_end.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(start: Option<&str>, end: Option<&str>) -> TenantConfig {
        TenantConfig {
            tenant_id: "t1".to_string(),
            twilio_sid: None,
            twilio_auth_token: None,
            twilio_from_number: None,
            sendgrid_key: None,
            sendgrid_from: None,
            email_provider: None,
            resend_key: None,
            resend_from: None,
            quiet_hours_start: start.map(str::to_string),
            quiet_hours_end: end.map(str::to_string),
            dms_connection_string: None,
        }
    }

    #[test]
    fn quiet_window_requires_both_bounds() {
        assert!(config(Some("21:00"), Some("08:00")).quiet_window().is_some());
        assert!(config(Some("21:00"), None).quiet_window().is_none());
        assert!(config(None, None).quiet_window().is_none());
    }

    #[test]
    fn malformed_bounds_disable_the_window() {
        assert!(config(Some("soon"), Some("08:00")).quiet_window().is_none());
    }
}
