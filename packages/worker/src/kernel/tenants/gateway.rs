//! Tenant gateway: config cache plus per-tenant DMS pool lifecycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::candidates::{AppointmentCandidate, PastDueInvoice, ServiceReminderCandidate};
use super::config::TenantConfig;

const DMS_POOL_MAX_CONNECTIONS: u32 = 15;
const DMS_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Contact preference recorded in a tenant's DMS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactPreference {
    Email,
    Sms,
    Phone,
    DoNotContact,
}

impl ContactPreference {
    /// Parse the DMS text column; unknown values read as "no preference".
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "email" => Some(Self::Email),
            "sms" | "text" => Some(Self::Sms),
            "phone" | "call" => Some(Self::Phone),
            "do_not_contact" => Some(Self::DoNotContact),
            _ => None,
        }
    }
}

/// Contact data for one customer, as read from the tenant DMS.
#[derive(FromRow, Debug, Clone)]
pub struct CustomerContact {
    pub customer_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub contact_preference: Option<String>,
    pub do_not_disturb_until: Option<DateTime<Utc>>,
}

impl CustomerContact {
    pub fn preference(&self) -> Option<ContactPreference> {
        self.contact_preference
            .as_deref()
            .and_then(ContactPreference::parse)
    }
}

/// Hides the central-vs-tenant split from the engine and scheduler.
#[async_trait]
pub trait TenantGateway: Send + Sync {
    /// Tenant configuration, from the process-wide cache. Fails if the
    /// tenant is unknown.
    async fn get_tenant_config(&self, tenant_id: &str) -> Result<Arc<TenantConfig>>;

    /// All configured tenant ids, for sweep enumeration.
    async fn list_tenants(&self) -> Result<Vec<String>>;

    /// Contact data for one customer, or None when the customer is unknown.
    async fn fetch_customer_contact(
        &self,
        tenant_id: &str,
        customer_id: i64,
    ) -> Result<Option<CustomerContact>>;

    /// The customer's recorded contact preference. `DoNotContact` is
    /// authoritative.
    async fn get_contact_preference(
        &self,
        tenant_id: &str,
        customer_id: i64,
    ) -> Result<Option<ContactPreference>>;

    /// Sales rows whose two-year service is coming due.
    async fn service_reminder_candidates(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<ServiceReminderCandidate>>;

    /// Appointments starting 24-25 hours from now.
    async fn appointments_in_confirmation_window(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<AppointmentCandidate>>;

    /// Invoices at least 30 days past due with an open balance.
    async fn past_due_invoices(&self, tenant_id: &str) -> Result<Vec<PastDueInvoice>>;

    /// Close all tenant pools (graceful shutdown).
    async fn close(&self);
}

/// Postgres-backed gateway: tenant configs from the central database
/// (cached indefinitely, invalidation requires process restart) and a
/// lazily populated map of bounded DMS pools.
pub struct PgTenantGateway {
    central: PgPool,
    configs: RwLock<HashMap<String, Arc<TenantConfig>>>,
    pools: RwLock<HashMap<String, PgPool>>,
}

impl PgTenantGateway {
    pub fn new(central: PgPool) -> Self {
        Self {
            central,
            configs: RwLock::new(HashMap::new()),
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// The cached DMS pool for a tenant, created on first use.
    pub async fn get_tenant_pool(&self, tenant_id: &str) -> Result<PgPool> {
        if let Some(pool) = self.pools.read().await.get(tenant_id) {
            return Ok(pool.clone());
        }

        let config = self.get_tenant_config(tenant_id).await?;
        let dsn = config
            .dms_connection_string
            .as_deref()
            .ok_or_else(|| anyhow!("tenant {tenant_id} has no DMS connection string"))?;

        let pool = PgPoolOptions::new()
            .max_connections(DMS_POOL_MAX_CONNECTIONS)
            .idle_timeout(DMS_POOL_IDLE_TIMEOUT)
            .connect_lazy(dsn)?;

        debug!(tenant_id, "created DMS connection pool");

        // First writer wins so concurrent readers always see one pool.
        let mut pools = self.pools.write().await;
        Ok(pools
            .entry(tenant_id.to_string())
            .or_insert(pool)
            .clone())
    }
}

#[async_trait]
impl TenantGateway for PgTenantGateway {
    async fn get_tenant_config(&self, tenant_id: &str) -> Result<Arc<TenantConfig>> {
        if let Some(config) = self.configs.read().await.get(tenant_id) {
            return Ok(Arc::clone(config));
        }

        let config = TenantConfig::find_by_id(tenant_id, &self.central)
            .await?
            .ok_or_else(|| anyhow!("unknown tenant {tenant_id}"))?;
        let config = Arc::new(config);

        let mut configs = self.configs.write().await;
        Ok(Arc::clone(
            configs
                .entry(tenant_id.to_string())
                .or_insert_with(|| Arc::clone(&config)),
        ))
    }

    async fn list_tenants(&self) -> Result<Vec<String>> {
        TenantConfig::list_tenant_ids(&self.central).await
    }

    async fn fetch_customer_contact(
        &self,
        tenant_id: &str,
        customer_id: i64,
    ) -> Result<Option<CustomerContact>> {
        let pool = self.get_tenant_pool(tenant_id).await?;

        let contact = sqlx::query_as::<_, CustomerContact>(
            r#"
            SELECT id AS customer_id, first_name, last_name, email,
                   primary_phone AS phone, contact_preference, do_not_disturb_until
            FROM customers
            WHERE id = $1
            "#,
        )
        .bind(customer_id)
        .fetch_optional(&pool)
        .await?;

        Ok(contact)
    }

    async fn get_contact_preference(
        &self,
        tenant_id: &str,
        customer_id: i64,
    ) -> Result<Option<ContactPreference>> {
        let pool = self.get_tenant_pool(tenant_id).await?;

        let raw = sqlx::query_scalar::<_, Option<String>>(
            "SELECT contact_preference FROM customers WHERE id = $1",
        )
        .bind(customer_id)
        .fetch_optional(&pool)
        .await?;

        Ok(raw.flatten().as_deref().and_then(ContactPreference::parse))
    }

    async fn service_reminder_candidates(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<ServiceReminderCandidate>> {
        let pool = self.get_tenant_pool(tenant_id).await?;
        ServiceReminderCandidate::find_due(&pool).await
    }

    async fn appointments_in_confirmation_window(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<AppointmentCandidate>> {
        let pool = self.get_tenant_pool(tenant_id).await?;
        AppointmentCandidate::find_in_window(&pool).await
    }

    async fn past_due_invoices(&self, tenant_id: &str) -> Result<Vec<PastDueInvoice>> {
        let pool = self.get_tenant_pool(tenant_id).await?;
        PastDueInvoice::find_open(&pool).await
    }

    async fn close(&self) {
        let pools = self.pools.read().await;
        for (tenant_id, pool) in pools.iter() {
            pool.close().await;
            info!(tenant_id, "closed DMS connection pool");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preference_parsing_is_lenient() {
        assert_eq!(ContactPreference::parse("EMAIL"), Some(ContactPreference::Email));
        assert_eq!(ContactPreference::parse("text"), Some(ContactPreference::Sms));
        assert_eq!(ContactPreference::parse("call"), Some(ContactPreference::Phone));
        assert_eq!(
            ContactPreference::parse("do_not_contact"),
            Some(ContactPreference::DoNotContact)
        );
        assert_eq!(ContactPreference::parse("pigeon"), None);
    }
}
