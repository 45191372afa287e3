//! Candidate finders: parameterised read-only queries over a tenant DMS.
//!
//! Each finder returns plain records for the proactive scheduler; the
//! windows match the business rules (two-year service interval, 24-hour
//! appointment confirmation, 30-day invoice grace).

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};

/// A sale whose two-year service window opened: purchased 23-25 months ago.
#[derive(FromRow, Debug, Clone)]
pub struct ServiceReminderCandidate {
    pub customer_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub purchase_date: NaiveDate,
}

impl ServiceReminderCandidate {
    pub async fn find_due(db: &PgPool) -> Result<Vec<Self>> {
        let candidates = sqlx::query_as::<_, Self>(
            r#"
            SELECT s.customer_id, c.first_name, c.last_name, c.email,
                   s.model, s.serial_number, s.purchase_date
            FROM sales s
            JOIN customers c ON c.id = s.customer_id
            WHERE s.purchase_date BETWEEN (NOW() - INTERVAL '25 months')::date
                                      AND (NOW() - INTERVAL '23 months')::date
              AND c.email IS NOT NULL
              AND c.email <> ''
            ORDER BY s.purchase_date, s.customer_id
            "#,
        )
        .fetch_all(db)
        .await?;

        Ok(candidates)
    }
}

/// An appointment starting 24-25 hours from now, with the customer's phone.
#[derive(FromRow, Debug, Clone)]
pub struct AppointmentCandidate {
    pub appointment_id: i64,
    pub customer_id: i64,
    pub first_name: Option<String>,
    pub phone: String,
    pub scheduled_start: DateTime<Utc>,
}

impl AppointmentCandidate {
    pub async fn find_in_window(db: &PgPool) -> Result<Vec<Self>> {
        let candidates = sqlx::query_as::<_, Self>(
            r#"
            SELECT a.id AS appointment_id, a.customer_id, c.first_name,
                   c.primary_phone AS phone, a.scheduled_start
            FROM appointments a
            JOIN customers c ON c.id = a.customer_id
            WHERE a.scheduled_start BETWEEN NOW() + INTERVAL '24 hours'
                                        AND NOW() + INTERVAL '25 hours'
              AND a.status = 'scheduled'
              AND c.primary_phone IS NOT NULL
              AND c.primary_phone <> ''
            ORDER BY a.scheduled_start, a.id
            "#,
        )
        .fetch_all(db)
        .await?;

        Ok(candidates)
    }
}

/// An invoice at least 30 days past due with an open balance.
#[derive(FromRow, Debug, Clone)]
pub struct PastDueInvoice {
    pub invoice_id: i64,
    pub customer_id: i64,
    pub first_name: Option<String>,
    pub email: String,
    pub due_date: NaiveDate,
    pub balance: Decimal,
}

impl PastDueInvoice {
    pub async fn find_open(db: &PgPool) -> Result<Vec<Self>> {
        let invoices = sqlx::query_as::<_, Self>(
            r#"
            SELECT i.id AS invoice_id, i.customer_id, c.first_name, c.email,
                   i.due_date, i.balance
            FROM invoices i
            JOIN customers c ON c.id = i.customer_id
            WHERE i.due_date <= (NOW() - INTERVAL '30 days')::date
              AND i.balance > 0
              AND c.email IS NOT NULL
              AND c.email <> ''
            ORDER BY i.due_date, i.id
            "#,
        )
        .fetch_all(db)
        .await?;

        Ok(invoices)
    }

    /// Whole days between the due date and now.
    pub fn days_past_due(&self, today: NaiveDate) -> i64 {
        (today - self.due_date).num_days()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_past_due_counts_whole_days() {
        let invoice = PastDueInvoice {
            invoice_id: 1,
            customer_id: 2,
            first_name: None,
            email: "a@b".to_string(),
            due_date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            balance: Decimal::new(12500, 2),
        };
        let today = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        assert_eq!(invoice.days_past_due(today), 45);
    }
}
