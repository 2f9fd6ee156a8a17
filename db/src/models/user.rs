use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct User {
    /// Opaque user id handed out by the auth backend.
    pub id: Uuid,
    pub email: String,
    pub plan: String,
    pub credits_total: i32,
    pub credits_used: i32,
    pub stripe_customer_id: Option<String>,
    /// End of the current billing cycle, supplied by Stripe. Null for the
    /// free tier.
    pub period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
