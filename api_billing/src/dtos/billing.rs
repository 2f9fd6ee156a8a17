use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct DowngradeRequest {
    #[serde(rename = "targetPlan")]
    pub target_plan: Option<String>,
    #[serde(rename = "targetPriceId")]
    pub target_price_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DowngradeResponse {
    pub ok: bool,
    pub scheduled: bool,
    #[serde(rename = "scheduleId")]
    pub schedule_id: String,
}

#[derive(Debug, Serialize)]
pub struct PendingChange {
    pub next_plan: String,
    pub next_price_id: String,
    pub start_date_unix: i64,
}

#[derive(Debug, Serialize)]
pub struct PendingChangeResponse {
    pub pending: Option<PendingChange>,
}

#[derive(Debug, Serialize)]
pub struct CancelScheduleResponse {
    pub ok: bool,
    pub canceled: bool,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}
