use std::sync::Arc;

use actix_web::{Responder, post, web};
use common::{
    env_config::Config,
    error::{AppError, Res},
    http::Success,
};
use sqlx::PgPool;

use crate::{dtos::billing::WebhookAck, services};

/// Handles Stripe webhook events for billing updates.
///
/// # Input
/// - `payload`: Raw request body, verified against the `stripe-signature`
///   header before anything else happens
/// - `req`: HTTP request carrying the signature header
/// - `config`, `pool`: Application configuration and database pool
///
/// # Output
/// - Success: `{ "received": true }`; unrecognized event types are
///   acknowledged and ignored
/// - Error: 400 for a missing or invalid signature, with no state change
///
/// # Note
/// This endpoint is called by Stripe's servers, not by the client. Configure
/// it in the Stripe Dashboard under Webhooks and set the signing secret as
/// `STRIPE_WEBHOOK_SECRET`. Events may be redelivered; every branch applies
/// an idempotent update keyed by customer id.
#[post("/webhook")]
async fn post_webhook(
    payload: String,
    req: actix_web::HttpRequest,
    config: web::Data<Arc<Config>>,
    stripe: web::Data<Arc<stripe::Client>>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let signature = match req.headers().get("stripe-signature") {
        Some(signature) => signature.to_str().unwrap_or(""),
        None => return Err(AppError::BadRequest("Stripe signature missing".to_string())),
    };

    let event =
        services::webhook::construct_event(&payload, signature, &config.stripe_webhook_secret)?;

    services::webhook::process_event(&pool, &config.plan_catalog, &stripe, event).await?;

    Success::ok(WebhookAck { received: true })
}
