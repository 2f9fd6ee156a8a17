use std::sync::Arc;

use actix_web::{Responder, get, post, web};
use api_auth::AuthIdentity;
use common::{
    env_config::Config,
    error::{AppError, Res},
    http::Success,
    plan::Plan,
};
use sqlx::PgPool;

use crate::{
    dtos::billing::{
        CancelScheduleResponse, CheckoutRequest, DowngradeRequest, DowngradeResponse,
        PendingChange, PendingChangeResponse, SessionResponse,
    },
    services,
};

/// Creates a subscription checkout session for one of the paid plans.
///
/// # Input
/// - `identity`: Authenticated identity resolved by the auth middleware
/// - `req`: JSON payload `{ "plan": "light" | "basic" | "pro" }`
/// - `config`, `pool`: Application configuration and database pool
///
/// # Output
/// - Success: `{ "url": "<checkout redirect URL>" }`
/// - Error: 400 for an unknown plan key (Stripe is never called), 500 for
///   provider failures
#[post("/create-checkout")]
async fn post_create_checkout(
    identity: web::ReqData<AuthIdentity>,
    req: web::Json<CheckoutRequest>,
    config: web::Data<Arc<Config>>,
    stripe: web::Data<Arc<stripe::Client>>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let pool: &PgPool = &pool;
    let plan = Plan::from_key(&req.plan)?;
    let price_id = config
        .plan_catalog
        .price_id(plan)
        .ok_or_else(|| AppError::BadRequest(format!("Plan {} cannot be purchased", plan)))?
        .to_string();

    let user = db::user::get_or_create_user(pool, identity.id, &identity.email).await?;

    let customer_id = services::customer::find_or_create_customer(&stripe, pool, &user).await?;

    let success_url = format!("{}/?checkout=success", config.public_app_url);
    let cancel_url = format!("{}/?checkout=cancel", config.public_app_url);
    let session = services::checkout::create_checkout_session(
        &stripe,
        customer_id,
        &price_id,
        &success_url,
        &cancel_url,
    )
    .await?;

    let url = session
        .url
        .ok_or_else(|| AppError::Internal("Checkout session has no redirect URL".to_string()))?;

    Success::ok(SessionResponse { url })
}

/// Creates a billing-portal session so the user can manage their
/// subscription with the payment provider directly.
#[post("/create-portal")]
async fn post_create_portal(
    identity: web::ReqData<AuthIdentity>,
    config: web::Data<Arc<Config>>,
    stripe: web::Data<Arc<stripe::Client>>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let pool: &PgPool = &pool;
    let user = db::user::get_or_create_user(pool, identity.id, &identity.email).await?;

    let customer_id = services::customer::find_or_create_customer(&stripe, pool, &user).await?;

    let return_url = format!("{}/account", config.public_app_url);
    let session =
        services::checkout::create_portal_session(&stripe, customer_id, &return_url).await?;

    Success::ok(SessionResponse { url: session.url })
}

/// Reports the deferred plan change scheduled for the current subscription,
/// or `null` when none is pending.
#[get("/pending-change")]
async fn get_pending_change(
    identity: web::ReqData<AuthIdentity>,
    config: web::Data<Arc<Config>>,
    stripe: web::Data<Arc<stripe::Client>>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let pool: &PgPool = &pool;
    let user = db::user::get_or_create_user(pool, identity.id, &identity.email).await?;
    let Some(customer_id) = user.stripe_customer_id.as_deref() else {
        return Success::ok(PendingChangeResponse { pending: None });
    };
    let customer_id = common::stripe::parse_customer_id(customer_id)?;

    let Some(subscription) =
        services::schedule::get_active_subscription(&stripe, customer_id.clone()).await?
    else {
        return Success::ok(PendingChangeResponse { pending: None });
    };

    let Some(schedule) =
        services::schedule::find_pending_schedule(&stripe, customer_id, subscription.id.as_str())
            .await?
    else {
        return Success::ok(PendingChangeResponse { pending: None });
    };

    let pending = services::schedule::pending_phase(&schedule).map(|(price_id, start)| {
        let next_plan = config
            .plan_catalog
            .plan_for_price(&price_id)
            .map(|plan| plan.as_str().to_string())
            .unwrap_or_default();
        PendingChange {
            next_plan,
            next_price_id: price_id,
            start_date_unix: start,
        }
    });

    Success::ok(PendingChangeResponse { pending })
}

/// Schedules an end-of-cycle downgrade to a strictly lower plan.
///
/// # Input
/// - `req`: `{ "targetPlan": "light" }` or `{ "targetPriceId": "price_..." }`
///
/// # Output
/// - Success: `{ "ok": true, "scheduled": true, "scheduleId": "sub_sched_..." }`.
///   Repeated calls while a schedule is pending return the same id without
///   creating a duplicate.
/// - Error: 400 when the target is not strictly lower than the current plan
///   or no active subscription exists
#[post("/schedule-downgrade")]
async fn post_schedule_downgrade(
    identity: web::ReqData<AuthIdentity>,
    req: web::Json<DowngradeRequest>,
    config: web::Data<Arc<Config>>,
    stripe: web::Data<Arc<stripe::Client>>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let pool: &PgPool = &pool;
    let target = match (&req.target_plan, &req.target_price_id) {
        (Some(key), _) => Plan::from_key(key)?,
        (None, Some(price_id)) => config.plan_catalog.plan_for_price(price_id).ok_or_else(|| {
            AppError::BadRequest(format!("Unknown price id: {}", price_id))
        })?,
        (None, None) => {
            return Err(AppError::BadRequest(
                "targetPlan or targetPriceId is required".to_string(),
            ));
        }
    };

    let user = db::user::get_or_create_user(pool, identity.id, &identity.email).await?;
    let current = Plan::from_key(&user.plan)?;
    if !current.can_downgrade_to(target) {
        return Err(AppError::BadRequest(format!(
            "Cannot downgrade from {} to {}",
            current, target
        )));
    }
    let target_price_id = config
        .plan_catalog
        .price_id(target)
        .ok_or_else(|| AppError::BadRequest(format!("Plan {} has no price", target)))?
        .to_string();

    let customer_id = user
        .stripe_customer_id
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("No billing account for this user".to_string()))?;
    let customer_id = common::stripe::parse_customer_id(customer_id)?;

    let subscription = services::schedule::get_active_subscription(&stripe, customer_id.clone())
        .await?
        .ok_or_else(|| AppError::BadRequest("No active subscription".to_string()))?;

    // Idempotent: a pending schedule on this subscription is returned as-is.
    if let Some(existing) =
        services::schedule::find_pending_schedule(&stripe, customer_id, subscription.id.as_str())
            .await?
    {
        return Success::ok(DowngradeResponse {
            ok: true,
            scheduled: true,
            schedule_id: existing.id.to_string(),
        });
    }

    let current_price_id = services::schedule::current_price_id(&subscription)
        .ok_or_else(|| AppError::Internal("Subscription carries no price".to_string()))?;

    let schedule = services::schedule::create_downgrade_schedule(
        &stripe,
        &subscription,
        &current_price_id,
        &target_price_id,
    )
    .await?;

    log::info!(
        "Scheduled downgrade {} -> {} for user {} (schedule {})",
        current,
        target,
        user.id,
        schedule.id
    );

    Success::ok(DowngradeResponse {
        ok: true,
        scheduled: true,
        schedule_id: schedule.id.to_string(),
    })
}

/// Cancels a pending downgrade, collapsing the schedule back to a single
/// current-phase item. `canceled` is false when nothing was pending.
#[post("/cancel-schedule")]
async fn post_cancel_schedule(
    identity: web::ReqData<AuthIdentity>,
    stripe: web::Data<Arc<stripe::Client>>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let pool: &PgPool = &pool;
    let user = db::user::get_or_create_user(pool, identity.id, &identity.email).await?;
    let Some(customer_id) = user.stripe_customer_id.as_deref() else {
        return Success::ok(CancelScheduleResponse {
            ok: true,
            canceled: false,
        });
    };
    let customer_id = common::stripe::parse_customer_id(customer_id)?;

    let Some(subscription) =
        services::schedule::get_active_subscription(&stripe, customer_id.clone()).await?
    else {
        return Success::ok(CancelScheduleResponse {
            ok: true,
            canceled: false,
        });
    };

    let Some(schedule) =
        services::schedule::find_pending_schedule(&stripe, customer_id, subscription.id.as_str())
            .await?
    else {
        return Success::ok(CancelScheduleResponse {
            ok: true,
            canceled: false,
        });
    };

    let current_price_id = services::schedule::current_price_id(&subscription)
        .ok_or_else(|| AppError::Internal("Subscription carries no price".to_string()))?;
    services::schedule::collapse_schedule(&stripe, &schedule, &subscription, &current_price_id)
        .await?;

    log::info!("Canceled pending schedule {} for user {}", schedule.id, user.id);

    Success::ok(CancelScheduleResponse {
        ok: true,
        canceled: true,
    })
}
