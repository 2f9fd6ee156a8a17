use chrono::{DateTime, Utc};
use common::{
    error::{AppError, Res},
    plan::{Plan, PlanCatalog},
};
use sqlx::PgPool;
use stripe::{
    CheckoutSessionMode, Client, Customer, Event, EventObject, EventType, Expandable, Invoice,
    Subscription, SubscriptionStatus, Webhook,
};

/// Creates an event for the webhook based on the request payload and
/// signature. Requires the webhook signing secret; a tampered body or bad
/// signature fails here, before any side effect.
pub fn construct_event(payload: &str, signature: &str, webhook_secret: &str) -> Res<Event> {
    match Webhook::construct_event(payload, signature, webhook_secret) {
        Ok(event) => Ok(event),
        Err(e) => {
            log::error!("Error constructing webhook event: {}", e);
            Err(AppError::BadRequest(format!("Webhook Error: {}", e)))
        }
    }
}

/// Subscription statuses that keep the paid plan applied. Anything else
/// (canceled, incomplete, paused) leaves the user row untouched.
pub fn status_is_entitled(status: SubscriptionStatus) -> bool {
    matches!(
        status,
        SubscriptionStatus::Active
            | SubscriptionStatus::Trialing
            | SubscriptionStatus::PastDue
            | SubscriptionStatus::Unpaid
    )
}

pub fn subscription_price_id(subscription: &Subscription) -> Option<String> {
    subscription
        .items
        .data
        .first()
        .and_then(|item| item.price.as_ref())
        .map(|price| price.id.to_string())
}

/// Price id and period end from the invoice line items. The invoice is the
/// preferred source of truth on renewal, since the subscription object can
/// lag behind it.
pub fn invoice_price_and_period(invoice: &Invoice) -> (Option<String>, Option<i64>) {
    let line = invoice.lines.as_ref().and_then(|lines| lines.data.first());
    let price_id = line
        .and_then(|line| line.price.as_ref())
        .map(|price| price.id.to_string());
    let period_end = line
        .and_then(|line| line.period.as_ref())
        .and_then(|period| period.end);
    (price_id, period_end)
}

fn expandable_customer_id(customer: &Expandable<Customer>) -> String {
    match customer {
        Expandable::Id(id) => id.to_string(),
        Expandable::Object(customer) => customer.id.to_string(),
    }
}

fn unix_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}

/// Row update derived from a verified event. Deriving it is pure; the
/// database write happens in `apply_update`.
#[derive(Debug, PartialEq)]
pub enum PlanUpdate {
    Apply {
        plan: Plan,
        period_end: Option<i64>,
        reset_usage: bool,
    },
    Skip,
}

fn plan_update(
    catalog: &PlanCatalog,
    price_id: &str,
    period_end: Option<i64>,
    reset_usage: bool,
) -> PlanUpdate {
    match catalog.plan_for_price(price_id) {
        Some(plan) => PlanUpdate::Apply {
            plan,
            period_end,
            reset_usage,
        },
        // An unmapped price id is acknowledged without an update, so a
        // misconfigured environment never clobbers a user's plan.
        None => {
            log::warn!("No plan mapped for price {}, skipping update", price_id);
            PlanUpdate::Skip
        }
    }
}

/// Update for a created or updated subscription. The usage counter is left
/// alone; only a paid invoice resets it.
pub fn subscription_update(catalog: &PlanCatalog, subscription: &Subscription) -> PlanUpdate {
    if !status_is_entitled(subscription.status) {
        log::info!(
            "Ignoring subscription {} in status {}",
            subscription.id,
            subscription.status
        );
        return PlanUpdate::Skip;
    }
    let Some(price_id) = subscription_price_id(subscription) else {
        log::warn!("Subscription {} carries no price", subscription.id);
        return PlanUpdate::Skip;
    };
    plan_update(
        catalog,
        &price_id,
        Some(subscription.current_period_end),
        false,
    )
}

/// Update for a paid invoice: plan re-derived from the invoice line and the
/// usage counter reset for the new cycle.
pub fn invoice_update(catalog: &PlanCatalog, invoice: &Invoice) -> PlanUpdate {
    let (price_id, period_end) = invoice_price_and_period(invoice);
    let Some(price_id) = price_id else {
        log::warn!("Invoice {} carries no price line", invoice.id);
        return PlanUpdate::Skip;
    };
    plan_update(catalog, &price_id, period_end, true)
}

async fn apply_update(pool: &PgPool, customer_id: &str, update: PlanUpdate) -> Res<()> {
    let PlanUpdate::Apply {
        plan,
        period_end,
        reset_usage,
    } = update
    else {
        return Ok(());
    };

    let period_end = period_end.and_then(unix_to_datetime);
    let rows = if reset_usage {
        db::user::reset_cycle(
            pool,
            customer_id,
            plan.as_str(),
            plan.credit_allowance(),
            period_end,
        )
        .await?
    } else {
        db::user::apply_plan_change(
            pool,
            customer_id,
            plan.as_str(),
            plan.credit_allowance(),
            period_end,
        )
        .await?
    };

    if rows == 0 {
        log::warn!("No user row for Stripe customer {}", customer_id);
    } else {
        log::info!("Customer {} set to plan {}", customer_id, plan);
    }
    Ok(())
}

/// Processes a verified webhook event. Every branch is an idempotent
/// upsert keyed by customer id, so provider redelivery is safe.
pub async fn process_event(
    pool: &PgPool,
    catalog: &PlanCatalog,
    client: &Client,
    event: Event,
) -> Res<()> {
    log::info!("Processing webhook event: {}", event.type_);

    match event.type_ {
        EventType::CheckoutSessionCompleted => {
            if let EventObject::CheckoutSession(session) = event.data.object {
                if session.mode != CheckoutSessionMode::Subscription {
                    return Ok(());
                }
                let Some(customer) = session.customer.as_ref() else {
                    return Ok(());
                };
                let customer_id = expandable_customer_id(customer);

                // The session only references the subscription; the price id
                // lives on the subscription object itself.
                let subscription = match session.subscription {
                    Some(Expandable::Object(subscription)) => *subscription,
                    Some(Expandable::Id(id)) => Subscription::retrieve(client, &id, &[])
                        .await
                        .map_err(AppError::from)?,
                    None => return Ok(()),
                };
                let update = subscription_update(catalog, &subscription);
                apply_update(pool, &customer_id, update).await?;
            }
        }
        EventType::CustomerSubscriptionCreated | EventType::CustomerSubscriptionUpdated => {
            if let EventObject::Subscription(subscription) = event.data.object {
                let customer_id = expandable_customer_id(&subscription.customer);
                let update = subscription_update(catalog, &subscription);
                apply_update(pool, &customer_id, update).await?;
            }
        }
        EventType::InvoicePaymentSucceeded => {
            if let EventObject::Invoice(invoice) = event.data.object {
                let Some(customer) = invoice.customer.as_ref() else {
                    return Ok(());
                };
                let customer_id = expandable_customer_id(customer);
                let update = invoice_update(catalog, &invoice);
                apply_update(pool, &customer_id, update).await?;
            }
        }
        EventType::CustomerSubscriptionDeleted => {
            if let EventObject::Subscription(subscription) = event.data.object {
                let customer_id = expandable_customer_id(&subscription.customer);
                let rows =
                    db::user::reset_to_free(pool, &customer_id, Plan::Free.credit_allowance())
                        .await?;
                if rows == 0 {
                    log::warn!("No user row for Stripe customer {}", customer_id);
                } else {
                    log::info!("Customer {} reset to free plan", customer_id);
                }
            }
        }
        _ => {
            log::info!("Unhandled event type: {}", event.type_);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    const SECRET: &str = "whsec_test123secret456";

    fn sign(payload: &str, secret: &str, timestamp: i64) -> String {
        let signed_payload = format!("{}.{}", timestamp, payload);
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
        mac.update(signed_payload.as_bytes());
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let payload = r#"{"type":"checkout.session.completed"}"#;
        let header = sign(payload, SECRET, now());
        let tampered = r#"{"type":"customer.subscription.deleted"}"#;

        assert!(construct_event(tampered, &header, SECRET).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let payload = r#"{"type":"checkout.session.completed"}"#;
        let header = sign(payload, "whsec_other", now());

        assert!(construct_event(payload, &header, SECRET).is_err());
    }

    #[test]
    fn malformed_signature_header_is_rejected() {
        let payload = r#"{"type":"checkout.session.completed"}"#;

        assert!(construct_event(payload, "not-a-signature", SECRET).is_err());
        assert!(construct_event(payload, "", SECRET).is_err());
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let payload = r#"{"type":"checkout.session.completed"}"#;
        // 10 minutes old, beyond the default tolerance
        let header = sign(payload, SECRET, now() - 600);

        assert!(construct_event(payload, &header, SECRET).is_err());
    }

    fn catalog() -> PlanCatalog {
        PlanCatalog {
            light_price_id: "price_light".to_string(),
            basic_price_id: "price_basic".to_string(),
            pro_price_id: "price_pro".to_string(),
        }
    }

    fn invoice_fixture(price_id: &str, period_end: i64) -> Invoice {
        serde_json::from_value(serde_json::json!({
            "id": "in_test123",
            "customer": "cus_test123",
            "lines": {
                "data": [{
                    "id": "il_test123",
                    "amount": 900,
                    "currency": "usd",
                    "discountable": false,
                    "livemode": false,
                    "metadata": {},
                    "proration": false,
                    "type": "subscription",
                    "price": { "id": price_id },
                    "period": { "start": period_end - 2_592_000, "end": period_end }
                }],
                "has_more": false,
                "url": "/v1/invoices/in_test123/lines"
            }
        }))
        .expect("invoice fixture deserializes")
    }

    fn subscription_fixture(status: &str, price_id: &str) -> Subscription {
        serde_json::from_value(serde_json::json!({
            "id": "sub_test123",
            "automatic_tax": { "enabled": false },
            "billing_cycle_anchor": 1_735_689_600,
            "cancel_at_period_end": false,
            "created": 1_735_689_600,
            "currency": "usd",
            "current_period_start": 1_735_689_600,
            "current_period_end": 1_738_368_000,
            "customer": "cus_test123",
            "items": {
                "data": [{
                    "id": "si_test123",
                    "price": { "id": price_id }
                }],
                "has_more": false,
                "url": "/v1/subscription_items?subscription=sub_test123"
            },
            "livemode": false,
            "metadata": {},
            "start_date": 1_735_689_600,
            "status": status
        }))
        .expect("subscription fixture deserializes")
    }

    #[test]
    fn invoice_line_yields_price_and_period() {
        let invoice = invoice_fixture("price_basic", 1_738_368_000);
        let (price_id, period_end) = invoice_price_and_period(&invoice);
        assert_eq!(price_id.as_deref(), Some("price_basic"));
        assert_eq!(period_end, Some(1_738_368_000));
    }

    #[test]
    fn invoice_without_lines_yields_nothing() {
        let invoice: Invoice = serde_json::from_value(serde_json::json!({ "id": "in_empty" }))
            .expect("bare invoice deserializes");
        assert_eq!(invoice_price_and_period(&invoice), (None, None));
    }

    #[test]
    fn paid_invoice_resets_usage_for_the_mapped_plan() {
        let invoice = invoice_fixture("price_basic", 1_738_368_000);
        assert_eq!(
            invoice_update(&catalog(), &invoice),
            PlanUpdate::Apply {
                plan: Plan::Basic,
                period_end: Some(1_738_368_000),
                reset_usage: true,
            }
        );
        assert_eq!(Plan::Basic.credit_allowance(), 300);
    }

    #[test]
    fn subscription_change_applies_plan_without_resetting_usage() {
        let subscription = subscription_fixture("active", "price_light");
        assert_eq!(
            subscription_update(&catalog(), &subscription),
            PlanUpdate::Apply {
                plan: Plan::Light,
                period_end: Some(1_738_368_000),
                reset_usage: false,
            }
        );
    }

    #[test]
    fn canceled_subscription_is_skipped() {
        let subscription = subscription_fixture("canceled", "price_light");
        assert_eq!(subscription_update(&catalog(), &subscription), PlanUpdate::Skip);
    }

    #[test]
    fn unmapped_price_is_skipped() {
        let subscription = subscription_fixture("active", "price_legacy");
        assert_eq!(subscription_update(&catalog(), &subscription), PlanUpdate::Skip);
        let invoice = invoice_fixture("price_legacy", 1_738_368_000);
        assert_eq!(invoice_update(&catalog(), &invoice), PlanUpdate::Skip);
    }

    #[test]
    fn entitlement_follows_subscription_status() {
        assert!(status_is_entitled(SubscriptionStatus::Active));
        assert!(status_is_entitled(SubscriptionStatus::Trialing));
        assert!(status_is_entitled(SubscriptionStatus::PastDue));
        assert!(status_is_entitled(SubscriptionStatus::Unpaid));
        assert!(!status_is_entitled(SubscriptionStatus::Canceled));
        assert!(!status_is_entitled(SubscriptionStatus::Incomplete));
        assert!(!status_is_entitled(SubscriptionStatus::IncompleteExpired));
    }
}
