use common::error::{AppError, Res};
// Three generated enums share this name; the phase config wants the
// subscription_schedule one, so it is named explicitly.
use stripe::generated::billing::subscription_schedule::SubscriptionProrationBehavior;
use stripe::{
    Client, CreateSubscriptionSchedule, CustomerId, Scheduled, Subscription, SubscriptionSchedule,
    SubscriptionScheduleEndBehavior, SubscriptionScheduleStatus, UpdateSubscriptionSchedule,
    UpdateSubscriptionSchedulePhases, UpdateSubscriptionSchedulePhasesItems,
};

/// Fetches the customer's active subscription, if any.
pub async fn get_active_subscription(
    client: &Client,
    customer_id: CustomerId,
) -> Res<Option<Subscription>> {
    let subscriptions = Subscription::list(
        client,
        &stripe::ListSubscriptions {
            customer: Some(customer_id),
            status: Some(stripe::SubscriptionStatusFilter::Active),
            limit: Some(1),
            ..Default::default()
        },
    )
    .await
    .map_err(AppError::from)?;

    Ok(subscriptions.data.into_iter().next())
}

/// Price id of the subscription's first (and only) item.
pub fn current_price_id(subscription: &Subscription) -> Option<String> {
    subscription
        .items
        .data
        .first()
        .and_then(|item| item.price.as_ref())
        .map(|price| price.id.to_string())
}

fn is_pending(status: SubscriptionScheduleStatus) -> bool {
    matches!(
        status,
        SubscriptionScheduleStatus::Active | SubscriptionScheduleStatus::NotStarted
    )
}

/// Looks for a non-canceled schedule already attached to the subscription.
/// Downgrade scheduling is a no-op when one exists.
pub async fn find_pending_schedule(
    client: &Client,
    customer_id: CustomerId,
    subscription_id: &str,
) -> Res<Option<SubscriptionSchedule>> {
    let schedules = SubscriptionSchedule::list(
        client,
        &stripe::ListSubscriptionSchedules {
            customer: Some(customer_id),
            limit: Some(10),
            ..Default::default()
        },
    )
    .await
    .map_err(AppError::from)?;

    Ok(schedules.data.into_iter().find(|schedule| {
        is_pending(schedule.status)
            && schedule
                .subscription
                .as_ref()
                .map(|sub| sub.id().as_str() == subscription_id)
                .unwrap_or(false)
    }))
}

/// Creates a two-phase schedule for a deferred downgrade: current pricing
/// until the period end, then the target price with no proration.
pub async fn create_downgrade_schedule(
    client: &Client,
    subscription: &Subscription,
    current_price_id: &str,
    target_price_id: &str,
) -> Res<SubscriptionSchedule> {
    let mut create = CreateSubscriptionSchedule::new();
    create.from_subscription = Some(subscription.id.as_str());
    let schedule = SubscriptionSchedule::create(client, create)
        .await
        .map_err(AppError::from)?;

    let phases = vec![
        UpdateSubscriptionSchedulePhases {
            items: vec![UpdateSubscriptionSchedulePhasesItems {
                price: Some(current_price_id.to_string()),
                quantity: Some(1),
                ..Default::default()
            }],
            start_date: Some(Scheduled::Timestamp(subscription.current_period_start)),
            end_date: Some(Scheduled::Timestamp(subscription.current_period_end)),
            ..Default::default()
        },
        UpdateSubscriptionSchedulePhases {
            items: vec![UpdateSubscriptionSchedulePhasesItems {
                price: Some(target_price_id.to_string()),
                quantity: Some(1),
                ..Default::default()
            }],
            start_date: Some(Scheduled::Timestamp(subscription.current_period_end)),
            proration_behavior: Some(SubscriptionProrationBehavior::None),
            ..Default::default()
        },
    ];

    SubscriptionSchedule::update(
        client,
        &schedule.id,
        UpdateSubscriptionSchedule {
            end_behavior: Some(SubscriptionScheduleEndBehavior::Release),
            phases: Some(phases),
            ..Default::default()
        },
    )
    .await
    .map_err(AppError::from)
}

/// Cancels a pending downgrade by collapsing the schedule back to a single
/// phase carrying the current pricing.
pub async fn collapse_schedule(
    client: &Client,
    schedule: &SubscriptionSchedule,
    subscription: &Subscription,
    current_price_id: &str,
) -> Res<SubscriptionSchedule> {
    let phases = vec![UpdateSubscriptionSchedulePhases {
        items: vec![UpdateSubscriptionSchedulePhasesItems {
            price: Some(current_price_id.to_string()),
            quantity: Some(1),
            ..Default::default()
        }],
        start_date: Some(Scheduled::Timestamp(subscription.current_period_start)),
        end_date: Some(Scheduled::Timestamp(subscription.current_period_end)),
        ..Default::default()
    }];

    SubscriptionSchedule::update(
        client,
        &schedule.id,
        UpdateSubscriptionSchedule {
            end_behavior: Some(SubscriptionScheduleEndBehavior::Release),
            phases: Some(phases),
            ..Default::default()
        },
    )
    .await
    .map_err(AppError::from)
}

/// Extracts the deferred phase from a pending schedule: the price id the
/// subscription will switch to and the unix timestamp when it starts.
pub fn pending_phase(schedule: &SubscriptionSchedule) -> Option<(String, i64)> {
    let phase = schedule.phases.get(1)?;
    let price_id = phase
        .items
        .first()
        .map(|item| item.price.id().to_string())?;
    Some((price_id, phase.start_date))
}
