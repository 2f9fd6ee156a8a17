use common::error::{AppError, Res};
use stripe::{
    BillingPortalSession, CheckoutSession, CheckoutSessionMode, Client, CreateBillingPortalSession,
    CreateCheckoutSession, CustomerId,
};

/// Creates a subscription-mode checkout session for a resolved price id.
/// The plan key has already been validated against the catalog by the
/// caller, so an unknown plan never reaches Stripe.
pub async fn create_checkout_session(
    client: &Client,
    customer_id: CustomerId,
    price_id: &str,
    success_url: &str,
    cancel_url: &str,
) -> Res<CheckoutSession> {
    let params = CreateCheckoutSession {
        payment_method_types: Some(vec![stripe::CreateCheckoutSessionPaymentMethodTypes::Card]),
        line_items: Some(vec![stripe::CreateCheckoutSessionLineItems {
            price: Some(price_id.to_string()),
            quantity: Some(1),
            ..Default::default()
        }]),
        mode: Some(CheckoutSessionMode::Subscription),
        success_url: Some(success_url),
        cancel_url: Some(cancel_url),
        customer: Some(customer_id),
        ..Default::default()
    };
    CheckoutSession::create(client, params)
        .await
        .map_err(AppError::from)
}

/// Creates a billing-portal session and returns its redirect URL.
pub async fn create_portal_session(
    client: &Client,
    customer_id: CustomerId,
    return_url: &str,
) -> Res<BillingPortalSession> {
    let mut params = CreateBillingPortalSession::new(customer_id);
    params.return_url = Some(return_url);

    BillingPortalSession::create(client, params)
        .await
        .map_err(AppError::from)
}
