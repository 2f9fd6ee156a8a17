use common::error::Res;
use db::models::user::User;
use sqlx::PgPool;
use stripe::{Client, CustomerId};

/// Finds the Stripe customer for a user, creating one lazily on first
/// purchase and persisting the id back to the user row.
///
/// A stored id that Stripe reports as missing (key moved between test and
/// live environments) is discarded and re-created once; any other Stripe
/// failure propagates.
pub async fn find_or_create_customer(
    client: &Client,
    pool: &PgPool,
    user: &User,
) -> Res<CustomerId> {
    if let Some(existing) = &user.stripe_customer_id {
        match common::stripe::get_customer(client, existing).await {
            Ok(customer) if !customer.deleted => return Ok(customer.id),
            Ok(_) => {
                log::warn!(
                    "Stripe customer {} for user {} is deleted, re-creating",
                    existing,
                    user.id
                );
            }
            Err(common::error::AppError::Stripe(stripe::StripeError::Stripe(ref e)))
                if e.http_status == 404 =>
            {
                log::warn!(
                    "Stripe customer {} for user {} no longer exists, re-creating",
                    existing,
                    user.id
                );
            }
            Err(e) => return Err(e),
        }
    }

    let customer =
        common::stripe::create_customer(client, &user.email, &user.id.to_string()).await?;
    db::user::set_stripe_customer_id(pool, user.id, customer.id.as_str()).await?;

    Ok(customer.id)
}
