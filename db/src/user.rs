use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::models::user::User;

/// Fetches the row for an authenticated identity, creating it with the free
/// tier defaults on first sign-in.
pub async fn get_or_create_user<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    email: &str,
) -> Res<User> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, email)
        VALUES ($1, $2)
        ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(email)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)
}

pub async fn set_stripe_customer_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    customer_id: &str,
) -> Res<()> {
    sqlx::query("UPDATE users SET stripe_customer_id = $2, updated_at = now() WHERE id = $1")
        .bind(user_id)
        .bind(customer_id)
        .execute(executor)
        .await?;
    Ok(())
}

/// Applies a plan derived from a Stripe price id, keyed by customer id.
/// `credits_used` is zeroed only when the plan actually changes, so a
/// redelivered event is safe to apply twice.
pub async fn apply_plan_change<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    customer_id: &str,
    plan: &str,
    credits_total: i32,
    period_end: Option<DateTime<Utc>>,
) -> Res<u64> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET credits_used = CASE WHEN plan = $2 THEN credits_used ELSE 0 END,
            plan = $2,
            credits_total = $3,
            period_end = $4,
            updated_at = now()
        WHERE stripe_customer_id = $1
        "#,
    )
    .bind(customer_id)
    .bind(plan)
    .bind(credits_total)
    .bind(period_end)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Cycle renewal from a paid invoice: re-derives plan and period end and
/// unconditionally resets the usage counter.
pub async fn reset_cycle<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    customer_id: &str,
    plan: &str,
    credits_total: i32,
    period_end: Option<DateTime<Utc>>,
) -> Res<u64> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET plan = $2,
            credits_total = $3,
            credits_used = 0,
            period_end = $4,
            updated_at = now()
        WHERE stripe_customer_id = $1
        "#,
    )
    .bind(customer_id)
    .bind(plan)
    .bind(credits_total)
    .bind(period_end)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn reset_to_free<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    customer_id: &str,
    free_credits: i32,
) -> Res<u64> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET plan = 'free',
            credits_total = $2,
            credits_used = 0,
            period_end = NULL,
            updated_at = now()
        WHERE stripe_customer_id = $1
        "#,
    )
    .bind(customer_id)
    .bind(free_credits)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Consumes one credit with a single conditional update, so concurrent
/// requests from the same user cannot overdraw the allowance.
/// Returns the updated row, or None when the allowance is exhausted.
pub async fn consume_credit<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<Option<User>> {
    sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET credits_used = credits_used + 1, updated_at = now()
        WHERE id = $1 AND credits_used < credits_total
        RETURNING *
        "#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)
}
