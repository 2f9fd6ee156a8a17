use std::sync::Arc;

use actix_web::{Responder, get, web};
use common::{error::Res, http::Success};
use sqlx::PgPool;

use crate::services::auth_client::AuthIdentity;

/// Returns the authenticated user's row: plan, credit counters and billing
/// cycle boundary. The row is created with free-tier defaults on first call.
#[get("")]
async fn get_me(
    identity: web::ReqData<AuthIdentity>,
    pool: web::Data<Arc<PgPool>>,
) -> Res<impl Responder> {
    let pg_pool: &PgPool = &**pool;
    let user = db::user::get_or_create_user(pg_pool, identity.id, &identity.email).await?;
    Success::ok(user)
}
