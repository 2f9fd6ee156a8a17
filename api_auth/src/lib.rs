use std::sync::Arc;

use actix_web::web;
use middleware::auth::AuthMiddleware;
use services::auth_client::AuthClient;

pub mod middleware {
    pub mod auth;
}
pub mod services {
    pub mod auth_client;
}
pub mod routes {
    pub mod user;
}

pub use services::auth_client::AuthIdentity;

// Auth middleware
pub fn auth_middleware(client: Arc<AuthClient>) -> AuthMiddleware {
    AuthMiddleware::new(client)
}

pub fn mount_user() -> actix_web::Scope {
    web::scope("").service(routes::user::get_me)
}
