use std::{future::Future, pin::Pin, sync::Arc};

use actix_web::{
    Error, HttpMessage,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use futures::future::{Ready, ok};

use common::error::AppError;

use crate::services::auth_client::AuthClient;

/// Gate for authenticated routes: exchanges the bearer token for an identity
/// via the auth backend and stores it in the request extensions. Requests
/// with a missing, malformed or rejected token never reach the inner
/// service.
pub struct AuthMiddleware {
    client: Arc<AuthClient>,
}

impl AuthMiddleware {
    pub fn new(client: Arc<AuthClient>) -> Self {
        AuthMiddleware { client }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareService {
            service: Arc::new(service),
            client: self.client.clone(),
        })
    }
}

pub struct AuthMiddlewareService<S> {
    service: Arc<S>,
    client: Arc<AuthClient>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token_value = req
            .headers()
            .get("Authorization")
            .and_then(|header| header.to_str().ok())
            .and_then(|header| {
                if header.starts_with("Bearer ") {
                    Some(header[7..].to_string())
                } else {
                    None
                }
            });

        let client = self.client.clone();
        let srv = Arc::clone(&self.service);

        Box::pin(async move {
            let Some(token) = token_value else {
                let response =
                    AppError::Unauthorized("No authorization token provided".to_string())
                        .to_http_response();
                return Ok(req.into_response(response));
            };

            match client.get_user(&token).await {
                Ok(identity) => {
                    req.extensions_mut().insert(identity);
                    srv.call(req).await.map(|res| res.map_into_boxed_body())
                }
                Err(err) => Ok(req.into_response(err.to_http_response())),
            }
        })
    }
}
