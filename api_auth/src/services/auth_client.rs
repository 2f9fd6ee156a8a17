use log::warn;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::{
    env_config::AuthBackendConfig,
    error::{AppError, Res},
};

/// Identity resolved from a bearer token by the hosted auth backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthIdentity {
    pub id: Uuid,
    pub email: String,
}

/// Narrow client over the auth backend: one token lookup per request, no
/// session refresh, no caching.
pub struct AuthClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl AuthClient {
    pub fn new(config: &AuthBackendConfig) -> Self {
        AuthClient {
            client: Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
        }
    }

    /// Exchanges a bearer token for the identity it belongs to. Any backend
    /// rejection maps to "no identity" (401).
    pub async fn get_user(&self, token: &str) -> Res<AuthIdentity> {
        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .bearer_auth(token)
            .header("apikey", &self.anon_key)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            let error_response = response
                .json::<serde_json::Value>()
                .await
                .unwrap_or(serde_json::json!({"msg": "Failed to validate token"}));
            let message = error_response["msg"]
                .as_str()
                .unwrap_or("Failed to validate token")
                .to_string();
            warn!("Token validation failed: {}", message);
            return Err(AppError::Unauthorized(message));
        }

        let identity = response.json::<AuthIdentity>().await.map_err(|e| {
            warn!("Malformed identity payload from auth backend: {}", e);
            AppError::Unauthorized("Failed to validate token".to_string())
        })?;

        Ok(identity)
    }
}
