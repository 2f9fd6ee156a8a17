use std::{env, sync::Arc};

use crate::plan::PlanCatalog;

#[derive(Clone, Debug)]
/// Configuration struct for the server.
///
/// Holds everything required to initialize and run the service: database
/// connection details, server host and port, worker count, CORS settings,
/// logging preferences, the external auth backend, Stripe credentials with
/// the plan price table, and the generative image API.
pub struct Config {
    // environment
    pub environment: String, // development or production
    /// The URL of the database to connect to.
    pub database_url: String,
    /// The hostname or IP address the server will bind to.
    pub server_host: String,
    /// The port number the server will listen on.
    pub server_port: u16,
    /// The number of worker threads to spawn for handling requests.
    pub num_workers: usize,
    /// The allowed origin for CORS (Cross-Origin Resource Sharing).
    pub cors_allowed_origin: String,
    /// A boolean indicating whether console logging is enabled.
    pub console_logging_enabled: bool,
    /// Public URL of the browser client, used for checkout/portal redirects.
    pub public_app_url: String,
    /// Configuration for the hosted auth backend.
    pub auth_backend: AuthBackendConfig,
    /// Stripe secret key
    pub stripe_secret_key: String,
    /// Stripe webhook secret
    pub stripe_webhook_secret: String,
    /// Static plan -> price-id table for the paid tiers.
    pub plan_catalog: PlanCatalog,
    /// Configuration for the generative image API.
    pub gemini: GeminiConfig,
}

#[derive(Clone, Debug)]
/// Connection details for the hosted auth backend that owns user identities.
/// Tokens are exchanged for an identity with one lookup per request.
pub struct AuthBackendConfig {
    /// Base URL of the auth backend.
    pub url: String,
    /// Public (anon) API key sent alongside user tokens.
    pub anon_key: String,
}

#[derive(Clone, Debug)]
/// Settings for the generative image API.
pub struct GeminiConfig {
    /// API key for the generative image API. May be empty, in which case the
    /// health endpoint reports the service as not ready.
    pub api_key: String,
    /// Model identifier to call.
    pub model: String,
    /// Upper bound for a single synchronous generation call, in seconds.
    pub timeout_secs: u64,
}

impl Config {
    /// Creates a new `Config` instance from environment variables.
    ///
    /// # Environment Variables
    ///
    /// Required:
    /// - `ENVIRONMENT`: "development" or "production"
    /// - `DATABASE_URL`: Connection string for the database
    /// - `AUTH_BACKEND_URL`, `AUTH_ANON_KEY`
    /// - `STRIPE_PRICE_LIGHT`, `STRIPE_PRICE_BASIC`, `STRIPE_PRICE_PRO`
    ///
    /// Optional (with defaults):
    /// - `IP`: Server host (default: "127.0.0.1")
    /// - `PORT`: Server port (default: 8080)
    /// - `WORKERS`: Number of worker threads (default: 4)
    /// - `CORS_ALLOWED_ORIGIN`: Allowed CORS origin (default: "http://localhost:3000")
    /// - `ENABLE_CONSOLE_LOGGING`: Whether to enable console logging (default: true)
    /// - `PUBLIC_APP_URL`: Public client URL (default: "http://localhost:3000")
    /// - `STRIPE_SECRET_KEY`, `STRIPE_WEBHOOK_SECRET`: empty when unset
    /// - `GEMINI_API_KEY`: empty when unset
    /// - `GEMINI_MODEL` (default: "gemini-2.5-flash-image-preview")
    /// - `GEMINI_TIMEOUT_SECS` (default: 60)
    ///
    /// # Panics
    ///
    /// Panics if required environment variables are missing or if numeric
    /// values cannot be parsed.
    pub fn from_env() -> Arc<Self> {
        dotenvy::dotenv().ok();

        let stripe_secret_key = env::var("STRIPE_SECRET_KEY").unwrap_or_default();
        let stripe_webhook_secret = env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default();

        Arc::new(Config {
            environment: env::var("ENVIRONMENT").expect("ENVIRONMENT must be set"),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            server_host: env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            num_workers: env::var("WORKERS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .unwrap_or(4),
            cors_allowed_origin: env::var("CORS_ALLOWED_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            console_logging_enabled: env::var("ENABLE_CONSOLE_LOGGING")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                == "true",
            public_app_url: env::var("PUBLIC_APP_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            auth_backend: AuthBackendConfig {
                url: env::var("AUTH_BACKEND_URL").expect("AUTH_BACKEND_URL must be set"),
                anon_key: env::var("AUTH_ANON_KEY").expect("AUTH_ANON_KEY must be set"),
            },
            stripe_secret_key,
            stripe_webhook_secret,
            plan_catalog: PlanCatalog {
                light_price_id: env::var("STRIPE_PRICE_LIGHT")
                    .expect("STRIPE_PRICE_LIGHT must be set"),
                basic_price_id: env::var("STRIPE_PRICE_BASIC")
                    .expect("STRIPE_PRICE_BASIC must be set"),
                pro_price_id: env::var("STRIPE_PRICE_PRO").expect("STRIPE_PRICE_PRO must be set"),
            },
            gemini: GeminiConfig {
                api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
                model: env::var("GEMINI_MODEL")
                    .unwrap_or_else(|_| "gemini-2.5-flash-image-preview".to_string()),
                timeout_secs: env::var("GEMINI_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .expect("GEMINI_TIMEOUT_SECS must be a valid number"),
            },
        })
    }
}
