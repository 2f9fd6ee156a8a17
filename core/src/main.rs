mod cors;

use std::sync::Arc;

use actix_web::{
    App, HttpServer,
    web::{self},
};
use api_auth::services::auth_client::AuthClient;
use api_edit::services::gemini::GeminiClient;
use common::env_config::Config;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // get env vars
    let config = Config::from_env();
    let config_data = config.clone();

    // get info
    let is_production = config.environment == "production";
    let origin = config.cors_allowed_origin.clone();

    // init logger
    if config.console_logging_enabled {
        logger::setup().expect("Failed to set up logger");
    }

    // init db connection
    let pool = db::setup(&config.database_url, is_production)
        .await
        .expect("Failed to set up database");

    // per-process clients, injected into handlers
    let auth_client = Arc::new(AuthClient::new(&config.auth_backend));
    let gemini_client = Arc::new(GeminiClient::new(&config.gemini));
    let stripe_client = Arc::new(common::stripe::create_client(&config.stripe_secret_key));

    HttpServer::new(move || {
        let auth_client = auth_client.clone();
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(config_data.clone()))
            .app_data(web::Data::new(auth_client.clone()))
            .app_data(web::Data::new(gemini_client.clone()))
            .app_data(web::Data::new(stripe_client.clone()))
            .wrap(logger::middleware())
            .wrap(cors::middleware(&origin))
            .service(
                web::scope("/api")
                    .service(api_edit::mount_edit())
                    .service(
                        web::scope("/stripe")
                            .service(api_billing::mount_webhook())
                            .service(
                                web::scope("")
                                    .wrap(api_auth::auth_middleware(auth_client.clone()))
                                    .service(api_billing::mount_billing()),
                            ),
                    )
                    .service(
                        web::scope("/me")
                            .wrap(api_auth::auth_middleware(auth_client))
                            .service(api_auth::mount_user()),
                    ),
            )
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .workers(config.num_workers)
    .run()
    .await
}
