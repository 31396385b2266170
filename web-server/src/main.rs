// web-server/src/main.rs
mod api;
mod error;
mod middleware;
mod session_registry;
mod utils;
mod verifier;

use actix::Actor;
use actix_web::{get, web, App, HttpResponse, HttpServer, Responder};
use common::{setup_tracing, Config};
use std::time::Duration;

use crate::middleware::rate_limiter::RateLimiter;
use crate::session_registry::SessionRegistryActor;

const NONCE_RATE_WINDOW_SECONDS: u64 = 60;

#[get("/")]
async fn index() -> impl Responder {
    HttpResponse::Ok().body("SIWE Session Server")
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    setup_tracing();

    let config = Config::from_env();
    let server_addr = config.web_server_addr.clone();

    if config.session.jwt_secret == "dev_secret" {
        tracing::warn!("Using the development session secret; set APP__SESSION__JWT_SECRET in production");
    }
    tracing::info!(
        "Starting Web Server on {} for domain {} (required chain: {} / {})",
        server_addr,
        config.siwe.domain,
        config.chains.required.name,
        config.chains.required.id
    );

    let registry = SessionRegistryActor::new(&config.session).start();
    let rate_limiter = RateLimiter::new(
        vec!["/api/auth/nonce".to_string()],
        config.session.nonce_rate_limit,
        Duration::from_secs(NONCE_RATE_WINDOW_SECONDS),
    );

    let config_data = web::Data::new(config);
    let registry_data = web::Data::new(registry);

    HttpServer::new(move || {
        App::new()
            .wrap(rate_limiter.clone())
            .app_data(config_data.clone())
            .app_data(registry_data.clone())
            .service(index)
            .configure(api::configure)
    })
    .bind(&server_addr)?
    .run()
    .await
}
