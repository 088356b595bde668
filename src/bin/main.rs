use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use guildhall_server::{
    cache::EntityCache,
    clock::SystemClock,
    config::Settings,
    db::pg::PgGateway,
    engine::Engine,
    http, metrics,
    notify::RedisNotifier,
};
use redis::Client as RedisClient;
use sqlx::postgres::PgPoolOptions;
use std::env;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    // Configuration
    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".into());
    let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".into());
    let settings = Settings::from_env();

    // Postgres pool
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("creating Postgres pool")?;

    // Redis client
    let redis_client = RedisClient::open(redis_url.as_str()).context("invalid REDIS_URL")?;

    // Engine wiring: Postgres behind the gateway, Redis pub/sub as the
    // notification sink, wall clock.
    let gateway = Arc::new(PgGateway::new(db_pool.clone()));
    let clock = Arc::new(SystemClock);
    let cache = Arc::new(EntityCache::new(gateway.clone(), clock.clone(), &settings));
    let sink = Arc::new(RedisNotifier::new(redis_client.clone(), cache.clone()));
    let engine = Engine::new(cache, gateway, sink, clock, settings);

    engine
        .bootstrap()
        .await
        .context("engine bootstrap from durable store")?;

    // Background sweeps: activity ladder, invite expiry, war-invite
    // purge. Handles live as long as main does.
    let _sweeps = engine.start_sweeps();

    // Start HTTP server
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(metrics::METRICS.clone())
            .app_data(web::Data::from(Arc::clone(&engine)))
            .app_data(web::Data::new(db_pool.clone()))
            .app_data(web::Data::new(redis_client.clone()))
            .configure(http::routes::init_routes)
    })
    .bind(&server_addr)?
    .run()
    .await?;

    Ok(())
}
