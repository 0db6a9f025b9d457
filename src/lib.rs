pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use crate::core::{config::Settings, redis::RedisHandle, state::AppState, telemetry};
use crate::db::PoolProfile;
use crate::services::{Backends, Services};
use crate::tasks::grading::GradingPipeline;

/// Settings, tracing, metrics, migrated Postgres pool and a Redis handle. Redis being
/// unreachable is logged and tolerated: evaluations then fail closed and downloads skip the cache.
async fn bootstrap(
    profile: PoolProfile,
) -> anyhow::Result<(Settings, Backends, RedisHandle, sqlx::PgPool)> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings, profile).await?;
    db::run_migrations(&db_pool).await?;

    let redis = RedisHandle::new(settings.redis().redis_url());
    if let Err(err) = redis.connect().await {
        tracing::error!(error = %err, "Failed to connect to Redis; continuing without coordination");
    } else {
        tracing::info!("Redis connected successfully");
    }

    let backends = Backends::connect(&settings, db_pool.clone(), redis.clone())?;
    Ok((settings, backends, redis, db_pool))
}

pub async fn run() -> anyhow::Result<()> {
    let (settings, backends, redis, db_pool) = bootstrap(PoolProfile::API).await?;

    let services = Services::new(&settings, &backends);
    let state = AppState::new(settings, db_pool, redis.clone(), services);
    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "Essay grader API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}

pub async fn run_worker() -> anyhow::Result<()> {
    let (settings, backends, redis, _db_pool) = bootstrap(PoolProfile::WORKER).await?;

    let pipeline = GradingPipeline::new(&settings, &backends);
    let result = tasks::scheduler::run(pipeline, settings.grading().poll_interval()).await;

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}
