pub(crate) mod models;
pub(crate) mod types;

use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool};

use crate::core::config::Settings;

/// Connection budget per process kind. The worker grades one submission at a time, so it
/// needs far fewer connections than the API.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PoolProfile {
    application_name: &'static str,
    max_connections: u32,
}

impl PoolProfile {
    pub(crate) const API: Self = Self { application_name: "essay-grader", max_connections: 20 };
    pub(crate) const WORKER: Self =
        Self { application_name: "essay-grader-worker", max_connections: 4 };
}

pub(crate) async fn init_pool(settings: &Settings, profile: PoolProfile) -> anyhow::Result<PgPool> {
    let connect_options: PgConnectOptions = settings
        .database()
        .database_url()
        .parse()
        .context("Invalid database URL")?;
    let connect_options = connect_options
        .application_name(profile.application_name)
        .log_statements(tracing::log::LevelFilter::Off);

    let pool = PgPoolOptions::new()
        .max_connections(profile.max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .test_before_acquire(true)
        .connect_with(connect_options)
        .await
        .context("Failed to connect to Postgres")?;

    tracing::info!(
        application_name = profile.application_name,
        max_connections = profile.max_connections,
        "Database pool ready"
    );
    Ok(pool)
}

pub(crate) async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await.context("Failed to apply migrations")?;
    Ok(())
}
