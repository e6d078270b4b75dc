use anyhow::Context;
use sqlx::postgres::PgConnectOptions;

pub mod subscribers;
pub mod users;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Lazy pool: no connection is attempted until the first query, so a store outage surfaces
/// at query time rather than at startup.
pub fn lazy_pool(options: PgConnectOptions) -> sqlx::PgPool {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(std::time::Duration::from_secs(10))
        .connect_lazy_with(options)
}
