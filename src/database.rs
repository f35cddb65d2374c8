//! PostgreSQL pool.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::Postgres;

pub const DEFAULT_CREDENTIALS: &str = "postgres";
pub const DEFAULT_DATABASE_NAME: &str = "warden";
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// Connection URL built from `config`, the explicit URL winning.
pub fn connection_url(config: &Postgres) -> String {
    if let Some(url) = &config.url {
        return url.clone();
    }

    let username = config.username.as_deref().unwrap_or(DEFAULT_CREDENTIALS);
    let password = config.password.as_deref().unwrap_or(DEFAULT_CREDENTIALS);
    let database = config.database.as_deref().unwrap_or(DEFAULT_DATABASE_NAME);
    format!(
        "postgres://{username}:{password}@{}/{database}",
        config.address
    )
}

/// Open the pool and run pending migrations.
pub async fn connect(config: &Postgres) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size.unwrap_or(DEFAULT_POOL_SIZE))
        .connect(&connection_url(config))
        .await?;

    sqlx::migrate!().run(&pool).await?;
    tracing::info!(address = %config.address, "postgres connected");

    Ok(pool)
}
