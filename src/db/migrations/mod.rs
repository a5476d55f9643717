use anyhow::Result;
use log::info;
use sqlx::PgPool;

/// Migrations embedded at compile time, applied in order.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_create_detection_events",
        include_str!("sql/001_create_detection_events.sql"),
    ),
    (
        "002_create_device_tokens",
        include_str!("sql/002_create_device_tokens.sql"),
    ),
    (
        "003_create_upstream_credentials",
        include_str!("sql/003_create_upstream_credentials.sql"),
    ),
];

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    for (name, sql) in MIGRATIONS {
        sqlx::raw_sql(sql).execute(pool).await?;
        info!("Applied migration: {}", name);
    }

    Ok(())
}
