use crate::config::AppConfig;
use anyhow::{Context, Result};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use std::time::Duration;
use tracing::info;

pub async fn init_database(config: &AppConfig) -> Result<MySqlPool> {
    info!("Initializing database connection pool");

    let pool = MySqlPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(config.database.connection_timeout))
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    // 测试连接
    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("Failed to execute test query")?;

    info!("Database connection pool initialized successfully");

    // 运行数据库迁移
    if !config.is_testing() {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;
        info!("Database migrations completed successfully");
    }

    Ok(pool)
}
