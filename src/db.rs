//! PostgreSQL 连接
//! 授权库的连接池、迁移，以及命令行入口使用的 connect

use crate::config::DatabaseConfig;
use secrecy::ExposeSecret;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("AUTHZ_DATABASE__URL is not set")]
    MissingUrl,

    #[error("Cannot connect to authz database: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("Authz schema migration failed: {0}")]
    Migrate(#[source] sqlx::migrate::MigrateError),
}

impl From<DbError> for crate::error::AppError {
    fn from(e: DbError) -> Self {
        crate::error::AppError::Internal(e.to_string())
    }
}

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
}

/// 建立连接池（URL 不进入日志）
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, DbError> {
    let url = config.url.as_ref().ok_or(DbError::MissingUrl)?;
    let pool = pool_options(config)
        .connect(url.expose_secret())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Authz database unreachable");
            DbError::Connect(e)
        })?;

    tracing::debug!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Authz pool ready"
    );
    record_pool_metrics(&pool);
    Ok(pool)
}

/// 执行 migrations/ 下的 roles、user_roles、grants 表结构
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        tracing::error!(error = %e, "Authz migration failed");
        DbError::Migrate(e)
    })?;
    tracing::debug!("Authz schema up to date");
    Ok(())
}

/// 连接并迁移，命令行每次运行调用一次
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DbError> {
    let pool = create_pool(config).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

pub fn record_pool_metrics(pool: &PgPool) {
    metrics::gauge!("authz_db_pool_size").set(pool.size() as f64);
    metrics::gauge!("authz_db_pool_idle").set(pool.num_idle() as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn database_config(url: Option<&str>) -> DatabaseConfig {
        DatabaseConfig {
            url: url.map(|u| Secret::new(u.to_string())),
            max_connections: 1,
            min_connections: 0,
            acquire_timeout_secs: 1,
            idle_timeout_secs: 1,
            max_lifetime_secs: 1,
        }
    }

    #[tokio::test]
    async fn test_missing_url_fails_before_connecting() {
        let err = connect(&database_config(None)).await.unwrap_err();
        assert!(matches!(err, DbError::MissingUrl));
    }

    #[tokio::test]
    async fn test_unreachable_database_maps_to_internal() {
        let config = database_config(Some("postgresql://nobody@127.0.0.1:1/none"));

        let err = create_pool(&config).await.unwrap_err();
        assert!(matches!(err, DbError::Connect(_)));

        let app: crate::error::AppError = err.into();
        assert_eq!(app.code(), 500);
    }
}
