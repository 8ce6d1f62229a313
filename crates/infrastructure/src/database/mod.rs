//! 数据库连接与仓储实现

pub mod postgres;

use automesh_core::config::DatabaseConfig;
use automesh_core::ClusterResult;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

/// 按配置创建PostgreSQL连接池
pub async fn create_pool(config: &DatabaseConfig) -> ClusterResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
        .connect(&config.url)
        .await?;

    // 启动时验证连通性，失败尽早暴露
    sqlx::query("SELECT 1").execute(&pool).await?;
    info!("数据库连接池就绪，最大连接数: {}", config.max_connections);
    Ok(pool)
}
