use async_trait::async_trait;
use automesh_core::models::{Link, LinkState};
use automesh_core::traits::LinkRepository;
use automesh_core::{ClusterError, ClusterResult};
use sqlx::{PgPool, Row};

/// PostgreSQL 网格连接仓储实现
pub struct PostgresLinkRepository {
    pool: PgPool,
}

impl PostgresLinkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LinkRepository for PostgresLinkRepository {
    async fn list_in_state(&self, state: LinkState) -> ClusterResult<Vec<Link>> {
        let rows = sqlx::query(
            "SELECT id, source, target, link_state FROM links WHERE link_state = $1 ORDER BY id",
        )
        .bind(state)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Link {
                    id: row.try_get("id")?,
                    source: row.try_get("source")?,
                    target: row.try_get("target")?,
                    link_state: row.try_get("link_state")?,
                })
            })
            .collect()
    }

    async fn set_state(&self, link_id: i64, state: LinkState) -> ClusterResult<()> {
        let result = sqlx::query("UPDATE links SET link_state = $2 WHERE id = $1")
            .bind(link_id)
            .bind(state)
            .execute(&self.pool)
            .await?;

        // 连接边可能在巡检期间被拓扑变更删除
        if result.rows_affected() == 0 {
            return Err(ClusterError::UpdateConflict);
        }
        Ok(())
    }
}
