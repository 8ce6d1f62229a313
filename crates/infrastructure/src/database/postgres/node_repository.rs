use async_trait::async_trait;
use automesh_core::models::{Node, NodeState};
use automesh_core::traits::NodeRepository;
use automesh_core::{ClusterError, ClusterResult};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::debug;

/// PostgreSQL 节点仓储实现
pub struct PostgresNodeRepository {
    pool: PgPool,
}

impl PostgresNodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 将数据库行转换为Node模型
    fn row_to_node(row: &sqlx::postgres::PgRow) -> ClusterResult<Node> {
        Ok(Node {
            id: row.try_get("id")?,
            hostname: row.try_get("hostname")?,
            uuid: row.try_get("uuid")?,
            node_type: row.try_get("node_type")?,
            node_state: row.try_get("node_state")?,
            capacity: row.try_get("capacity")?,
            last_seen: row.try_get("last_seen")?,
            last_health_check: row.try_get("last_health_check")?,
            version: row.try_get("version")?,
            enabled: row.try_get("enabled")?,
            managed_by_policy: row.try_get("managed_by_policy")?,
            errors: row.try_get("errors")?,
        })
    }
}

const NODE_COLUMNS: &str = "id, hostname, uuid, node_type, node_state, capacity, \
     last_seen, last_health_check, version, enabled, managed_by_policy, errors";

#[async_trait]
impl NodeRepository for PostgresNodeRepository {
    async fn list(&self) -> ClusterResult<Vec<Node>> {
        let rows = sqlx::query(&format!("SELECT {NODE_COLUMNS} FROM nodes ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_node).collect()
    }

    async fn get_by_hostname(&self, hostname: &str) -> ClusterResult<Option<Node>> {
        let row = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE hostname = $1"
        ))
        .bind(hostname)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_node).transpose()
    }

    async fn register(&self, node: &Node) -> ClusterResult<(Node, bool)> {
        // 并发注册时以先写入者为准，冲突方读回现有记录
        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO nodes (hostname, uuid, node_type, node_state, capacity,
                               last_seen, last_health_check, version, enabled,
                               managed_by_policy, errors)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (hostname) DO NOTHING
            RETURNING {NODE_COLUMNS}
            "#
        ))
        .bind(&node.hostname)
        .bind(node.uuid)
        .bind(node.node_type)
        .bind(node.node_state)
        .bind(node.capacity)
        .bind(node.last_seen)
        .bind(node.last_health_check)
        .bind(&node.version)
        .bind(node.enabled)
        .bind(node.managed_by_policy)
        .bind(&node.errors)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            let node = Self::row_to_node(&row)?;
            debug!("注册节点成功: {}", node.hostname);
            return Ok((node, true));
        }

        let existing = self
            .get_by_hostname(&node.hostname)
            .await?
            .ok_or_else(|| ClusterError::node_not_found(&node.hostname))?;
        Ok((existing, false))
    }

    async fn save_health_data(
        &self,
        hostname: &str,
        version: &str,
        last_seen: DateTime<Utc>,
        advance_state: bool,
        errors: &str,
    ) -> ClusterResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE nodes
            SET version = $2, last_seen = $3, errors = $4,
                node_state = CASE WHEN $5 AND node_state = 'installed'
                                  THEN 'ready' ELSE node_state END
            WHERE hostname = $1
            "#,
        )
        .bind(hostname)
        .bind(version)
        .bind(last_seen)
        .bind(errors)
        .bind(advance_state)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ClusterError::node_not_found(hostname));
        }
        Ok(())
    }

    async fn mark_offline(
        &self,
        hostname: &str,
        observed_last_seen: Option<DateTime<Utc>>,
        errors: &str,
    ) -> ClusterResult<()> {
        // last_seen在读取后又被推进说明节点已重新上线，放弃本次标记
        let result = sqlx::query(
            r#"
            UPDATE nodes
            SET node_state = 'unavailable', capacity = 0, errors = $3
            WHERE hostname = $1 AND last_seen IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(hostname)
        .bind(observed_last_seen)
        .bind(errors)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ClusterError::UpdateConflict);
        }
        debug!("节点已标记下线: {}", hostname);
        Ok(())
    }

    async fn set_last_seen(&self, hostname: &str, last_seen: DateTime<Utc>) -> ClusterResult<()> {
        let result = sqlx::query("UPDATE nodes SET last_seen = $2 WHERE hostname = $1")
            .bind(hostname)
            .bind(last_seen)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ClusterError::node_not_found(hostname));
        }
        Ok(())
    }

    async fn set_state(&self, hostname: &str, state: NodeState) -> ClusterResult<()> {
        let result = sqlx::query("UPDATE nodes SET node_state = $2 WHERE hostname = $1")
            .bind(hostname)
            .bind(state)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ClusterError::node_not_found(hostname));
        }
        Ok(())
    }

    async fn save_health_check(
        &self,
        hostname: &str,
        checked_at: DateTime<Utc>,
        capacity: i32,
        version: &str,
        errors: &str,
    ) -> ClusterResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE nodes
            SET last_health_check = $2, capacity = $3, version = $4, errors = $5
            WHERE hostname = $1
            "#,
        )
        .bind(hostname)
        .bind(checked_at)
        .bind(capacity)
        .bind(version)
        .bind(errors)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ClusterError::node_not_found(hostname));
        }
        debug!("已保存节点 {} 的健康检查结果，容量: {}", hostname, capacity);
        Ok(())
    }

    async fn deprovision(&self, hostname: &str) -> ClusterResult<()> {
        let result = sqlx::query("DELETE FROM nodes WHERE hostname = $1")
            .bind(hostname)
            .execute(&self.pool)
            .await?;

        // 已被其他控制节点删除视为并发竞争
        if result.rows_affected() == 0 {
            return Err(ClusterError::UpdateConflict);
        }
        debug!("节点已撤编删除: {}", hostname);
        Ok(())
    }
}
