use async_trait::async_trait;
use automesh_core::models::CapacityGroup;
use automesh_core::traits::GroupRepository;
use automesh_core::ClusterResult;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tracing::debug;

/// PostgreSQL 容量组仓储实现
pub struct PostgresGroupRepository {
    pool: PgPool,
}

impl PostgresGroupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GroupRepository for PostgresGroupRepository {
    async fn list(&self) -> ClusterResult<Vec<CapacityGroup>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, policy_instance_list, policy_instance_minimum,
                   policy_instance_percentage, is_container_group
            FROM capacity_groups ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let member_rows =
            sqlx::query("SELECT group_id, node_id FROM capacity_group_members ORDER BY node_id")
                .fetch_all(&self.pool)
                .await?;

        let mut members: HashMap<i64, Vec<i64>> = HashMap::new();
        for row in &member_rows {
            let group_id: i64 = row.try_get("group_id")?;
            let node_id: i64 = row.try_get("node_id")?;
            members.entry(group_id).or_default().push(node_id);
        }

        let mut groups = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.try_get("id")?;
            groups.push(CapacityGroup {
                id,
                name: row.try_get("name")?,
                policy_instance_list: row.try_get("policy_instance_list")?,
                policy_instance_minimum: row.try_get("policy_instance_minimum")?,
                policy_instance_percentage: row.try_get("policy_instance_percentage")?,
                is_container_group: row.try_get("is_container_group")?,
                members: members.remove(&id).unwrap_or_default(),
            });
        }
        Ok(groups)
    }

    async fn apply_membership(&self, changes: &[(i64, Vec<i64>)]) -> ClusterResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        // 全部成员变更在同一事务内生效，避免策略应用到一半被读到
        let mut tx = self.pool.begin().await?;
        for (group_id, member_ids) in changes {
            sqlx::query("DELETE FROM capacity_group_members WHERE group_id = $1")
                .bind(group_id)
                .execute(&mut *tx)
                .await?;

            if !member_ids.is_empty() {
                sqlx::query(
                    r#"
                    INSERT INTO capacity_group_members (group_id, node_id)
                    SELECT $1, node_id FROM UNNEST($2::bigint[]) AS t(node_id)
                    "#,
                )
                .bind(group_id)
                .bind(member_ids)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;

        debug!("已应用 {} 个容量组的成员变更", changes.len());
        Ok(())
    }
}
