//! 容量组成员策略引擎
//!
//! 根据各组的显式名单、最小数量和占比目标，把候选节点分配到容量
//! 组。计算是纯函数，应用在集群锁保护下做差异写入。给定相同输入
//! 结果确定且幂等：重复执行不产生新的变更。

use automesh_core::models::{CapacityGroup, Node, NodeType};
use automesh_core::traits::{AdvisoryLock, GroupRepository, MembershipChange, NodeRepository};
use automesh_core::ClusterResult;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// 成员重算使用的集群锁名
pub const POLICY_LOCK_NAME: &str = "cluster_policy_lock";

/// 单个组的目标成员集合
#[derive(Debug, Clone)]
pub struct DesiredMembership {
    pub group_id: i64,
    pub group_name: String,
    pub is_container_group: bool,
    /// 目标成员节点id，保持分配顺序
    pub members: Vec<i64>,
    /// 计算前的成员集合
    pub prior: Vec<i64>,
}

/// 计算全部容量组的目标成员
///
/// 三个阶段：显式名单播种（不计入节点负载）、最小数量补齐、占比
/// 补齐。后两个阶段都按组当前规模升序处理，候选节点按已分配组数
/// 升序、节点id次序稳定排序，保证确定性。
pub fn compute_membership(
    nodes: &[Node],
    groups: &[CapacityGroup],
    control_plane_group: &str,
) -> Vec<DesiredMembership> {
    // 跳板节点永远不进入任何容量组
    let mut candidates: Vec<&Node> = nodes
        .iter()
        .filter(|n| n.node_type != NodeType::Hop)
        .collect();
    candidates.sort_by_key(|n| n.id);
    let by_hostname: HashMap<&str, &Node> = candidates
        .iter()
        .map(|n| (n.hostname.as_str(), *n))
        .collect();

    let mut desired: Vec<DesiredMembership> = Vec::with_capacity(groups.len());
    for group in groups {
        let mut members = Vec::new();
        for hostname in &group.policy_instance_list {
            let Some(node) = by_hostname.get(hostname.as_str()) else {
                info!("组 {} 的显式名单包含未知节点 {}", group.name, hostname);
                continue;
            };
            // 显式名单成员不计入节点的分配负载
            members.push(node.id);
        }
        if !members.is_empty() {
            debug!("显式名单：节点 {:?} 加入组 {}", members, group.name);
        }
        desired.push(DesiredMembership {
            group_id: group.id,
            group_name: group.name.clone(),
            is_container_group: group.is_container_group,
            members,
            prior: group.members.clone(),
        });
    }

    // 参与自动分组的节点及其当前分配计数
    let mut assignments: HashMap<i64, usize> = HashMap::new();
    let eligible: Vec<&Node> = candidates
        .iter()
        .filter(|n| n.managed_by_policy)
        .copied()
        .collect();
    debug!(
        "节点总数 {}，可参与策略分配 {}",
        candidates.len(),
        eligible.len()
    );

    // 最小数量补齐
    let mut order: Vec<usize> = (0..desired.len()).collect();
    order.sort_by_key(|&i| desired[i].members.len());
    for i in order {
        let exclude_type = excluded_type(&desired[i].group_name, control_plane_group);
        let minimum = groups[i].policy_instance_minimum as usize;
        let mut added = Vec::new();
        for node in sorted_by_load(&eligible, &assignments) {
            if desired[i].members.len() >= minimum {
                break;
            }
            if node.node_type == exclude_type {
                continue;
            }
            if desired[i].members.contains(&node.id) {
                continue;
            }
            desired[i].members.push(node.id);
            *assignments.entry(node.id).or_insert(0) += 1;
            added.push(node.id);
        }
        if !added.is_empty() {
            debug!("最小数量：节点 {:?} 加入组 {}", added, desired[i].group_name);
        }
    }

    // 占比补齐
    let mut order: Vec<usize> = (0..desired.len()).collect();
    order.sort_by_key(|&i| desired[i].members.len());
    for i in order {
        let exclude_type = excluded_type(&desired[i].group_name, control_plane_group);
        let pool_ct = eligible
            .iter()
            .filter(|n| n.node_type != exclude_type)
            .count();
        if pool_ct == 0 {
            continue;
        }
        let target = groups[i].policy_instance_percentage as f64;
        let mut added = Vec::new();
        for node in sorted_by_load(&eligible, &assignments) {
            if node.node_type == exclude_type {
                continue;
            }
            if desired[i].members.contains(&node.id) {
                continue;
            }
            if 100.0 * desired[i].members.len() as f64 / pool_ct as f64 >= target {
                break;
            }
            desired[i].members.push(node.id);
            *assignments.entry(node.id).or_insert(0) += 1;
            added.push(node.id);
        }
        if !added.is_empty() {
            debug!("占比目标：节点 {:?} 加入组 {}", added, desired[i].group_name);
        }
    }

    desired
}

/// 执行节点不进控制平面组，控制节点不进其他组
fn excluded_type(group_name: &str, control_plane_group: &str) -> NodeType {
    if group_name == control_plane_group {
        NodeType::Execution
    } else {
        NodeType::Control
    }
}

fn sorted_by_load<'a>(
    eligible: &[&'a Node],
    assignments: &HashMap<i64, usize>,
) -> Vec<&'a Node> {
    let mut ordered = eligible.to_vec();
    ordered.sort_by_key(|n| (assignments.get(&n.id).copied().unwrap_or(0), n.id));
    ordered
}

/// 成员策略引擎：锁保护下的计算加差异应用
pub struct MembershipPolicyEngine {
    nodes: Arc<dyn NodeRepository>,
    groups: Arc<dyn GroupRepository>,
    lock: Arc<dyn AdvisoryLock>,
    control_plane_group: String,
}

impl MembershipPolicyEngine {
    pub fn new(
        nodes: Arc<dyn NodeRepository>,
        groups: Arc<dyn GroupRepository>,
        lock: Arc<dyn AdvisoryLock>,
        control_plane_group: String,
    ) -> Self {
        Self {
            nodes,
            groups,
            lock,
            control_plane_group,
        }
    }

    /// 重算并应用全部容量组的成员
    ///
    /// 抢不到集群锁时跳过本轮。容器组由外部编排管理，即使计算出
    /// 差异也不应用。返回实际生效的变更列表。
    pub async fn apply(&self) -> ClusterResult<Vec<MembershipChange>> {
        let Some(_guard) = self.lock.try_acquire(POLICY_LOCK_NAME).await? else {
            debug!("策略锁被其他节点持有，跳过本轮成员重算");
            return Ok(Vec::new());
        };

        let nodes = self.nodes.list().await?;
        let groups = self.groups.list().await?;
        let desired = compute_membership(&nodes, &groups, &self.control_plane_group);

        let hostname_of: HashMap<i64, &str> = nodes
            .iter()
            .map(|n| (n.id, n.hostname.as_str()))
            .collect();

        let mut batch: Vec<(i64, Vec<i64>)> = Vec::new();
        let mut changes: Vec<MembershipChange> = Vec::new();
        for entry in &desired {
            let prior: HashSet<i64> = entry.prior.iter().copied().collect();
            let target: HashSet<i64> = entry.members.iter().copied().collect();
            if prior == target {
                continue;
            }
            if entry.is_container_group {
                debug!("容器组 {} 不参与策略应用", entry.group_name);
                continue;
            }
            let to_name = |id: &i64| hostname_of.get(id).unwrap_or(&"?").to_string();
            changes.push(MembershipChange {
                group_name: entry.group_name.clone(),
                added: target.difference(&prior).map(to_name).collect(),
                removed: prior.difference(&target).map(to_name).collect(),
            });
            batch.push((entry.group_id, entry.members.clone()));
        }

        if batch.is_empty() {
            debug!("成员策略无变更");
            return Ok(changes);
        }

        self.groups.apply_membership(&batch).await?;
        for change in &changes {
            info!(
                "组 {} 成员变更：加入 {:?}，移除 {:?}",
                change.group_name, change.added, change.removed
            );
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automesh_core::models::NodeState;
    use automesh_testing_utils::builders::{GroupBuilder, NodeBuilder};
    use automesh_testing_utils::mocks::{
        MemoryAdvisoryLock, MockGroupRepository, MockNodeRepository,
    };

    fn exec_node(id: i64, hostname: &str) -> Node {
        NodeBuilder::new(hostname)
            .id(id)
            .node_type(NodeType::Execution)
            .state(NodeState::Ready)
            .managed_by_policy(true)
            .build()
    }

    #[test]
    fn test_hop_nodes_never_assigned() {
        let nodes = vec![
            exec_node(1, "exec-1"),
            NodeBuilder::new("hop-1")
                .id(2)
                .node_type(NodeType::Hop)
                .managed_by_policy(true)
                .build(),
        ];
        let groups = vec![GroupBuilder::new(1, "default").minimum(5).build()];
        let desired = compute_membership(&nodes, &groups, "controlplane");
        assert_eq!(desired[0].members, vec![1]);
    }

    #[test]
    fn test_explicit_list_seeds_and_skips_unknown() {
        let nodes = vec![exec_node(1, "exec-1"), exec_node(2, "exec-2")];
        let groups = vec![GroupBuilder::new(1, "pinned")
            .policy_list(&["exec-2", "no-such-host"])
            .build()];
        let desired = compute_membership(&nodes, &groups, "controlplane");
        assert_eq!(desired[0].members, vec![2]);
    }

    #[test]
    fn test_explicit_list_does_not_count_as_load() {
        // exec-1 已在显式名单组里，但最小数量补齐仍把它视为零负载，
        // 与 exec-2 按id顺序竞争
        let nodes = vec![exec_node(1, "exec-1"), exec_node(2, "exec-2")];
        let groups = vec![
            GroupBuilder::new(1, "pinned").policy_list(&["exec-1"]).build(),
            GroupBuilder::new(2, "auto").minimum(1).build(),
        ];
        let desired = compute_membership(&nodes, &groups, "controlplane");
        assert_eq!(desired[1].members, vec![1]);
    }

    #[test]
    fn test_minimum_pass_prefers_least_loaded() {
        let nodes = vec![exec_node(1, "exec-1"), exec_node(2, "exec-2")];
        let groups = vec![
            GroupBuilder::new(1, "a").minimum(1).build(),
            GroupBuilder::new(2, "b").minimum(1).build(),
        ];
        let desired = compute_membership(&nodes, &groups, "controlplane");
        // 两个组各拿到一个不同的节点
        assert_eq!(desired[0].members.len(), 1);
        assert_eq!(desired[1].members.len(), 1);
        assert_ne!(desired[0].members[0], desired[1].members[0]);
    }

    #[test]
    fn test_smaller_groups_fill_first() {
        // 组规模 [0,1,0]：两个空组优先，各分到一个零负载节点
        let nodes = vec![
            exec_node(1, "exec-1"),
            exec_node(2, "exec-2"),
            exec_node(3, "exec-3"),
        ];
        let groups = vec![
            GroupBuilder::new(1, "a").minimum(1).build(),
            GroupBuilder::new(2, "b").policy_list(&["exec-3"]).minimum(1).build(),
            GroupBuilder::new(3, "c").minimum(1).build(),
        ];
        let desired = compute_membership(&nodes, &groups, "controlplane");
        assert_eq!(desired[0].members, vec![1]);
        assert_eq!(desired[2].members, vec![2]);
        assert_eq!(desired[1].members, vec![3]);
    }

    #[test]
    fn test_type_exclusions() {
        let nodes = vec![
            NodeBuilder::new("ctl-1")
                .id(1)
                .node_type(NodeType::Control)
                .managed_by_policy(true)
                .build(),
            exec_node(2, "exec-1"),
        ];
        let groups = vec![
            GroupBuilder::new(1, "controlplane").minimum(2).build(),
            GroupBuilder::new(2, "workers").minimum(2).build(),
        ];
        let desired = compute_membership(&nodes, &groups, "controlplane");
        // 执行节点不进控制平面组，控制节点不进普通组
        assert_eq!(desired[0].members, vec![1]);
        assert_eq!(desired[1].members, vec![2]);
    }

    #[test]
    fn test_percentage_pass() {
        let nodes = vec![
            exec_node(1, "exec-1"),
            exec_node(2, "exec-2"),
            exec_node(3, "exec-3"),
            exec_node(4, "exec-4"),
        ];
        let groups = vec![GroupBuilder::new(1, "half").percentage(50).build()];
        let desired = compute_membership(&nodes, &groups, "controlplane");
        assert_eq!(desired[0].members.len(), 2);
    }

    #[test]
    fn test_compute_is_idempotent() {
        let nodes = vec![exec_node(1, "exec-1"), exec_node(2, "exec-2")];
        let groups = vec![
            GroupBuilder::new(1, "a").minimum(1).percentage(100).build(),
            GroupBuilder::new(2, "b").minimum(1).build(),
        ];
        let first = compute_membership(&nodes, &groups, "controlplane");
        // 把第一轮结果作为先前成员再次计算，输出不变
        let groups_after: Vec<CapacityGroup> = groups
            .iter()
            .zip(&first)
            .map(|(g, d)| {
                let mut g = g.clone();
                g.members = d.members.clone();
                g
            })
            .collect();
        let second = compute_membership(&nodes, &groups_after, "controlplane");
        for (a, b) in first.iter().zip(&second) {
            let left: HashSet<i64> = a.members.iter().copied().collect();
            let right: HashSet<i64> = b.members.iter().copied().collect();
            assert_eq!(left, right);
        }
    }

    #[tokio::test]
    async fn test_apply_skips_container_groups() {
        let nodes = MockNodeRepository::new();
        nodes.add(exec_node(1, "exec-1"));
        let groups = MockGroupRepository::new();
        groups.add(
            GroupBuilder::new(1, "k8s")
                .container(true)
                .minimum(1)
                .build(),
        );
        let engine = MembershipPolicyEngine::new(
            Arc::new(nodes),
            Arc::new(groups.clone()),
            Arc::new(MemoryAdvisoryLock::new()),
            "controlplane".to_string(),
        );
        let changes = engine.apply().await.unwrap();
        assert!(changes.is_empty());
        assert!(groups.applied_changes().is_empty());
    }

    #[tokio::test]
    async fn test_apply_writes_only_diffs() {
        let nodes = MockNodeRepository::new();
        nodes.add(exec_node(1, "exec-1"));
        let groups = MockGroupRepository::new();
        groups.add(GroupBuilder::new(1, "auto").minimum(1).build());
        groups.add(GroupBuilder::new(2, "stable").minimum(1).members(&[1]).build());
        let engine = MembershipPolicyEngine::new(
            Arc::new(nodes),
            Arc::new(groups.clone()),
            Arc::new(MemoryAdvisoryLock::new()),
            "controlplane".to_string(),
        );
        let changes = engine.apply().await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].group_name, "auto");
        assert_eq!(changes[0].added, vec!["exec-1".to_string()]);
        let applied = groups.applied_changes();
        assert_eq!(applied, vec![(1, vec![1])]);
    }

    #[tokio::test]
    async fn test_apply_skips_cycle_when_lock_held() {
        let nodes = MockNodeRepository::new();
        nodes.add(exec_node(1, "exec-1"));
        let groups = MockGroupRepository::new();
        groups.add(GroupBuilder::new(1, "auto").minimum(1).build());
        let lock = Arc::new(MemoryAdvisoryLock::new());
        let held = lock.try_acquire(POLICY_LOCK_NAME).await.unwrap();
        assert!(held.is_some());

        let engine = MembershipPolicyEngine::new(
            Arc::new(nodes),
            Arc::new(groups.clone()),
            lock.clone(),
            "controlplane".to_string(),
        );
        let changes = engine.apply().await.unwrap();
        assert!(changes.is_empty());
        assert!(groups.applied_changes().is_empty());
    }
}
