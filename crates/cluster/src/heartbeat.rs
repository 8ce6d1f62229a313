//! 集群心跳协调
//!
//! 每个控制节点按固定周期运行一轮：刷新自身存活记录、巡检网格
//! 拓扑、识别失联节点并发起回收。多个节点并发运行同一任务，网格
//! 巡检部分用非阻塞咨询锁互斥，其余写入按乐观冲突容忍竞争。

use crate::health::HealthCheckTrigger;
use crate::reaper::Reaper;
use automesh_core::config::{ClusterConfig, NodeConfig};
use automesh_core::models::{LinkState, Node, NodeState, NodeType};
use automesh_core::traits::{AdvisoryLock, LinkRepository, MeshTransport, NodeRepository};
use automesh_core::{ClusterError, ClusterResult};
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 网格巡检使用的集群锁名
pub const MESH_INSPECTION_LOCK_NAME: &str = "mesh_inspection_lock";

/// 失联节点任务的回收解释
const LOST_NODE_EXPLANATION: &str = "任务因所在节点下线被回收";

/// 心跳协调器
pub struct HeartbeatCoordinator {
    nodes: Arc<dyn NodeRepository>,
    links: Arc<dyn LinkRepository>,
    mesh: Arc<dyn MeshTransport>,
    lock: Arc<dyn AdvisoryLock>,
    health: Arc<dyn HealthCheckTrigger>,
    reaper: Arc<Reaper>,
    node_config: NodeConfig,
    cluster: ClusterConfig,
}

impl HeartbeatCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        nodes: Arc<dyn NodeRepository>,
        links: Arc<dyn LinkRepository>,
        mesh: Arc<dyn MeshTransport>,
        lock: Arc<dyn AdvisoryLock>,
        health: Arc<dyn HealthCheckTrigger>,
        reaper: Arc<Reaper>,
        node_config: NodeConfig,
        cluster: ClusterConfig,
    ) -> Self {
        Self {
            nodes,
            links,
            mesh,
            lock,
            health,
            reaper,
            node_config,
            cluster,
        }
    }

    /// 执行一轮心跳
    ///
    /// `active_work_ids` 是本进程当前仍在执行的任务分发标识，本地
    /// 回收会排除它们；`dispatch_time` 是本轮任务的派发时刻，只回收
    /// 在那之前启动的任务，避免误杀刚派发还没入库的工作。
    pub async fn run_cycle(
        &self,
        active_work_ids: &[String],
        dispatch_time: DateTime<Utc>,
    ) -> ClusterResult<()> {
        debug!("集群心跳开始");
        let nowtime = Utc::now();
        let nodes = self.load_active_nodes().await?;

        if let Err(e) = self.inspect_mesh(&nodes, nowtime).await {
            warn!("网格巡检失败，本轮跳过拓扑更新: {}", e);
        }
        // 巡检可能刚推进了重入节点的 last_seen，失联判定用刷新后的视图
        let nodes = self.load_active_nodes().await?;

        let this_inst = nodes
            .iter()
            .find(|n| n.hostname == self.node_config.hostname)
            .cloned();
        let mut lost_nodes: Vec<&Node> = Vec::new();
        let mut live_peers: Vec<&Node> = Vec::new();
        for node in &nodes {
            if node.hostname == self.node_config.hostname {
                continue;
            }
            if node.is_lost(nowtime, self.cluster.node_liveness_timeout_seconds) {
                lost_nodes.push(node);
            } else {
                live_peers.push(node);
            }
        }

        let this_inst = match this_inst {
            Some(node) => node,
            None => self.register_self(nowtime).await?,
        };

        let startup_event =
            this_inst.is_lost(nowtime, self.cluster.node_liveness_timeout_seconds);
        let last_last_seen = this_inst.last_seen;
        self.nodes
            .save_health_data(&this_inst.hostname, &self.node_config.version, nowtime, true, "")
            .await?;

        if startup_event && this_inst.capacity != 0 {
            warn!(
                "节点 {} 重新加入集群，此前 last_seen={:?}",
                this_inst.hostname, last_last_seen
            );
            return Ok(());
        }
        match last_last_seen {
            None => warn!("节点没有历史 last_seen，已更新为 {}", nowtime),
            Some(last) => {
                let expected = self.cluster.heartbeat_period_seconds as i64
                    + self.cluster.heartbeat_grace_seconds as i64;
                if nowtime - last > Duration::seconds(expected) {
                    warn!(
                        "心跳间隔偏斜：实际 {:.1} 秒，预期 {} 秒",
                        (nowtime - last).num_milliseconds() as f64 / 1000.0,
                        self.cluster.heartbeat_period_seconds
                    );
                }
            }
        }

        self.check_version_skew(&this_inst, &live_peers)?;

        for other in &lost_nodes {
            if let Err(e) = self
                .reaper
                .reap(other, &[], None, LOST_NODE_EXPLANATION)
                .await
            {
                error!("回收节点 {} 的任务失败: {}", other.hostname, e);
            }
            if let Err(e) = self
                .reaper
                .reap_waiting(other, 0, &[], LOST_NODE_EXPLANATION)
                .await
            {
                error!("回收节点 {} 的排队任务失败: {}", other.hostname, e);
            }
            self.retire_lost_node(other).await;
        }

        if let Err(e) = self
            .reaper
            .reap(
                &this_inst,
                active_work_ids,
                Some(dispatch_time),
                "任务已不在任何活跃进程中，被本地回收",
            )
            .await
        {
            error!("本地回收失败: {}", e);
        }
        if let Err(e) = self
            .reaper
            .reap_waiting(
                &this_inst,
                self.cluster.waiting_grace_period_seconds as i64,
                active_work_ids,
                "任务排队超时，被本地回收",
            )
            .await
        {
            error!("本地排队任务回收失败: {}", e);
        }
        Ok(())
    }

    async fn load_active_nodes(&self) -> ClusterResult<Vec<Node>> {
        let all_nodes = self.nodes.list().await?;
        Ok(all_nodes
            .into_iter()
            .filter(|n| {
                matches!(
                    n.node_state,
                    NodeState::Ready | NodeState::Unavailable | NodeState::Installed
                )
            })
            .collect())
    }

    /// 自身记录缺失时的处理
    ///
    /// 自动撤编模式下的节点可能被别的节点删掉过，重新注册即可；
    /// 否则视为部署错误，直接失败。
    async fn register_self(&self, nowtime: DateTime<Utc>) -> ClusterResult<Node> {
        if !self.cluster.auto_deprovision {
            return Err(ClusterError::node_not_found(&self.node_config.hostname));
        }
        let template = Node {
            id: 0,
            hostname: self.node_config.hostname.clone(),
            uuid: Uuid::new_v4(),
            node_type: NodeType::Control,
            node_state: NodeState::Installed,
            capacity: 0,
            last_seen: Some(nowtime),
            last_health_check: None,
            version: self.node_config.version.clone(),
            enabled: true,
            managed_by_policy: true,
            errors: String::new(),
        };
        let (node, created) = self.nodes.register(&template).await?;
        if created {
            warn!("节点记录 {} 被意外移除，已重新注册", node.hostname);
        }
        Ok(node)
    }

    /// 网格拓扑巡检，非阻塞锁保护，抢不到就跳过
    async fn inspect_mesh(&self, nodes: &[Node], nowtime: DateTime<Utc>) -> ClusterResult<()> {
        let Some(_guard) = self.lock.try_acquire(MESH_INSPECTION_LOCK_NAME).await? else {
            debug!("网格巡检锁被其他节点持有，跳过");
            return Ok(());
        };
        let status = self.mesh.status().await?;

        // 连接开销已确认的边从 Adding 翻转到 Established
        for link in self.links.list_in_state(LinkState::Adding).await? {
            if status.has_connection_cost(&link.source, &link.target) {
                self.links.set_state(link.id, LinkState::Established).await?;
            }
        }

        for node in nodes {
            // 控制平面节点由本地心跳维护，不走通告
            if node.node_type.is_control_plane() {
                continue;
            }
            let Some(ad) = status.advertisements.get(&node.hostname) else {
                continue;
            };
            if let Some(ad_time) = ad.timestamp {
                let newer = node.last_seen.map(|seen| seen < ad_time).unwrap_or(true);
                if !newer {
                    continue;
                }
                self.nodes.set_last_seen(&node.hostname, ad_time).await?;
            } else {
                continue;
            }

            let was_down = matches!(
                node.node_state,
                NodeState::Unavailable | NodeState::Installed
            );
            if node.node_type == NodeType::Hop {
                if was_down {
                    warn!("跳板节点 {} 重新出现在网格上", node.hostname);
                    self.nodes
                        .save_health_data(&node.hostname, &node.version, nowtime, true, "")
                        .await?;
                }
                continue;
            }

            if was_down {
                warn!("执行节点 {} 尝试重新加入集群", node.hostname);
                self.health.trigger(&node.hostname).await;
            } else if node.capacity == 0 && node.enabled {
                // 连接正常但容量为零的节点降频复查，等待人工修复生效
                let due = match node.last_health_check {
                    None => true,
                    Some(checked) => {
                        (nowtime - checked).num_seconds()
                            >= self.cluster.remediation_interval_seconds as i64
                    }
                };
                if due {
                    debug!("为存在已知错误的执行节点 {} 重启健康检查", node.hostname);
                    self.health.trigger(&node.hostname).await;
                }
            }
        }

        // 锁随guard释放
        Ok(())
    }

    /// 任一控制平面对等节点版本比本机新时立即失败
    ///
    /// 混版本集群继续写共享存储会造成损坏，停止接单等待升级。
    fn check_version_skew(&self, this_inst: &Node, peers: &[&Node]) -> ClusterResult<()> {
        for other in peers {
            if matches!(other.node_type, NodeType::Execution | NodeType::Hop) {
                continue;
            }
            if other.version.is_empty() || other.version.starts_with("runner") {
                continue;
            }
            if compare_versions(&other.version, &self.node_config.version) == Ordering::Greater
                && !self.node_config.debug
            {
                error!(
                    "节点 {} 的版本是 {}，本机 {} 还在 {}，停止服务",
                    other.hostname,
                    other.version,
                    this_inst.hostname,
                    self.node_config.version
                );
                return Err(ClusterError::version_skew(
                    &other.hostname,
                    &other.version,
                    &self.node_config.version,
                ));
            }
        }
        Ok(())
    }

    /// 失联节点的善后：自动撤编或标记下线
    ///
    /// 条件更新冲突说明别的节点已经处理过，降级为调试日志。
    async fn retire_lost_node(&self, other: &Node) {
        if self.cluster.auto_deprovision && other.node_type == NodeType::Control {
            match self.nodes.deprovision(&other.hostname).await {
                Ok(()) => info!("节点 {} 已自动撤编", other.hostname),
                Err(e) if e.is_benign_conflict() => {
                    debug!("节点 {} 已被其他节点撤编", other.hostname);
                }
                Err(e) => error!("撤编节点 {} 失败: {}", other.hostname, e),
            }
        } else if other.node_state == NodeState::Ready {
            let result = self
                .nodes
                .mark_offline(
                    &other.hostname,
                    other.last_seen,
                    "其他集群节点判定该节点无响应",
                )
                .await;
            match result {
                Ok(()) => error!(
                    "节点 {} 最后心跳于 {:?}，已标记为失联",
                    other.hostname, other.last_seen
                ),
                Err(e) if e.is_benign_conflict() => {
                    debug!("节点 {} 已被其他节点标记为失联", other.hostname);
                }
                Err(e) => error!("标记节点 {} 失联时出错: {}", other.hostname, e),
            }
        }
    }
}

/// 比较形如 "1.2.3" 或 "1.2.3-rc1" 的版本号，只看数字段
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.split('-')
            .next()
            .unwrap_or("")
            .split('.')
            .map(|part| part.parse::<u64>().unwrap_or(0))
            .collect()
    };
    let left = parse(a);
    let right = parse(b);
    let len = left.len().max(right.len());
    for i in 0..len {
        let l = left.get(i).copied().unwrap_or(0);
        let r = right.get(i).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use automesh_core::models::{JobKind, JobStatus, Link};
    use automesh_core::traits::{Advertisement, MeshStatus};
    use automesh_testing_utils::builders::{JobBuilder, NodeBuilder};
    use automesh_testing_utils::mocks::{
        MemoryAdvisoryLock, MockJobRepository, MockLinkRepository, MockMeshTransport,
        MockNodeRepository, MockWorkUnitControl, RecordingDispatchQueue,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct RecordingTrigger {
        triggered: Mutex<Vec<String>>,
    }

    impl RecordingTrigger {
        fn new() -> Self {
            Self {
                triggered: Mutex::new(Vec::new()),
            }
        }

        fn triggered(&self) -> Vec<String> {
            self.triggered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HealthCheckTrigger for RecordingTrigger {
        async fn trigger(&self, hostname: &str) {
            self.triggered.lock().unwrap().push(hostname.to_string());
        }
    }

    struct Fixture {
        nodes: Arc<MockNodeRepository>,
        links: Arc<MockLinkRepository>,
        mesh: Arc<MockMeshTransport>,
        jobs: Arc<MockJobRepository>,
        trigger: Arc<RecordingTrigger>,
        node_config: NodeConfig,
        cluster: ClusterConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                nodes: Arc::new(MockNodeRepository::new()),
                links: Arc::new(MockLinkRepository::new()),
                mesh: Arc::new(MockMeshTransport::new()),
                jobs: Arc::new(MockJobRepository::new()),
                trigger: Arc::new(RecordingTrigger::new()),
                node_config: NodeConfig {
                    hostname: "ctl-1".to_string(),
                    version: "1.0.0".to_string(),
                    debug: false,
                },
                cluster: ClusterConfig::default(),
            }
        }

        fn coordinator(&self) -> HeartbeatCoordinator {
            let reaper = Arc::new(Reaper::new(
                self.nodes.clone(),
                self.jobs.clone(),
                Arc::new(MockWorkUnitControl::new()),
                Arc::new(RecordingDispatchQueue::new()),
                self.cluster.node_liveness_timeout_seconds as i64,
                "callback_events".to_string(),
            ));
            HeartbeatCoordinator::new(
                self.nodes.clone(),
                self.links.clone(),
                self.mesh.clone(),
                Arc::new(MemoryAdvisoryLock::new()),
                self.trigger.clone(),
                reaper,
                self.node_config.clone(),
                self.cluster.clone(),
            )
        }

        fn add_self(&self, last_seen_ago_seconds: i64, capacity: i32) {
            self.nodes.add(
                NodeBuilder::new("ctl-1")
                    .id(1)
                    .node_type(NodeType::Hybrid)
                    .state(NodeState::Ready)
                    .capacity(capacity)
                    .version("1.0.0")
                    .last_seen(Utc::now() - Duration::seconds(last_seen_ago_seconds))
                    .build(),
            );
        }
    }

    #[tokio::test]
    async fn test_cycle_refreshes_own_heartbeat() {
        let f = Fixture::new();
        f.add_self(30, 100);
        let before = Utc::now();
        f.coordinator().run_cycle(&[], Utc::now()).await.unwrap();
        let me = f.nodes.get("ctl-1").unwrap();
        assert!(me.last_seen.unwrap() >= before);
    }

    #[tokio::test]
    async fn test_missing_self_record_is_fatal_without_auto_deprovision() {
        let f = Fixture::new();
        let result = f.coordinator().run_cycle(&[], Utc::now()).await;
        assert!(matches!(result, Err(ClusterError::NodeNotFound { .. })));
    }

    #[tokio::test]
    async fn test_missing_self_record_reregisters_with_auto_deprovision() {
        let mut f = Fixture::new();
        f.cluster.auto_deprovision = true;
        f.coordinator().run_cycle(&[], Utc::now()).await.unwrap();
        assert!(f.nodes.get("ctl-1").is_some());
    }

    #[tokio::test]
    async fn test_rejoining_node_skips_rest_of_cycle() {
        let f = Fixture::new();
        // 本机记录已过期但容量非零：典型的重启重入场景
        f.add_self(600, 100);
        let lost_peer = NodeBuilder::new("ctl-2")
            .id(2)
            .node_type(NodeType::Hybrid)
            .state(NodeState::Ready)
            .version("1.0.0")
            .last_seen(Utc::now() - Duration::seconds(900))
            .build();
        f.nodes.add(lost_peer);
        f.jobs.add(
            JobBuilder::new(1)
                .kind(JobKind::Job)
                .status(JobStatus::Running)
                .controller_node("ctl-2")
                .build(),
        );

        f.coordinator().run_cycle(&[], Utc::now()).await.unwrap();

        // 重入轮次不处理失联节点，避免基于过期视图做决定
        assert_eq!(f.jobs.get(1).unwrap().status, JobStatus::Running);
        assert_eq!(f.nodes.get("ctl-2").unwrap().node_state, NodeState::Ready);
    }

    #[tokio::test]
    async fn test_newer_peer_version_is_fatal() {
        let f = Fixture::new();
        f.add_self(30, 100);
        f.nodes.add(
            NodeBuilder::new("ctl-2")
                .id(2)
                .node_type(NodeType::Control)
                .state(NodeState::Ready)
                .version("1.2.0")
                .last_seen(Utc::now())
                .build(),
        );
        let result = f.coordinator().run_cycle(&[], Utc::now()).await;
        assert!(matches!(result, Err(ClusterError::VersionSkew { .. })));
    }

    #[tokio::test]
    async fn test_version_skew_ignored_in_debug_mode() {
        let mut f = Fixture::new();
        f.node_config.debug = true;
        f.add_self(30, 100);
        f.nodes.add(
            NodeBuilder::new("ctl-2")
                .id(2)
                .node_type(NodeType::Control)
                .state(NodeState::Ready)
                .version("1.2.0")
                .last_seen(Utc::now())
                .build(),
        );
        f.coordinator().run_cycle(&[], Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn test_execution_node_versions_do_not_trigger_skew() {
        let f = Fixture::new();
        f.add_self(30, 100);
        f.nodes.add(
            NodeBuilder::new("exec-1")
                .id(2)
                .node_type(NodeType::Execution)
                .state(NodeState::Ready)
                .version("runner-9.9.9")
                .last_seen(Utc::now())
                .build(),
        );
        f.coordinator().run_cycle(&[], Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn test_lost_node_is_reaped_and_marked_offline() {
        let f = Fixture::new();
        f.add_self(30, 100);
        f.nodes.add(
            NodeBuilder::new("ctl-2")
                .id(2)
                .node_type(NodeType::Hybrid)
                .state(NodeState::Ready)
                .version("1.0.0")
                .last_seen(Utc::now() - Duration::seconds(900))
                .build(),
        );
        f.jobs.add(
            JobBuilder::new(1)
                .kind(JobKind::Job)
                .status(JobStatus::Running)
                .controller_node("ctl-2")
                .build(),
        );

        f.coordinator().run_cycle(&[], Utc::now()).await.unwrap();

        assert_eq!(f.jobs.get(1).unwrap().status, JobStatus::Failed);
        let peer = f.nodes.get("ctl-2").unwrap();
        assert_eq!(peer.node_state, NodeState::Unavailable);
        assert_eq!(peer.capacity, 0);
    }

    #[tokio::test]
    async fn test_lost_control_node_auto_deprovisioned() {
        let mut f = Fixture::new();
        f.cluster.auto_deprovision = true;
        f.add_self(30, 100);
        f.nodes.add(
            NodeBuilder::new("ctl-2")
                .id(2)
                .node_type(NodeType::Control)
                .state(NodeState::Ready)
                .version("1.0.0")
                .last_seen(Utc::now() - Duration::seconds(900))
                .build(),
        );
        f.coordinator().run_cycle(&[], Utc::now()).await.unwrap();
        assert!(f.nodes.get("ctl-2").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_offline_marking_is_benign() {
        let f = Fixture::new();
        f.add_self(30, 100);
        f.nodes.add(
            NodeBuilder::new("ctl-2")
                .id(2)
                .node_type(NodeType::Hybrid)
                .state(NodeState::Ready)
                .version("1.0.0")
                .last_seen(Utc::now() - Duration::seconds(900))
                .build(),
        );
        // 模拟另一节点抢先完成标记
        f.nodes.force_mark_offline_conflict(true);
        f.coordinator().run_cycle(&[], Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn test_local_reap_excludes_active_work_ids() {
        let f = Fixture::new();
        f.add_self(30, 100);
        f.jobs.add(
            JobBuilder::new(1)
                .kind(JobKind::Job)
                .status(JobStatus::Running)
                .controller_node("ctl-1")
                .started(Utc::now() - Duration::seconds(120))
                .dispatch_guid("guid-live")
                .build(),
        );
        f.jobs.add(
            JobBuilder::new(2)
                .kind(JobKind::Job)
                .status(JobStatus::Running)
                .controller_node("ctl-1")
                .started(Utc::now() - Duration::seconds(120))
                .dispatch_guid("guid-dead")
                .build(),
        );

        f.coordinator()
            .run_cycle(&["guid-live".to_string()], Utc::now())
            .await
            .unwrap();

        assert_eq!(f.jobs.get(1).unwrap().status, JobStatus::Running);
        assert_eq!(f.jobs.get(2).unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_link_established_on_confirmed_cost() {
        let f = Fixture::new();
        f.add_self(30, 100);
        f.links.add(Link {
            id: 1,
            source: "ctl-1".to_string(),
            target: "exec-1".to_string(),
            link_state: LinkState::Adding,
        });
        let mut costs = HashMap::new();
        costs.insert("ctl-1".to_string(), vec!["exec-1".to_string()]);
        f.mesh.set_status(MeshStatus {
            advertisements: HashMap::new(),
            known_connection_costs: costs,
        });

        f.coordinator().run_cycle(&[], Utc::now()).await.unwrap();
        assert_eq!(f.links.get(1).unwrap().link_state, LinkState::Established);
    }

    #[tokio::test]
    async fn test_rejoining_execution_node_gets_health_check() {
        let f = Fixture::new();
        f.add_self(30, 100);
        f.nodes.add(
            NodeBuilder::new("exec-1")
                .id(2)
                .node_type(NodeType::Execution)
                .state(NodeState::Unavailable)
                .last_seen(Utc::now() - Duration::seconds(900))
                .build(),
        );
        let mut ads = HashMap::new();
        ads.insert(
            "exec-1".to_string(),
            Advertisement {
                hostname: "exec-1".to_string(),
                uuid: None,
                timestamp: Some(Utc::now()),
                version: Some("runner-2.4.0".to_string()),
                node_type: Some("execution".to_string()),
            },
        );
        f.mesh.set_status(MeshStatus {
            advertisements: ads,
            known_connection_costs: HashMap::new(),
        });

        f.coordinator().run_cycle(&[], Utc::now()).await.unwrap();

        assert_eq!(f.trigger.triggered(), vec!["exec-1".to_string()]);
        // 通告时间推进了 last_seen
        assert!(f.nodes.get("exec-1").unwrap().last_seen.unwrap() > Utc::now() - Duration::seconds(60));
    }

    #[tokio::test]
    async fn test_stale_advertisement_does_not_rewind_last_seen() {
        let f = Fixture::new();
        f.add_self(30, 100);
        let seen = Utc::now() - Duration::seconds(10);
        f.nodes.add(
            NodeBuilder::new("exec-1")
                .id(2)
                .node_type(NodeType::Execution)
                .state(NodeState::Ready)
                .capacity(16)
                .last_seen(seen)
                .build(),
        );
        let mut ads = HashMap::new();
        ads.insert(
            "exec-1".to_string(),
            Advertisement {
                hostname: "exec-1".to_string(),
                uuid: None,
                timestamp: Some(Utc::now() - Duration::seconds(300)),
                version: None,
                node_type: Some("execution".to_string()),
            },
        );
        f.mesh.set_status(MeshStatus {
            advertisements: ads,
            known_connection_costs: HashMap::new(),
        });

        f.coordinator().run_cycle(&[], Utc::now()).await.unwrap();
        assert_eq!(f.nodes.get("exec-1").unwrap().last_seen, Some(seen));
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("1.2.0", "1.0.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.0.0", "1.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.0.0-rc1", "1.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.10.0", "1.9.9"), Ordering::Greater);
        assert_eq!(compare_versions("0.9", "1.0.0"), Ordering::Less);
    }
}
