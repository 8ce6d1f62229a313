//! 控制节点生命周期
//!
//! 启动时重建集群视图并清理上一个进程生命周期留下的任务；收到
//! 正常关闭信号时把自己移出容量池。关闭路径上的任何失败都只记
//! 日志，不阻碍进程退出。

use crate::heartbeat::HeartbeatCoordinator;
use crate::policy::MembershipPolicyEngine;
use crate::reaper::Reaper;
use automesh_core::config::NodeConfig;
use automesh_core::traits::NodeRepository;
use automesh_core::ClusterResult;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

const STARTUP_REAP_EXPLANATION: &str = "任务在系统启动时仍标记为运行中，判定为异常中断";
const SHUTDOWN_EXPLANATION: &str = "节点收到正常关闭信号";

/// 启动与关闭流程的组合入口
pub struct ClusterLifecycle {
    nodes: Arc<dyn NodeRepository>,
    policy: Arc<MembershipPolicyEngine>,
    heartbeat: Arc<HeartbeatCoordinator>,
    reaper: Arc<Reaper>,
    node_config: NodeConfig,
}

impl ClusterLifecycle {
    pub fn new(
        nodes: Arc<dyn NodeRepository>,
        policy: Arc<MembershipPolicyEngine>,
        heartbeat: Arc<HeartbeatCoordinator>,
        reaper: Arc<Reaper>,
        node_config: NodeConfig,
    ) -> Self {
        Self {
            nodes,
            policy,
            heartbeat,
            reaper,
            node_config,
        }
    }

    /// 启动流程
    ///
    /// 重算成员策略、跑一轮心跳，然后回收上个进程生命周期里归属
    /// 本节点的任务：它们的宿主进程已经不在了。
    pub async fn startup(&self) -> ClusterResult<()> {
        if let Err(e) = self.policy.apply().await {
            error!("启动时成员策略重算失败，跳过: {}", e);
        }
        self.heartbeat.run_cycle(&[], Utc::now()).await?;

        if let Some(this_inst) = self
            .nodes
            .get_by_hostname(&self.node_config.hostname)
            .await?
        {
            let reaped = self
                .reaper
                .reap(&this_inst, &[], None, STARTUP_REAP_EXPLANATION)
                .await?;
            let waiting = self
                .reaper
                .reap_waiting(&this_inst, 0, &[], STARTUP_REAP_EXPLANATION)
                .await?;
            if reaped + waiting > 0 {
                info!("启动回收完成：{} 个运行中，{} 个排队", reaped, waiting);
            }
        }
        Ok(())
    }

    /// 正常关闭流程，所有失败降级为日志
    pub async fn shutdown(&self) {
        let this_inst = match self
            .nodes
            .get_by_hostname(&self.node_config.hostname)
            .await
        {
            Ok(Some(node)) => node,
            Ok(None) => {
                error!("关闭时找不到本机节点记录 {}", self.node_config.hostname);
                return;
            }
            Err(e) => {
                error!("关闭流程读取节点记录失败: {}", e);
                return;
            }
        };

        if let Err(e) = self
            .nodes
            .mark_offline(&this_inst.hostname, this_inst.last_seen, SHUTDOWN_EXPLANATION)
            .await
        {
            error!("关闭时标记下线失败: {}", e);
        }
        if let Err(e) = self
            .reaper
            .reap_waiting(&this_inst, 0, &[], SHUTDOWN_EXPLANATION)
            .await
        {
            error!("关闭时回收排队任务失败 {}: {}", this_inst.hostname, e);
        }
        warn!(
            "节点 {} 收到正常关闭信号，已移出容量池",
            this_inst.hostname
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthCheckTrigger;
    use async_trait::async_trait;
    use automesh_core::config::ClusterConfig;
    use automesh_core::models::{JobKind, JobStatus, NodeState, NodeType};
    use automesh_testing_utils::builders::{JobBuilder, NodeBuilder};
    use automesh_testing_utils::mocks::{
        MemoryAdvisoryLock, MockGroupRepository, MockJobRepository, MockLinkRepository,
        MockMeshTransport, MockNodeRepository, MockWorkUnitControl, RecordingDispatchQueue,
    };

    struct NoopTrigger;

    #[async_trait]
    impl HealthCheckTrigger for NoopTrigger {
        async fn trigger(&self, _hostname: &str) {}
    }

    fn lifecycle(
        nodes: Arc<MockNodeRepository>,
        jobs: Arc<MockJobRepository>,
    ) -> ClusterLifecycle {
        let node_config = NodeConfig {
            hostname: "ctl-1".to_string(),
            version: "1.0.0".to_string(),
            debug: false,
        };
        let cluster = ClusterConfig::default();
        let reaper = Arc::new(Reaper::new(
            nodes.clone(),
            jobs.clone(),
            Arc::new(MockWorkUnitControl::new()),
            Arc::new(RecordingDispatchQueue::new()),
            cluster.node_liveness_timeout_seconds as i64,
            "callback_events".to_string(),
        ));
        let policy = Arc::new(MembershipPolicyEngine::new(
            nodes.clone(),
            Arc::new(MockGroupRepository::new()),
            Arc::new(MemoryAdvisoryLock::new()),
            cluster.control_plane_group.clone(),
        ));
        let heartbeat = Arc::new(HeartbeatCoordinator::new(
            nodes.clone(),
            Arc::new(MockLinkRepository::new()),
            Arc::new(MockMeshTransport::new()),
            Arc::new(MemoryAdvisoryLock::new()),
            Arc::new(NoopTrigger),
            reaper.clone(),
            node_config.clone(),
            cluster,
        ));
        ClusterLifecycle::new(nodes, policy, heartbeat, reaper, node_config)
    }

    fn ready_self() -> automesh_core::models::Node {
        NodeBuilder::new("ctl-1")
            .id(1)
            .node_type(NodeType::Hybrid)
            .state(NodeState::Ready)
            .capacity(100)
            .version("1.0.0")
            .last_seen(Utc::now())
            .build()
    }

    #[tokio::test]
    async fn test_startup_reaps_own_stale_jobs() {
        let nodes = Arc::new(MockNodeRepository::new());
        nodes.add(ready_self());
        let jobs = Arc::new(MockJobRepository::new());
        jobs.add(
            JobBuilder::new(1)
                .kind(JobKind::Job)
                .status(JobStatus::Running)
                .controller_node("ctl-1")
                .build(),
        );
        jobs.add(
            JobBuilder::new(2)
                .kind(JobKind::Job)
                .status(JobStatus::Waiting)
                .controller_node("ctl-1")
                .created(Utc::now() - chrono::Duration::seconds(30))
                .build(),
        );

        lifecycle(nodes, jobs.clone()).startup().await.unwrap();

        assert_eq!(jobs.get(1).unwrap().status, JobStatus::Failed);
        assert_eq!(jobs.get(2).unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_shutdown_marks_self_offline() {
        let nodes = Arc::new(MockNodeRepository::new());
        nodes.add(ready_self());
        let jobs = Arc::new(MockJobRepository::new());

        lifecycle(nodes.clone(), jobs).shutdown().await;

        let me = nodes.get("ctl-1").unwrap();
        assert_eq!(me.node_state, NodeState::Unavailable);
        assert_eq!(me.capacity, 0);
    }

    #[tokio::test]
    async fn test_shutdown_without_node_record_does_not_panic() {
        let nodes = Arc::new(MockNodeRepository::new());
        let jobs = Arc::new(MockJobRepository::new());
        lifecycle(nodes, jobs).shutdown().await;
    }
}
