//! 应用装配与主循环
//!
//! 把基础设施实现注入各集群组件，按心跳周期驱动
//! 策略重算、心跳巡检和工作单元清理。

use std::sync::Arc;
use std::time::Duration;

use automesh_cluster::health::HealthCheckTrigger;
use automesh_cluster::{
    ClusterLifecycle, ExecutionNodeHealthCheck, HeartbeatCoordinator, MembershipPolicyEngine,
    Reaper, WorkUnitReaper,
};
use automesh_core::config::AppConfig;
use automesh_core::traits::{AdvisoryLock, MeshTransport, NodeRepository, WorkUnitControl};
use automesh_core::ClusterResult;
use automesh_infrastructure::{
    create_pool, DispatchQueueFactory, HttpMeshClient, PgAdvisoryLock, PostgresGroupRepository,
    PostgresJobRepository, PostgresLinkRepository, PostgresNodeRepository,
};
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

pub struct Application {
    lifecycle: Arc<ClusterLifecycle>,
    policy: Arc<MembershipPolicyEngine>,
    heartbeat: Arc<HeartbeatCoordinator>,
    workunit_reaper: WorkUnitReaper,
    heartbeat_period: Duration,
}

impl Application {
    pub async fn new(config: AppConfig) -> ClusterResult<Self> {
        let pool = create_pool(&config.database).await?;

        let nodes: Arc<dyn NodeRepository> = Arc::new(PostgresNodeRepository::new(pool.clone()));
        let groups = Arc::new(PostgresGroupRepository::new(pool.clone()));
        let links = Arc::new(PostgresLinkRepository::new(pool.clone()));
        let jobs = Arc::new(PostgresJobRepository::new(pool.clone()));
        let lock: Arc<dyn AdvisoryLock> = Arc::new(PgAdvisoryLock::new(&config.database));

        let queue = DispatchQueueFactory::create(&config.dispatch_queue).await?;

        // 状态读取与工作单元控制走同一个网格服务客户端
        let mesh_client = Arc::new(HttpMeshClient::new(&config.mesh)?);
        let mesh: Arc<dyn MeshTransport> = mesh_client.clone();
        let units: Arc<dyn WorkUnitControl> = mesh_client;

        let health = Arc::new(ExecutionNodeHealthCheck::new(nodes.clone(), units.clone()));
        let reaper = Arc::new(Reaper::new(
            nodes.clone(),
            jobs.clone(),
            units.clone(),
            queue,
            config.cluster.node_liveness_timeout_seconds,
            config.dispatch_queue.event_queue.clone(),
        ));
        let policy = Arc::new(MembershipPolicyEngine::new(
            nodes.clone(),
            groups,
            lock.clone(),
            config.cluster.control_plane_group.clone(),
        ));
        let heartbeat = Arc::new(HeartbeatCoordinator::new(
            nodes.clone(),
            links,
            mesh,
            lock,
            health as Arc<dyn HealthCheckTrigger>,
            reaper.clone(),
            config.node.clone(),
            config.cluster.clone(),
        ));
        let lifecycle = Arc::new(ClusterLifecycle::new(
            nodes,
            policy.clone(),
            heartbeat.clone(),
            reaper,
            config.node.clone(),
        ));
        let workunit_reaper =
            WorkUnitReaper::new(jobs, units, config.cluster.keep_work_units_on_error);

        Ok(Self {
            lifecycle,
            policy,
            heartbeat,
            workunit_reaper,
            heartbeat_period: Duration::from_secs(config.cluster.heartbeat_period_seconds),
        })
    }

    /// 主循环：启动流程后按心跳周期循环，直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> ClusterResult<()> {
        self.lifecycle.startup().await?;
        info!("启动流程完成，进入心跳循环");

        let mut interval = tokio::time::interval(self.heartbeat_period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // 启动流程里已经跑过一轮心跳，第一个立即到期的tick跳过
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_period().await {
                        if e.is_fatal() {
                            error!("心跳周期遇到致命错误，停止主循环: {e}");
                            return Err(e);
                        }
                        error!("心跳周期执行失败: {e}");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("主循环收到关闭信号");
                    break;
                }
            }
        }

        self.lifecycle.shutdown().await;
        Ok(())
    }

    /// 一个心跳周期内的全部周期性工作
    async fn run_period(&self) -> ClusterResult<()> {
        match self.policy.apply().await {
            Ok(changes) => {
                for change in changes.iter().filter(|c| !c.is_empty()) {
                    info!(
                        "容量组 {} 成员变更: +{:?} -{:?}",
                        change.group_name, change.added, change.removed
                    );
                }
            }
            Err(e) => error!("成员策略重算失败: {e}"),
        }

        // 控制面自身不跟踪派发中的任务，本地回收不排除任何分发标识
        self.heartbeat.run_cycle(&[], Utc::now()).await?;

        if let Err(e) = self.workunit_reaper.run().await {
            warn!("工作单元清理失败: {e}");
        }
        Ok(())
    }
}
