//! 失联节点任务回收
//!
//! 节点失联后，归属它的在途任务不会自行终结，由存活节点代为标记
//! 失败并释放远端执行资源。回收是幂等的：任务已进入终态时的条件
//! 更新返回冲突，按"别人已经收过了"处理。

use automesh_core::models::{Job, JobStatus, Node};
use automesh_core::traits::{
    EventDispatchQueue, JobRepository, NodeRepository, WorkUnitControl,
};
use automesh_core::ClusterResult;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 默认回收解释文本
pub const DEFAULT_REAP_EXPLANATION: &str = "任务因所在节点失联被回收";

/// 任务回收器
pub struct Reaper {
    nodes: Arc<dyn NodeRepository>,
    jobs: Arc<dyn JobRepository>,
    units: Arc<dyn WorkUnitControl>,
    queue: Arc<dyn EventDispatchQueue>,
    /// 存活阈值，用于判断其他控制节点是否还在
    liveness_timeout_seconds: i64,
    /// 状态通知的分发分组
    queue_group: String,
}

impl Reaper {
    pub fn new(
        nodes: Arc<dyn NodeRepository>,
        jobs: Arc<dyn JobRepository>,
        units: Arc<dyn WorkUnitControl>,
        queue: Arc<dyn EventDispatchQueue>,
        liveness_timeout_seconds: i64,
        queue_group: String,
    ) -> Self {
        Self {
            nodes,
            jobs,
            units,
            queue,
            liveness_timeout_seconds,
            queue_group,
        }
    }

    /// 回收归属某节点的运行中任务
    ///
    /// 排除 `excluded_work_ids` 中列出的分发标识（调用方自己进程里
    /// 仍活跃的任务），排除由其他仍存活控制节点控制的任务。给定
    /// `ref_time` 时只回收在它之前启动的任务。
    pub async fn reap(
        &self,
        node: &Node,
        excluded_work_ids: &[String],
        ref_time: Option<DateTime<Utc>>,
        explanation: &str,
    ) -> ClusterResult<usize> {
        let mut targets = self
            .jobs
            .list_by_controller(&node.hostname, &[JobStatus::Running])
            .await?;
        let on_execution = self
            .jobs
            .list_by_execution_node(&node.hostname, &[JobStatus::Running])
            .await?;
        let seen: HashSet<i64> = targets.iter().map(|j| j.id).collect();
        targets.extend(on_execution.into_iter().filter(|j| !seen.contains(&j.id)));

        let excluded: HashSet<&str> = excluded_work_ids.iter().map(String::as_str).collect();
        let mut reaped = 0;
        for job in targets {
            if let Some(guid) = &job.dispatch_guid {
                if excluded.contains(guid.as_str()) {
                    continue;
                }
            }
            if let Some(ref_time) = ref_time {
                match job.started {
                    Some(started) if started <= ref_time => {}
                    _ => continue,
                }
            }
            if job.controller_node != node.hostname
                && self.controller_is_live(&job.controller_node).await?
            {
                // 控制方还活着，由它自己处理
                continue;
            }
            if self
                .reap_job(&job, &[JobStatus::Running, JobStatus::Waiting], explanation)
                .await?
            {
                reaped += 1;
            }
        }
        if reaped > 0 {
            info!("节点 {} 回收了 {} 个运行中任务", node.hostname, reaped);
        }
        Ok(reaped)
    }

    /// 回收某节点上排队超时的任务
    ///
    /// 只处理创建时间早于宽限期的 waiting 任务，刚入队的不动。
    pub async fn reap_waiting(
        &self,
        node: &Node,
        grace_period_seconds: i64,
        excluded_work_ids: &[String],
        explanation: &str,
    ) -> ClusterResult<usize> {
        let cutoff = Utc::now() - chrono::Duration::seconds(grace_period_seconds);
        let targets = self
            .jobs
            .list_by_controller(&node.hostname, &[JobStatus::Waiting])
            .await?;
        let excluded: HashSet<&str> = excluded_work_ids.iter().map(String::as_str).collect();

        let mut reaped = 0;
        for job in targets {
            if job.created > cutoff {
                continue;
            }
            if let Some(guid) = &job.dispatch_guid {
                if excluded.contains(guid.as_str()) {
                    continue;
                }
            }
            if self
                .reap_job(&job, &[JobStatus::Waiting], explanation)
                .await?
            {
                reaped += 1;
            }
        }
        if reaped > 0 {
            info!("节点 {} 回收了 {} 个排队任务", node.hostname, reaped);
        }
        Ok(reaped)
    }

    /// 标记单个任务失败并释放其执行资源
    ///
    /// 条件更新冲突视为其他节点已完成回收，返回 false 不报错。
    async fn reap_job(
        &self,
        job: &Job,
        expected: &[JobStatus],
        explanation: &str,
    ) -> ClusterResult<bool> {
        let result = self
            .jobs
            .mark_terminal(
                job.id,
                expected,
                JobStatus::Failed,
                explanation,
                "",
                Utc::now(),
            )
            .await;
        match result {
            Ok(()) => {}
            Err(e) if e.is_benign_conflict() => {
                debug!("任务 {} 已被其他节点回收", job.id);
                return Ok(false);
            }
            Err(e) => {
                error!("标记任务 {} 失败时出错: {}", job.id, e);
                return Err(e);
            }
        }

        if let Some(unit_id) = &job.work_unit_id {
            if let Err(e) = self.units.cancel_unit(unit_id).await {
                warn!("取消任务 {} 的工作单元 {} 失败: {}", job.id, unit_id, e);
            }
            if let Err(e) = self.units.release_unit(unit_id).await {
                warn!("释放任务 {} 的工作单元 {} 失败: {}", job.id, unit_id, e);
            }
        }

        let payload = json!({
            "unified_job_id": job.id,
            "status": JobStatus::Failed.as_str(),
            "job_explanation": explanation,
        });
        if let Err(e) = self.queue.publish_status(&self.queue_group, &payload).await {
            warn!("任务 {} 的状态通知分发失败: {}", job.id, e);
        }
        Ok(true)
    }

    async fn controller_is_live(&self, hostname: &str) -> ClusterResult<bool> {
        let Some(controller) = self.nodes.get_by_hostname(hostname).await? else {
            return Ok(false);
        };
        Ok(!controller.is_lost(Utc::now(), self.liveness_timeout_seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automesh_core::models::{JobKind, NodeState, NodeType};
    use automesh_testing_utils::builders::{JobBuilder, NodeBuilder};
    use automesh_testing_utils::mocks::{
        MockJobRepository, MockNodeRepository, MockWorkUnitControl, RecordingDispatchQueue,
    };

    fn lost_node(hostname: &str) -> Node {
        NodeBuilder::new(hostname)
            .id(9)
            .node_type(NodeType::Hybrid)
            .state(NodeState::Ready)
            .last_seen(Utc::now() - chrono::Duration::seconds(600))
            .build()
    }

    struct Fixture {
        reaper: Reaper,
        jobs: Arc<MockJobRepository>,
        units: Arc<MockWorkUnitControl>,
        queue: Arc<RecordingDispatchQueue>,
        nodes: Arc<MockNodeRepository>,
    }

    fn fixture() -> Fixture {
        let nodes = Arc::new(MockNodeRepository::new());
        let jobs = Arc::new(MockJobRepository::new());
        let units = Arc::new(MockWorkUnitControl::new());
        let queue = Arc::new(RecordingDispatchQueue::new());
        let reaper = Reaper::new(
            nodes.clone(),
            jobs.clone(),
            units.clone(),
            queue.clone(),
            120,
            "callback_events".to_string(),
        );
        Fixture {
            reaper,
            jobs,
            units,
            queue,
            nodes,
        }
    }

    #[tokio::test]
    async fn test_reap_fails_running_jobs_and_releases_units() {
        let f = fixture();
        f.jobs.add(
            JobBuilder::new(1)
                .kind(JobKind::Job)
                .status(JobStatus::Running)
                .controller_node("node-a")
                .started(Utc::now() - chrono::Duration::seconds(60))
                .work_unit_id("qLL2JFNT")
                .build(),
        );

        let reaped = f
            .reaper
            .reap(&lost_node("node-a"), &[], None, DEFAULT_REAP_EXPLANATION)
            .await
            .unwrap();

        assert_eq!(reaped, 1);
        assert_eq!(f.jobs.get(1).unwrap().status, JobStatus::Failed);
        assert_eq!(f.units.canceled(), vec!["qLL2JFNT".to_string()]);
        assert_eq!(f.units.released(), vec!["qLL2JFNT".to_string()]);
        assert_eq!(f.queue.status_messages().len(), 1);
    }

    #[tokio::test]
    async fn test_reap_is_idempotent() {
        let f = fixture();
        f.jobs.add(
            JobBuilder::new(1)
                .kind(JobKind::Job)
                .status(JobStatus::Running)
                .controller_node("node-a")
                .build(),
        );
        let node = lost_node("node-a");
        let first = f.reaper.reap(&node, &[], None, "gone").await.unwrap();
        let second = f.reaper.reap(&node, &[], None, "gone").await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn test_reap_skips_excluded_work_ids() {
        let f = fixture();
        f.jobs.add(
            JobBuilder::new(1)
                .kind(JobKind::Job)
                .status(JobStatus::Running)
                .controller_node("node-a")
                .dispatch_guid("guid-1")
                .build(),
        );
        let reaped = f
            .reaper
            .reap(
                &lost_node("node-a"),
                &["guid-1".to_string()],
                None,
                "gone",
            )
            .await
            .unwrap();
        assert_eq!(reaped, 0);
        assert_eq!(f.jobs.get(1).unwrap().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_reap_respects_reference_time() {
        let f = fixture();
        f.jobs.add(
            JobBuilder::new(1)
                .kind(JobKind::Job)
                .status(JobStatus::Running)
                .controller_node("node-a")
                .started(Utc::now())
                .build(),
        );
        let ref_time = Utc::now() - chrono::Duration::seconds(300);
        let reaped = f
            .reaper
            .reap(&lost_node("node-a"), &[], Some(ref_time), "gone")
            .await
            .unwrap();
        assert_eq!(reaped, 0);
    }

    #[tokio::test]
    async fn test_reap_leaves_jobs_of_live_controller() {
        let f = fixture();
        f.nodes.add(
            NodeBuilder::new("controller-b")
                .id(2)
                .node_type(NodeType::Control)
                .state(NodeState::Ready)
                .last_seen(Utc::now())
                .build(),
        );
        // 任务在失联的执行节点上运行，但控制方还活着
        f.jobs.add(
            JobBuilder::new(1)
                .kind(JobKind::Job)
                .status(JobStatus::Running)
                .controller_node("controller-b")
                .execution_node("node-a")
                .build(),
        );
        let reaped = f
            .reaper
            .reap(&lost_node("node-a"), &[], None, "gone")
            .await
            .unwrap();
        assert_eq!(reaped, 0);
        assert_eq!(f.jobs.get(1).unwrap().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_reap_waiting_honors_grace_period() {
        let f = fixture();
        f.jobs.add(
            JobBuilder::new(1)
                .kind(JobKind::Job)
                .status(JobStatus::Waiting)
                .controller_node("node-a")
                .created(Utc::now() - chrono::Duration::seconds(600))
                .build(),
        );
        f.jobs.add(
            JobBuilder::new(2)
                .kind(JobKind::Job)
                .status(JobStatus::Waiting)
                .controller_node("node-a")
                .created(Utc::now())
                .build(),
        );

        let reaped = f
            .reaper
            .reap_waiting(&lost_node("node-a"), 60, &[], "gone")
            .await
            .unwrap();
        assert_eq!(reaped, 1);
        assert_eq!(f.jobs.get(1).unwrap().status, JobStatus::Failed);
        assert_eq!(f.jobs.get(2).unwrap().status, JobStatus::Waiting);
    }
}
