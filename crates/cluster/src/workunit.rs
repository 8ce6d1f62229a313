//! 工作单元清理
//!
//! 任务正常结束时执行器会释放对应的工作单元，进程崩溃或释放失败
//! 会留下孤儿单元占用磁盘。周期任务列出全部工作单元，找出句柄仍
//! 被已终结任务持有的那些，先取消再释放。

use automesh_core::models::Job;
use automesh_core::traits::{JobRepository, WorkUnitControl};
use automesh_core::ClusterResult;
use std::sync::Arc;
use tracing::{debug, warn};

/// 孤儿工作单元回收器
pub struct WorkUnitReaper {
    jobs: Arc<dyn JobRepository>,
    units: Arc<dyn WorkUnitControl>,
    /// 出错任务的工作单元保留现场，便于排查
    keep_work_units_on_error: bool,
}

impl WorkUnitReaper {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        units: Arc<dyn WorkUnitControl>,
        keep_work_units_on_error: bool,
    ) -> Self {
        Self {
            jobs,
            units,
            keep_work_units_on_error,
        }
    }

    /// 执行一轮清理，返回释放的单元数
    pub async fn run(&self) -> ClusterResult<usize> {
        debug!("检查未释放的工作单元");
        let unit_list = self.units.list_units().await?;
        if unit_list.is_empty() {
            return Ok(0);
        }
        let unit_ids: Vec<String> = unit_list.into_iter().map(|u| u.unit_id).collect();
        let holders = self.jobs.list_holding_work_units(&unit_ids).await?;

        let mut released = 0;
        for job in holders {
            if !self.should_release(&job) {
                continue;
            }
            let Some(unit_id) = &job.work_unit_id else {
                continue;
            };
            debug!("任务 {} 已终结，回收工作单元 {}", job.id, unit_id);
            // 单元可能仍在运行，先取消保险
            if let Err(e) = self.units.cancel_unit(unit_id).await {
                warn!("取消工作单元 {} 失败: {}", unit_id, e);
            }
            match self.units.release_unit(unit_id).await {
                Ok(()) => released += 1,
                Err(e) => warn!("释放工作单元 {} 失败: {}", unit_id, e),
            }
        }
        Ok(released)
    }

    fn should_release(&self, job: &Job) -> bool {
        if job.status.is_active() {
            return false;
        }
        if self.keep_work_units_on_error && job.status.is_error() {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automesh_core::models::{JobKind, JobStatus};
    use automesh_testing_utils::builders::JobBuilder;
    use automesh_testing_utils::mocks::{MockJobRepository, MockWorkUnitControl};

    fn job_with_unit(id: i64, status: JobStatus, unit: &str) -> Job {
        JobBuilder::new(id)
            .kind(JobKind::Job)
            .status(status)
            .work_unit_id(unit)
            .build()
    }

    #[tokio::test]
    async fn test_releases_units_of_finished_jobs() {
        let jobs = Arc::new(MockJobRepository::new());
        jobs.add(job_with_unit(1, JobStatus::Successful, "unit-1"));
        jobs.add(job_with_unit(2, JobStatus::Running, "unit-2"));
        let units = Arc::new(MockWorkUnitControl::new());
        units.add_unit("unit-1", "Succeeded");
        units.add_unit("unit-2", "Running");

        let reaper = WorkUnitReaper::new(jobs, units.clone(), false);
        let released = reaper.run().await.unwrap();

        assert_eq!(released, 1);
        assert_eq!(units.canceled(), vec!["unit-1".to_string()]);
        assert_eq!(units.released(), vec!["unit-1".to_string()]);
    }

    #[tokio::test]
    async fn test_keeps_units_of_errored_jobs_when_configured() {
        let jobs = Arc::new(MockJobRepository::new());
        jobs.add(job_with_unit(1, JobStatus::Error, "unit-1"));
        let units = Arc::new(MockWorkUnitControl::new());
        units.add_unit("unit-1", "Failed");

        let reaper = WorkUnitReaper::new(jobs, units.clone(), true);
        let released = reaper.run().await.unwrap();

        assert_eq!(released, 0);
        assert!(units.released().is_empty());
    }

    #[tokio::test]
    async fn test_no_units_is_a_noop() {
        let jobs = Arc::new(MockJobRepository::new());
        let units = Arc::new(MockWorkUnitControl::new());
        let reaper = WorkUnitReaper::new(jobs, units, false);
        assert_eq!(reaper.run().await.unwrap(), 0);
    }
}
