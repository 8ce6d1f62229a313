//! 数据仓储层接口定义
//!
//! 此模块定义了集群控制面的数据持久化抽象接口，包括：
//! - 节点仓储接口 (NodeRepository)
//! - 容量组仓储接口 (GroupRepository)
//! - 网格连接仓储接口 (LinkRepository)
//! - 任务仓储接口 (JobRepository)
//!
//! ## 设计原则
//!
//! ### 接口隔离
//! 每个仓储接口职责单一，只负责特定实体的数据操作。
//!
//! ### 异步设计
//! 所有数据库操作都是异步的，返回 `ClusterResult<T>` 统一错误处理，
//! 实现 `Send + Sync` 确保线程安全。
//!
//! ### 条件更新
//! 心跳与回收路径上的写入大量使用条件更新（带状态过滤的 UPDATE）。
//! 当过滤条件不再成立时实现必须返回 `ClusterError::UpdateConflict`，
//! 调用方据此识别并发竞争并放弃本次写入，而不是覆盖对方的结果。

use crate::models::{CapacityGroup, Job, JobStatus, Link, LinkState, Node, NodeState};
use crate::ClusterResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 节点成员变更记录，由策略引擎产出并用于结构化日志
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipChange {
    pub group_name: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl MembershipChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// 节点仓储接口
///
/// 管理集群节点记录的读取与状态写入。心跳协调器、策略引擎和
/// 健康检查都通过此接口访问节点表。
#[async_trait]
pub trait NodeRepository: Send + Sync {
    /// 获取全部节点
    async fn list(&self) -> ClusterResult<Vec<Node>>;

    /// 根据主机名获取节点
    ///
    /// 未找到时返回 `None`，数据库错误时返回 `ClusterError`。
    async fn get_by_hostname(&self, hostname: &str) -> ClusterResult<Option<Node>>;

    /// 注册本机节点，已存在则返回现有记录
    ///
    /// 返回值中的 bool 表示是否新建。
    async fn register(&self, node: &Node) -> ClusterResult<(Node, bool)>;

    /// 刷新节点心跳
    ///
    /// 更新 last_seen 与版本信息。`advance_state` 为真时同时将
    /// Installed 状态的节点推进到 Ready。
    async fn save_health_data(
        &self,
        hostname: &str,
        version: &str,
        last_seen: DateTime<Utc>,
        advance_state: bool,
        errors: &str,
    ) -> ClusterResult<()>;

    /// 条件标记节点下线
    ///
    /// 仅当节点的 last_seen 仍等于 `observed_last_seen` 时才将节点置为
    /// Unavailable 并清零容量。若节点在此期间又发出了心跳，实现必须
    /// 返回 `ClusterError::UpdateConflict`，调用方放弃本次标记。
    async fn mark_offline(
        &self,
        hostname: &str,
        observed_last_seen: Option<DateTime<Utc>>,
        errors: &str,
    ) -> ClusterResult<()>;

    /// 仅推进节点的 last_seen，来自网格通告的观察值
    async fn set_last_seen(&self, hostname: &str, last_seen: DateTime<Utc>) -> ClusterResult<()>;

    /// 更新节点状态
    async fn set_state(&self, hostname: &str, state: NodeState) -> ClusterResult<()>;

    /// 更新健康检查结果
    async fn save_health_check(
        &self,
        hostname: &str,
        checked_at: DateTime<Utc>,
        capacity: i32,
        version: &str,
        errors: &str,
    ) -> ClusterResult<()>;

    /// 删除失联且允许自动撤编的节点
    async fn deprovision(&self, hostname: &str) -> ClusterResult<()>;
}

/// 容量组仓储接口
#[async_trait]
pub trait GroupRepository: Send + Sync {
    /// 获取全部容量组（含成员id列表）
    async fn list(&self) -> ClusterResult<Vec<CapacityGroup>>;

    /// 批量覆盖写入成员集合，全部变更在一个事务内生效
    async fn apply_membership(&self, changes: &[(i64, Vec<i64>)]) -> ClusterResult<()>;
}

/// 网格连接仓储接口
#[async_trait]
pub trait LinkRepository: Send + Sync {
    /// 获取处于指定状态的全部连接边
    async fn list_in_state(&self, state: LinkState) -> ClusterResult<Vec<Link>>;

    /// 更新连接状态
    async fn set_state(&self, link_id: i64, state: LinkState) -> ClusterResult<()>;
}

/// 任务仓储接口
///
/// 回收器与回调管道共用。终态写入同样遵循条件更新约定：
/// 当任务已不在预期状态集合内时返回 `UpdateConflict`。
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 查询指定控制节点上处于给定状态集合的任务
    async fn list_by_controller(
        &self,
        controller_node: &str,
        statuses: &[JobStatus],
    ) -> ClusterResult<Vec<Job>>;

    /// 查询指定执行节点上处于给定状态集合的任务
    async fn list_by_execution_node(
        &self,
        execution_node: &str,
        statuses: &[JobStatus],
    ) -> ClusterResult<Vec<Job>>;

    /// 查询仍持有给定工作单元句柄的任务
    async fn list_holding_work_units(&self, unit_ids: &[String]) -> ClusterResult<Vec<Job>>;

    /// 条件写入终态
    ///
    /// 仅当任务当前状态在 `expected_statuses` 内时才写入。解释文本
    /// 与回溯文本采用追加合并而不是覆盖。竞争失败返回 `UpdateConflict`。
    async fn mark_terminal(
        &self,
        job_id: i64,
        expected_statuses: &[JobStatus],
        status: JobStatus,
        job_explanation: &str,
        result_traceback: &str,
        finished: DateTime<Utc>,
    ) -> ClusterResult<()>;

    /// 保存任务运行产出（终态字段的合并写入）
    async fn save_run_fields(
        &self,
        job_id: i64,
        fields: &serde_json::Map<String, serde_json::Value>,
    ) -> ClusterResult<()>;
}
