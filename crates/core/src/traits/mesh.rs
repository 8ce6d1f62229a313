//! 网格传输层接口
//!
//! 控制节点通过本机的网格服务观察整个集群拓扑：哪些节点在通告
//! 自己、连接边的开销是否已建立、远端工作单元的状态。心跳协调器
//! 只依赖这组抽象，具体实现走 HTTP 状态接口。

use crate::ClusterResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// 节点通告信息
#[derive(Debug, Clone)]
pub struct Advertisement {
    pub hostname: String,
    /// 通告携带的节点标识，与节点表中的 uuid 对齐
    pub uuid: Option<String>,
    /// 对端最近一次通告时间
    pub timestamp: Option<DateTime<Utc>>,
    /// 通告中携带的版本号，形如 "automesh-1.2.3"
    pub version: Option<String>,
    /// 对端声明的节点类型
    pub node_type: Option<String>,
}

/// 远端工作单元摘要
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub unit_id: String,
    pub state: String,
}

/// 执行节点健康信息
#[derive(Debug, Clone, Default)]
pub struct WorkerInfoData {
    pub runner_version: Option<String>,
    pub cpu_count: i32,
    pub mem_in_bytes: i64,
    pub uuid: Option<String>,
    pub errors: Vec<String>,
}

/// 网格状态快照
#[derive(Debug, Clone, Default)]
pub struct MeshStatus {
    /// 已知通告，按主机名索引
    pub advertisements: HashMap<String, Advertisement>,
    /// 已确认的连接开销表：源主机名 -> 可达对端主机名集合
    pub known_connection_costs: HashMap<String, Vec<String>>,
}

impl MeshStatus {
    /// 指定连接边的开销是否已确认
    pub fn has_connection_cost(&self, source: &str, target: &str) -> bool {
        self.known_connection_costs
            .get(source)
            .map(|targets| targets.iter().any(|t| t == target))
            .unwrap_or(false)
    }
}

/// 网格传输接口
#[async_trait]
pub trait MeshTransport: Send + Sync {
    /// 拉取本机网格服务的状态快照
    async fn status(&self) -> ClusterResult<MeshStatus>;
}

/// 远端工作单元控制接口
///
/// 回收流程通过它取消并释放失联节点上的执行资源。
#[async_trait]
pub trait WorkUnitControl: Send + Sync {
    /// 列出全部工作单元
    async fn list_units(&self) -> ClusterResult<Vec<WorkUnit>>;

    /// 取消工作单元，幂等：不存在时也返回成功
    async fn cancel_unit(&self, unit_id: &str) -> ClusterResult<()>;

    /// 释放工作单元资源
    async fn release_unit(&self, unit_id: &str) -> ClusterResult<()>;

    /// 查询指定执行节点的健康信息
    async fn worker_info(&self, hostname: &str) -> ClusterResult<WorkerInfoData>;
}
