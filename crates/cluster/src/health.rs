//! 执行节点健康检查
//!
//! 通过网格的工作单元控制通道查询执行节点的运行器版本、资源规模
//! 和错误列表，据此刷新节点的容量记录。只对执行类型节点有效。

use async_trait::async_trait;
use automesh_core::models::{NodeState, NodeType};
use automesh_core::traits::{NodeRepository, WorkUnitControl, WorkerInfoData};
use automesh_core::ClusterResult;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// 每个执行槽位的内存预算
const MEM_PER_FORK_BYTES: i64 = 100 * 1024 * 1024;

/// 心跳协调器触发带外健康检查的入口
#[async_trait]
pub trait HealthCheckTrigger: Send + Sync {
    async fn trigger(&self, hostname: &str);
}

/// 执行节点健康检查器
pub struct ExecutionNodeHealthCheck {
    nodes: Arc<dyn NodeRepository>,
    units: Arc<dyn WorkUnitControl>,
}

impl ExecutionNodeHealthCheck {
    pub fn new(nodes: Arc<dyn NodeRepository>, units: Arc<dyn WorkUnitControl>) -> Self {
        Self { nodes, units }
    }

    /// 对指定执行节点执行一轮健康检查并落库
    ///
    /// 节点不存在、类型不对或状态不在可检查集合内时记日志直接返回。
    pub async fn run(&self, hostname: &str) -> ClusterResult<Option<WorkerInfoData>> {
        if hostname.is_empty() {
            warn!("健康检查收到空主机名");
            return Ok(None);
        }
        let Some(node) = self.nodes.get_by_hostname(hostname).await? else {
            warn!("节点 {} 的记录不存在，无法检查容量", hostname);
            return Ok(None);
        };
        if node.node_type != NodeType::Execution {
            warn!(
                "健康检查只适用于执行节点，{} 的类型是 {}",
                hostname,
                node.node_type.as_str()
            );
            return Ok(None);
        }
        if !matches!(
            node.node_state,
            NodeState::Ready | NodeState::Unavailable | NodeState::Installed
        ) {
            warn!(
                "节点 {} 处于 {} 状态，跳过健康检查",
                hostname,
                node.node_state.as_str()
            );
            return Ok(None);
        }

        let data = self.units.worker_info(hostname).await?;
        let errors = data.errors.join("\n");
        let capacity = if data.errors.is_empty() {
            compute_capacity(data.cpu_count, data.mem_in_bytes)
        } else {
            0
        };
        let version = format!(
            "runner-{}",
            data.runner_version.as_deref().unwrap_or("???")
        );
        self.nodes
            .save_health_check(hostname, Utc::now(), capacity, &version, &errors)
            .await?;

        if !data.errors.is_empty() {
            if node.capacity > 0 {
                warn!("健康检查将执行节点 {} 标记为失联，错误：\n{}", hostname, errors);
            } else {
                info!("新节点或失联节点 {} 仍无可用容量，错误：\n{}", hostname, errors);
            }
        } else {
            info!("执行节点 {} 的容量更新为 {}", hostname, capacity);
        }
        Ok(Some(data))
    }
}

/// 按CPU与内存推导容量，取两者中的较大者
fn compute_capacity(cpu_count: i32, mem_in_bytes: i64) -> i32 {
    let cpu_capacity = cpu_count.max(0) * 4;
    let mem_capacity = (mem_in_bytes / MEM_PER_FORK_BYTES).min(i32::MAX as i64) as i32;
    cpu_capacity.max(mem_capacity)
}

#[async_trait]
impl HealthCheckTrigger for ExecutionNodeHealthCheck {
    async fn trigger(&self, hostname: &str) {
        if let Err(e) = self.run(hostname).await {
            warn!("节点 {} 的健康检查失败: {}", hostname, e);
        }
    }
}
