use async_trait::async_trait;
use automesh_core::traits::EventDispatchQueue;
use automesh_core::ClusterResult;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// 队列中的一条分发记录
#[derive(Debug, Clone)]
pub struct DispatchEntry {
    pub payload: Value,
    /// 实时事件被限流时为真，状态通知恒为假
    pub skip_payload: bool,
}

/// 内存事件分发队列实现
///
/// 适用于单机嵌入式部署与测试场景，消息按分组暂存在进程内，
/// 由消费方主动排空。
#[derive(Clone, Default)]
pub struct InMemoryDispatchQueue {
    groups: Arc<RwLock<HashMap<String, VecDeque<DispatchEntry>>>>,
}

impl InMemoryDispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 排空指定分组的全部暂存消息
    pub async fn drain(&self, group: &str) -> Vec<DispatchEntry> {
        let mut groups = self.groups.write().await;
        groups
            .get_mut(group)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    pub async fn queue_size(&self, group: &str) -> usize {
        let groups = self.groups.read().await;
        groups.get(group).map(VecDeque::len).unwrap_or(0)
    }

    async fn push(&self, group: &str, payload: Value, skip_payload: bool) {
        let mut groups = self.groups.write().await;
        groups
            .entry(group.to_string())
            .or_default()
            .push_back(DispatchEntry {
                payload,
                skip_payload,
            });
    }
}

#[async_trait]
impl EventDispatchQueue for InMemoryDispatchQueue {
    async fn publish(&self, group: &str, event: &Value, skip_payload: bool) -> ClusterResult<()> {
        self.push(group, event.clone(), skip_payload).await;
        debug!("事件已暂存到内存分组: {}", group);
        Ok(())
    }

    async fn publish_status(&self, group: &str, payload: &Value) -> ClusterResult<()> {
        self.push(group, payload.clone(), false).await;
        Ok(())
    }
}
