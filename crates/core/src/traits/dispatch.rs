//! 事件分发队列接口
//!
//! 回调管道在事件落库的同时，将事件推送到实时分发队列供前端订阅。
//! 具体实现可以是 RabbitMQ，也可以是测试用的内存队列。

use crate::ClusterResult;
use async_trait::async_trait;
use serde_json::Value;

/// 实时事件分发队列
///
/// 推送失败不应中断事件落库，调用方记录警告后继续。
#[async_trait]
pub trait EventDispatchQueue: Send + Sync {
    /// 推送单条事件到指定分组
    ///
    /// `skip_payload` 为真时表示该事件被限流，消费端应只转发轻量
    /// 通知而不携带完整负载。
    async fn publish(&self, group: &str, event: &Value, skip_payload: bool) -> ClusterResult<()>;

    /// 推送任务状态变更通知
    async fn publish_status(&self, group: &str, payload: &Value) -> ClusterResult<()>;
}
